use reqwest::Response;

use crate::error::SyncError;

/// Error bodies longer than this are cut in messages.
const MAX_ERROR_BODY: usize = 512;

/// Pass successful responses through; turn anything else into
/// [`SyncError::Status`] carrying the (truncated) response body.
pub(crate) async fn ensure_success(url: String, response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(text) => truncate(text.trim()),
        Err(e) => {
            tracing::debug!(%url, error = %e, "failed to read error body");
            String::new()
        }
    };
    Err(SyncError::Status {
        url,
        status: status.as_u16(),
        body,
    })
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_owned(),
    }
}
