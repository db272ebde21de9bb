//! Planning Center API client.

use std::time::Duration;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use crate::error::SyncError;
use crate::http::ensure_success;
use crate::settings::Settings;

/// Records requested per page; the API maximum.
pub const PAGE_SIZE: u32 = 100;
/// Requests per page before giving up on HTTP 429.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Source of raw API records.
#[allow(async_fn_in_trait)]
pub trait RecordSource: Send + Sync {
    /// Every record of a collection, following pagination to the end.
    async fn fetch_all(
        &self,
        path: &str,
        filters: &[(String, String)],
    ) -> Result<Vec<Value>, SyncError>;
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    data: Value,
    #[serde(default)]
    links: Links,
}

#[derive(Default, Deserialize)]
struct Links {
    next: Option<String>,
}

/// HTTP client for `api.planningcenteronline.com`, authenticated with a
/// personal access token pair (HTTP Basic).
#[derive(Clone)]
pub struct PlanningCenterClient {
    http: reqwest::Client,
    base_url: String,
    client_id: SecretString,
    client_secret: SecretString,
    max_attempts: u32,
}

impl std::fmt::Debug for PlanningCenterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanningCenterClient")
            .field("base_url", &self.base_url)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl PlanningCenterClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        client_id: SecretString,
        client_secret: SecretString,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            client_id,
            client_secret,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn from_settings(http: reqwest::Client, settings: &Settings) -> Self {
        Self::new(
            http,
            settings.pco_base_url.clone(),
            settings.client_id.clone(),
            settings.client_secret.clone(),
        )
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    async fn get_page(&self, url: &str, query: &[(String, String)]) -> Result<Page, SyncError> {
        for attempt in 1..=self.max_attempts {
            let response = self
                .http
                .get(url)
                .query(query)
                .basic_auth(
                    self.client_id.expose_secret(),
                    Some(self.client_secret.expose_secret()),
                )
                .send()
                .await
                .map_err(|e| SyncError::Request {
                    url: url.to_owned(),
                    source: e,
                })?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                let wait = retry_after(&response);
                tracing::warn!(
                    url,
                    attempt,
                    wait_secs = wait.as_secs(),
                    "rate limited by Planning Center",
                );
                if attempt < self.max_attempts {
                    tokio::time::sleep(wait).await;
                }
                continue;
            }

            let response = ensure_success(url.to_owned(), response).await?;
            return response.json::<Page>().await.map_err(|e| SyncError::Decode {
                url: url.to_owned(),
                source: e,
            });
        }

        Err(SyncError::RateLimited {
            url: url.to_owned(),
            attempts: self.max_attempts,
        })
    }
}

impl RecordSource for PlanningCenterClient {
    async fn fetch_all(
        &self,
        path: &str,
        filters: &[(String, String)],
    ) -> Result<Vec<Value>, SyncError> {
        let mut url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut query = vec![("per_page".to_owned(), PAGE_SIZE.to_string())];
        query.extend_from_slice(filters);

        let mut items = Vec::new();
        let mut pages = 0usize;
        loop {
            let page = self.get_page(&url, &query).await?;
            pages += 1;
            match page.data {
                Value::Array(batch) => items.extend(batch),
                Value::Null => {}
                single => items.push(single),
            }

            // `links.next` already carries the full query string
            match page.links.next {
                Some(next) if next != url => {
                    url = next;
                    query.clear();
                }
                Some(_) => {
                    tracing::warn!(%url, "next link points at the current page; stopping");
                    break;
                }
                None => break,
            }
        }

        tracing::debug!(path, pages, items = items.len(), "fetched collection");
        Ok(items)
    }
}

fn retry_after(response: &reqwest::Response) -> Duration {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        // arch-lint: allow(no-silent-result-drop) reason="a non-ASCII Retry-After falls back to the default wait"
        .and_then(|v| v.to_str().ok())
        // arch-lint: allow(no-silent-result-drop) reason="HTTP-date or malformed values fall back to the default wait"
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(DEFAULT_RETRY_AFTER, Duration::from_secs)
}
