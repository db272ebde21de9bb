/// Failure to assemble [`Settings`](crate::Settings) from the environment.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("invalid value for {key}: {detail}")]
    Invalid { key: &'static str, detail: String },
}

/// Failure while pulling from Planning Center or loading into BigQuery.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to build HTTP client")]
    HttpClient { source: reqwest::Error },

    #[error("request to {url} failed")]
    Request { url: String, source: reqwest::Error },

    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("{url} still rate limited after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },

    #[error("unexpected response body from {url}")]
    Decode { url: String, source: reqwest::Error },

    #[error(
        "BigQuery project unknown — use BQ_DATASET=project.dataset or set GOOGLE_CLOUD_PROJECT"
    )]
    MissingProject,

    #[error("BigQuery rejected {failed} of {attempted} rows for {table}: {first}")]
    InsertRejected {
        table: String,
        attempted: usize,
        failed: usize,
        first: String,
    },

    #[error("{endpoint}: {source}")]
    Endpoint {
        endpoint: &'static str,
        source: Box<SyncError>,
    },
}

impl SyncError {
    pub(crate) fn in_endpoint(self, endpoint: &'static str) -> Self {
        Self::Endpoint {
            endpoint,
            source: Box::new(self),
        }
    }
}
