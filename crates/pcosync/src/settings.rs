use std::fmt;

use secrecy::SecretString;

use crate::error::SettingsError;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOOKBACK_DAYS: u32 = 1;
pub const PCO_BASE_URL: &str = "https://api.planningcenteronline.com";
pub const BIGQUERY_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
pub const METADATA_BASE_URL: &str = "http://metadata.google.internal";

/// BigQuery dataset, optionally qualified with its project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRef {
    pub project: Option<String>,
    pub dataset: String,
}

impl std::str::FromStr for DatasetRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (project, dataset) = match s.split_once('.') {
            Some((p, d)) => (Some(p), d),
            None => (None, s),
        };
        if dataset.is_empty() || dataset.contains('.') || project.is_some_and(str::is_empty) {
            return Err(format!("expected `dataset` or `project.dataset`, got '{s}'"));
        }
        Ok(Self {
            project: project.map(str::to_owned),
            dataset: dataset.to_owned(),
        })
    }
}

/// Runtime configuration of the worker.
///
/// Locally read from `.env` via dotenvy; on Cloud Run the secret values
/// arrive as environment variables mounted from Secret Manager.
///
/// Credentials are wrapped in [`SecretString`] and redacted from `Debug`.
#[derive(Clone)]
pub struct Settings {
    pub client_id: SecretString,
    pub client_secret: SecretString,
    pub dataset: DatasetRef,
    /// Fallback BigQuery project when the dataset is unqualified
    pub gcp_project: Option<String>,
    pub port: u16,
    /// When set, `GET /` must carry a matching `X-Trigger-Key` header.
    pub trigger_key: Option<SecretString>,
    /// Days of donations fetched per run, ending yesterday.
    pub lookback_days: u32,
    pub pco_base_url: String,
    pub bigquery_base_url: String,
    pub metadata_base_url: String,
    /// Pre-issued OAuth token; bypasses the metadata server.
    pub access_token: Option<SecretString>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("client_id", &"[REDACTED]")
            .field("client_secret", &"[REDACTED]")
            .field("dataset", &self.dataset)
            .field("gcp_project", &self.gcp_project)
            .field("port", &self.port)
            .field(
                "trigger_key",
                &self.trigger_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("lookback_days", &self.lookback_days)
            .field("pco_base_url", &self.pco_base_url)
            .field("bigquery_base_url", &self.bigquery_base_url)
            .field("metadata_base_url", &self.metadata_base_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Settings {
    /// Load settings from `.env` (if present) and the process environment.
    pub fn load() -> Result<Self, SettingsError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => tracing::debug!("no .env file"),
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env"),
        }

        let settings = Self::from_lookup(|key| {
            std::env::var(key)
                // arch-lint: allow(no-silent-result-drop) reason="unset or non-UTF-8 variables are treated as absent"
                .ok()
        })?;
        tracing::debug!(
            dataset = %settings.dataset.dataset,
            port = settings.port,
            trigger_key_configured = settings.trigger_key.is_some(),
            "settings loaded",
        );
        Ok(settings)
    }

    /// Build settings from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(SettingsError::MissingEnvVar(key));

        let dataset = required("BQ_DATASET")?
            .parse::<DatasetRef>()
            .map_err(|detail| SettingsError::Invalid {
                key: "BQ_DATASET",
                detail,
            })?;

        Ok(Self {
            client_id: SecretString::from(required("CLIENT_ID")?),
            client_secret: SecretString::from(required("CLIENT_SECRET")?),
            dataset,
            gcp_project: get("GOOGLE_CLOUD_PROJECT"),
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            trigger_key: get("TRIGGER_KEY").map(SecretString::from),
            lookback_days: parse_or(
                "SYNC_LOOKBACK_DAYS",
                get("SYNC_LOOKBACK_DAYS"),
                DEFAULT_LOOKBACK_DAYS,
            )?,
            pco_base_url: base_url(get("PCO_BASE_URL"), PCO_BASE_URL),
            bigquery_base_url: base_url(get("BIGQUERY_BASE_URL"), BIGQUERY_BASE_URL),
            metadata_base_url: base_url(
                get("GCE_METADATA_HOST").map(|h| {
                    if h.contains("://") {
                        h
                    } else {
                        format!("http://{h}")
                    }
                }),
                METADATA_BASE_URL,
            ),
            access_token: get("GOOGLE_OAUTH_ACCESS_TOKEN").map(SecretString::from),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, SettingsError>
where
    T::Err: fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|e: T::Err| SettingsError::Invalid {
            key,
            detail: e.to_string(),
        }),
    }
}

fn base_url(value: Option<String>, default: &str) -> String {
    value
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_owned()
}
