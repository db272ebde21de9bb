//! OAuth access tokens and project discovery for Google APIs.
//!
//! On Cloud Run both come from the instance metadata server. Local runs and
//! tests supply a static token instead.

use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::SyncError;

/// Tokens are refreshed this long before the server says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const PROJECT_PATH: &str = "/computeMetadata/v1/project/project-id";

/// Client for the GCE/Cloud Run metadata server.
#[derive(Debug, Clone)]
pub struct MetadataServer {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl MetadataServer {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, SyncError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| SyncError::Request {
                url: url.clone(),
                source: e,
            })?;
        crate::http::ensure_success(url, response).await
    }

    async fn fetch_token(&self) -> Result<(SecretString, Duration), SyncError> {
        let response = self.get(TOKEN_PATH).await?;
        let url = response.url().to_string();
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Decode { url, source: e })?;
        Ok((
            SecretString::from(body.access_token),
            Duration::from_secs(body.expires_in),
        ))
    }

    /// Project the instance runs in.
    pub async fn project_id(&self) -> Result<String, SyncError> {
        let response = self.get(PROJECT_PATH).await?;
        let url = response.url().to_string();
        let text = response
            .text()
            .await
            .map_err(|e| SyncError::Decode { url, source: e })?;
        Ok(text.trim().to_owned())
    }
}

struct CachedToken {
    token: SecretString,
    refresh_at: Instant,
}

/// Where bearer tokens for BigQuery come from.
pub enum TokenSource {
    Static(SecretString),
    Metadata {
        server: MetadataServer,
        cache: Mutex<Option<CachedToken>>,
    },
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(_) => f.write_str("TokenSource::Static([REDACTED])"),
            Self::Metadata { server, .. } => f
                .debug_struct("TokenSource::Metadata")
                .field("base_url", &server.base_url)
                .finish_non_exhaustive(),
        }
    }
}

impl TokenSource {
    pub fn metadata(server: MetadataServer) -> Self {
        Self::Metadata {
            server,
            cache: Mutex::new(None),
        }
    }

    /// A valid bearer token, fetching a new one when the cached token is
    /// close to expiry.
    pub async fn access_token(&self) -> Result<SecretString, SyncError> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::Metadata { server, cache } => {
                let mut cached = cache.lock().await;
                if let Some(c) = cached.as_ref()
                    && Instant::now() < c.refresh_at
                {
                    return Ok(c.token.clone());
                }

                let (token, lifetime) = server.fetch_token().await?;
                tracing::debug!(expires_in = lifetime.as_secs(), "fetched metadata access token");
                *cached = Some(CachedToken {
                    token: token.clone(),
                    refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
                });
                Ok(token)
            }
        }
    }

    /// Header value for `Authorization`.
    pub async fn bearer(&self) -> Result<String, SyncError> {
        Ok(format!("Bearer {}", self.access_token().await?.expose_secret()))
    }
}
