//! HTTP trigger for the sync run.
//!
//! `GET /` starts a run. In [`TriggerMode::Background`] the request returns
//! `202` immediately and the run continues in a spawned task; in
//! [`TriggerMode::Wait`] the response reports the run's result. Only one
//! run may be active per process.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use secrecy::{ExposeSecret, SecretString};
use tower_http::trace::TraceLayer;

use crate::pipeline::Worker;

pub const STARTED: &str = "Planning Center API processing started!";
pub const SUCCEEDED: &str = "All endpoints processed successfully.";
pub const BUSY: &str = "A sync run is already in progress.";

const TRIGGER_KEY_HEADER: &str = "x-trigger-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Respond 202 and sync in the background
    Background,
    /// Sync before responding
    Wait,
}

/// Process-wide guard against overlapping runs.
#[derive(Debug, Default)]
pub struct RunLock {
    running: AtomicBool,
}

/// Held for the duration of a run; releases the lock on drop.
#[derive(Debug)]
pub struct RunPermit {
    lock: Arc<RunLock>,
}

impl RunLock {
    pub fn try_acquire(self: &Arc<Self>) -> Option<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then(|| RunPermit {
                lock: Arc::clone(self),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.lock.running.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<Worker>,
    pub lock: Arc<RunLock>,
    pub mode: TriggerMode,
    pub trigger_key: Option<SecretString>,
}

impl AppState {
    pub fn new(worker: Worker, mode: TriggerMode, trigger_key: Option<SecretString>) -> Self {
        Self {
            worker: Arc::new(worker),
            lock: Arc::new(RunLock::default()),
            mode,
            trigger_key,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(trigger))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_trigger_key,
        ))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `0.0.0.0:port` and serve until Ctrl-C or SIGTERM.
pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, mode = ?state.mode, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutting down");
}

async fn health() -> &'static str {
    "ok"
}

async fn trigger(State(state): State<AppState>) -> Response {
    let Some(permit) = state.lock.try_acquire() else {
        tracing::warn!("trigger rejected; run already in progress");
        return (StatusCode::CONFLICT, BUSY).into_response();
    };

    match state.mode {
        TriggerMode::Background => {
            let worker = Arc::clone(&state.worker);
            tokio::spawn(async move {
                let _permit = permit;
                match worker.run_today().await {
                    Ok(report) => {
                        tracing::info!(inserted = report.inserted_total(), "background run finished")
                    }
                    Err(e) => tracing::error!(error = %e, "background run failed"),
                }
            });
            (StatusCode::ACCEPTED, STARTED).into_response()
        }
        TriggerMode::Wait => {
            let result = state.worker.run_today().await;
            drop(permit);
            match result {
                Ok(_) => (StatusCode::OK, SUCCEEDED).into_response(),
                Err(e) => {
                    tracing::error!(error = %e, "run failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {e}")).into_response()
                }
            }
        }
    }
}

/// Rejects trigger requests without the configured `X-Trigger-Key`.
/// Passes everything through when no key is configured.
async fn require_trigger_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.trigger_key.as_ref() else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(TRIGGER_KEY_HEADER)
        // arch-lint: allow(no-silent-result-drop) reason="non-ASCII header value cannot match the key; treated as absent"
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!(path = %request.uri(), "missing trigger key");
            StatusCode::UNAUTHORIZED
        })?;

    if !constant_time_eq(provided.as_bytes(), expected.expose_secret().as_bytes()) {
        tracing::warn!(path = %request.uri(), "invalid trigger key");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permit_releases_on_drop() {
        let lock = Arc::new(RunLock::default());
        let permit = lock.try_acquire().unwrap();
        assert!(lock.is_running());
        assert!(lock.try_acquire().is_none());
        drop(permit);
        assert!(!lock.is_running());
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn constant_time_eq_compares_content_and_length() {
        assert!(constant_time_eq(b"key", b"key"));
        assert!(!constant_time_eq(b"key", b"kez"));
        assert!(!constant_time_eq(b"key", b"keys"));
    }
}
