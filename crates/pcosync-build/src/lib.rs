//! Image definition, source bundling, eject, and leak scanning for pcosync.
//!
//! # Deploy pipeline
//!
//! ```text
//! pcosync deploy
//!   1. Dirty check  ── git status --porcelain (skip with --allow-dirty)
//!   2. Dockerfile   ── DockerfileGenerator::render() or .pcosync/Dockerfile
//!   3. Bundle       ── git ls-files → .pcosync-bundle/
//!   4. Leak scan    ── .env secret values must not appear in the bundle
//!   5. Cloud Build  ── gcloud builds submit .pcosync-bundle/
//!   6. Cloud Run    ── gcloud run deploy / gcloud run jobs deploy
//! ```
//!
//! # Runtime content
//!
//! The runtime stage always holds the worker binary as `app` and starts it
//! with the single command implied by `[deploy].target`. `[build].include`
//! adds extra paths; `[build].env` adds non-secret `ENV` lines. Secrets
//! never appear in the image: they are injected at deploy time.

pub mod bundle;
pub mod dockerfile;
pub mod eject;
pub mod leak;

pub use dockerfile::{DockerfileError, DockerfileGenerator};
pub use leak::{KnownSecret, LeakFinding};
