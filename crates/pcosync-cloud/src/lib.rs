//! Thin, mockable layer over the `gcloud` CLI.
//!
//! Every GCP interaction of the deploy tool goes through [`GcloudClient`],
//! which delegates process execution to a [`GcloudExecutor`].

pub mod client;
pub mod executor;
pub mod gcloud;

pub use client::{
    ApiCheck, CheckResult, CloudBuildError, DeployError, DoctorReport, GcloudClient,
    PreflightError, PreflightReport, RunKind, RunTarget, SecretError, compute_service_account,
};
pub use executor::{GcloudExecutor, RealExecutor};
pub use gcloud::GcloudError;
