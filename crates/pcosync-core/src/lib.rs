//! Core types and configuration for pcosync.
//!
//! This crate defines the `pcosync.toml` schema ([`PcosyncConfig`]),
//! the deployment target that fixes the container entry point
//! ([`DeployTarget`]), worker package discovery ([`WorkerPackage`]),
//! and shared error types.

pub mod cargo;
pub mod config;
pub mod error;
pub mod target;

pub use cargo::{WorkerBinary, WorkerPackage};
pub use config::{
    BuildConfig, CONFIG_FILE, CloudRunConfig, DeployConfig, PcosyncConfig, ProjectConfig,
};
pub use error::{Error, Result};
pub use target::{DeployTarget, IMAGE_BINARY, RunResource};
