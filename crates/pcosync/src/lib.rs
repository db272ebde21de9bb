//! Planning Center → BigQuery sync worker.
//!
//! Pulls giving data (donations, designations, funds, campuses) and people
//! from the Planning Center API and appends records not yet present into
//! BigQuery tables, one table per endpoint.
//!
//! ```rust,no_run
//! use pcosync::{Settings, Worker};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings = Settings::load()?;
//! let worker = Worker::from_settings(&settings).await?;
//! let report = worker.run_today().await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod error;
mod http;
pub mod pipeline;
pub mod planning_center;
pub mod server;
pub mod settings;
pub mod token;
pub mod transform;
pub mod warehouse;

pub use catalog::{ENDPOINTS, Endpoint, FieldType};
pub use error::{SettingsError, SyncError};
pub use pipeline::{EndpointReport, Outcome, Pipeline, RunReport, Worker};
pub use planning_center::{PlanningCenterClient, RecordSource};
pub use server::{AppState, TriggerMode};
pub use settings::{DatasetRef, Settings};
pub use token::{MetadataServer, TokenSource};
pub use warehouse::{BigQueryClient, Warehouse};
