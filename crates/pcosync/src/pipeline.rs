//! One sync run: every catalog endpoint, fetched, converted and appended.

use std::fmt;

use chrono::{NaiveDate, Utc};

use crate::catalog::{ENDPOINTS, Endpoint};
use crate::error::SyncError;
use crate::planning_center::{PlanningCenterClient, RecordSource};
use crate::settings::Settings;
use crate::token::{MetadataServer, TokenSource};
use crate::transform::{self, row_id};
use crate::warehouse::{BigQueryClient, Warehouse};

/// What happened to one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The API returned no records
    Skipped,
    /// Every fetched record was already stored
    UpToDate,
    Inserted(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointReport {
    pub endpoint: &'static str,
    pub table: &'static str,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub endpoints: Vec<EndpointReport>,
}

impl RunReport {
    pub fn inserted_total(&self) -> usize {
        self.endpoints
            .iter()
            .map(|r| match r.outcome {
                Outcome::Inserted(n) => n,
                _ => 0,
            })
            .sum()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in &self.endpoints {
            match r.outcome {
                Outcome::Skipped => writeln!(f, "{}: no data retrieved, skipped", r.endpoint)?,
                Outcome::UpToDate => writeln!(f, "{}: no new records for {}", r.endpoint, r.table)?,
                Outcome::Inserted(n) => {
                    writeln!(f, "{}: inserted {n} new records into {}", r.endpoint, r.table)?
                }
            }
        }
        Ok(())
    }
}

/// Pulls records from a [`RecordSource`] into a [`Warehouse`].
#[derive(Debug)]
pub struct Pipeline<S, W> {
    source: S,
    warehouse: W,
    endpoints: &'static [Endpoint],
    lookback_days: u32,
}

/// The production pipeline.
pub type Worker = Pipeline<PlanningCenterClient, BigQueryClient>;

impl<S: RecordSource, W: Warehouse> Pipeline<S, W> {
    pub fn new(source: S, warehouse: W, lookback_days: u32) -> Self {
        Self {
            source,
            warehouse,
            endpoints: ENDPOINTS,
            lookback_days,
        }
    }

    pub fn with_endpoints(mut self, endpoints: &'static [Endpoint]) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Run with today's (UTC) date as the end of the donation window.
    pub async fn run_today(&self) -> Result<RunReport, SyncError> {
        self.run(Utc::now().date_naive()).await
    }

    /// Process every endpoint in order. The first failure aborts the run.
    pub async fn run(&self, today: NaiveDate) -> Result<RunReport, SyncError> {
        let mut report = RunReport::default();
        for endpoint in self.endpoints {
            let outcome = self
                .process_endpoint(endpoint, today)
                .await
                .map_err(|e| e.in_endpoint(endpoint.name))?;
            report.endpoints.push(EndpointReport {
                endpoint: endpoint.name,
                table: endpoint.table,
                outcome,
            });
        }
        tracing::info!(inserted = report.inserted_total(), "all endpoints processed");
        Ok(report)
    }

    pub async fn process_endpoint(
        &self,
        endpoint: &Endpoint,
        today: NaiveDate,
    ) -> Result<Outcome, SyncError> {
        tracing::info!(endpoint = endpoint.name, "processing");

        let filters = endpoint.filters(today, self.lookback_days);
        let items = self.source.fetch_all(endpoint.path, &filters).await?;
        if items.is_empty() {
            tracing::info!(endpoint = endpoint.name, "no data retrieved; skipping");
            return Ok(Outcome::Skipped);
        }

        let existing = self.warehouse.existing_ids(endpoint).await?;
        let new_rows: Vec<_> = transform::to_rows(endpoint, &items)
            .into_iter()
            .filter(|row| !existing.contains(row_id(endpoint, row)))
            .collect();

        if new_rows.is_empty() {
            tracing::info!(endpoint = endpoint.name, table = endpoint.table, "no new records");
            return Ok(Outcome::UpToDate);
        }

        self.warehouse.ensure_table(endpoint).await?;
        let inserted = self.warehouse.insert_rows(endpoint, &new_rows).await?;
        tracing::info!(
            endpoint = endpoint.name,
            table = endpoint.table,
            inserted,
            "inserted new records",
        );
        Ok(Outcome::Inserted(inserted))
    }
}

impl Worker {
    /// Wire the Planning Center and BigQuery clients from settings.
    pub async fn from_settings(settings: &Settings) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pcosync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::HttpClient { source: e })?;

        let metadata = MetadataServer::new(http.clone(), settings.metadata_base_url.clone());
        let project = resolve_project(settings, &metadata).await?;
        let tokens = match &settings.access_token {
            Some(token) => TokenSource::Static(token.clone()),
            None => TokenSource::metadata(metadata),
        };
        tracing::info!(project = %project, dataset = %settings.dataset.dataset, "warehouse configured");

        let source = PlanningCenterClient::from_settings(http.clone(), settings);
        let warehouse = BigQueryClient::new(
            http,
            settings.bigquery_base_url.clone(),
            project,
            settings.dataset.dataset.clone(),
            tokens,
        );
        Ok(Self::new(source, warehouse, settings.lookback_days))
    }
}

/// The dataset's own project, else `GOOGLE_CLOUD_PROJECT`, else the
/// project reported by the metadata server.
async fn resolve_project(
    settings: &Settings,
    metadata: &MetadataServer,
) -> Result<String, SyncError> {
    if let Some(project) = settings
        .dataset
        .project
        .as_ref()
        .or(settings.gcp_project.as_ref())
    {
        return Ok(project.clone());
    }
    if settings.access_token.is_some() {
        return Err(SyncError::MissingProject);
    }

    let project = metadata.project_id().await?;
    if project.is_empty() {
        return Err(SyncError::MissingProject);
    }
    Ok(project)
}
