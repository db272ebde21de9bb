//! BigQuery as the sync destination, over its REST API.

use std::collections::HashSet;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::catalog::Endpoint;
use crate::error::SyncError;
use crate::http::ensure_success;
use crate::token::TokenSource;
use crate::transform::{Row, row_id};

/// Rows per `insertAll` request.
pub const INSERT_BATCH_SIZE: usize = 500;

const QUERY_TIMEOUT_MS: u32 = 30_000;
const QUERY_PAGE_SIZE: u32 = 10_000;

/// Destination of converted rows.
#[allow(async_fn_in_trait)]
pub trait Warehouse: Send + Sync {
    /// Ids already stored for the endpoint. A table that does not exist
    /// yet has none.
    async fn existing_ids(&self, endpoint: &Endpoint) -> Result<HashSet<String>, SyncError>;

    /// Create the endpoint's table when it is missing.
    async fn ensure_table(&self, endpoint: &Endpoint) -> Result<(), SyncError>;

    /// Append rows, returning how many were written.
    async fn insert_rows(&self, endpoint: &Endpoint, rows: &[Row]) -> Result<usize, SyncError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
    job_reference: Option<JobReference>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<Cell>,
}

#[derive(Deserialize)]
struct Cell {
    #[serde(default)]
    v: Value,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertError>,
}

#[derive(Deserialize)]
struct InsertError {
    #[serde(default)]
    index: u64,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

#[derive(Debug)]
pub struct BigQueryClient {
    http: reqwest::Client,
    base_url: String,
    project: String,
    dataset: String,
    tokens: TokenSource,
}

impl BigQueryClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        project: impl Into<String>,
        dataset: impl Into<String>,
        tokens: TokenSource,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            project: project.into(),
            dataset: dataset.into(),
            tokens,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn dataset_url(&self) -> String {
        format!(
            "{}/projects/{}/datasets/{}",
            self.base_url, self.project, self.dataset
        )
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/tables/{table}", self.dataset_url())
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Response, SyncError> {
        request
            .header(reqwest::header::AUTHORIZATION, self.tokens.bearer().await?)
            .send()
            .await
            .map_err(|e| SyncError::Request {
                url: url.to_owned(),
                source: e,
            })
    }

    async fn json<T: serde::de::DeserializeOwned>(
        url: String,
        response: Response,
    ) -> Result<T, SyncError> {
        let response = ensure_success(url.clone(), response).await?;
        response
            .json()
            .await
            .map_err(|e| SyncError::Decode { url, source: e })
    }

    async fn poll_query(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, SyncError> {
        let url = format!(
            "{}/projects/{}/queries/{}",
            self.base_url, self.project, job.job_id
        );
        let mut query = vec![
            ("timeoutMs", QUERY_TIMEOUT_MS.to_string()),
            ("maxResults", QUERY_PAGE_SIZE.to_string()),
        ];
        if let Some(location) = &job.location {
            query.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_owned()));
        }

        let response = self.send(&url, self.http.get(&url).query(&query)).await?;
        Self::json(url, response).await
    }
}

impl Warehouse for BigQueryClient {
    async fn existing_ids(&self, endpoint: &Endpoint) -> Result<HashSet<String>, SyncError> {
        let url = format!("{}/projects/{}/queries", self.base_url, self.project);
        let sql = format!(
            "SELECT DISTINCT `{}` FROM `{}.{}.{}`",
            endpoint.id_column, self.project, self.dataset, endpoint.table
        );
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": QUERY_TIMEOUT_MS,
            "maxResults": QUERY_PAGE_SIZE,
        });

        let response = self.send(&url, self.http.post(&url).json(&body)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!(table = endpoint.table, "table not found; treating as empty");
            return Ok(HashSet::new());
        }
        let mut page: QueryResponse = Self::json(url, response).await?;

        let mut ids = HashSet::new();
        loop {
            if page.job_complete {
                ids.extend(
                    page.rows
                        .iter()
                        .filter_map(|row| row.f.first())
                        .filter_map(|cell| cell.v.as_str())
                        .map(str::to_owned),
                );
            }

            let next_token = match (page.job_complete, page.page_token.as_deref()) {
                (true, None) => break,
                (true, Some(token)) => Some(token.to_owned()),
                (false, _) => None,
            };
            let Some(job) = page.job_reference.take() else {
                tracing::warn!(table = endpoint.table, "query response without job reference");
                break;
            };
            let mut next = self.poll_query(&job, next_token.as_deref()).await?;
            if next.job_reference.is_none() {
                next.job_reference = Some(job);
            }
            page = next;
        }

        tracing::debug!(table = endpoint.table, count = ids.len(), "existing ids");
        Ok(ids)
    }

    async fn ensure_table(&self, endpoint: &Endpoint) -> Result<(), SyncError> {
        let url = self.table_url(endpoint.table);
        let response = self.send(&url, self.http.get(&url)).await?;
        if response.status() != StatusCode::NOT_FOUND {
            ensure_success(url, response).await?;
            return Ok(());
        }

        let create_url = format!("{}/tables", self.dataset_url());
        let body = json!({
            "tableReference": {
                "projectId": self.project,
                "datasetId": self.dataset,
                "tableId": endpoint.table,
            },
            "schema": endpoint.schema(),
        });
        let response = self
            .send(&create_url, self.http.post(&create_url).json(&body))
            .await?;
        if response.status() == StatusCode::CONFLICT {
            tracing::debug!(table = endpoint.table, "table created concurrently");
            return Ok(());
        }
        ensure_success(create_url, response).await?;
        tracing::info!(table = endpoint.table, "created table");
        Ok(())
    }

    async fn insert_rows(&self, endpoint: &Endpoint, rows: &[Row]) -> Result<usize, SyncError> {
        let url = format!("{}/insertAll", self.table_url(endpoint.table));
        let mut written = 0;

        for chunk in rows.chunks(INSERT_BATCH_SIZE) {
            let body = json!({
                "kind": "bigquery#tableDataInsertAllRequest",
                "rows": chunk
                    .iter()
                    .map(|row| json!({ "insertId": row_id(endpoint, row), "json": row }))
                    .collect::<Vec<_>>(),
            });
            let response = self.send(&url, self.http.post(&url).json(&body)).await?;
            let result: InsertAllResponse = Self::json(url.clone(), response).await?;

            if let Some(first) = result.insert_errors.first() {
                let detail = first
                    .errors
                    .first()
                    .map(|e| {
                        format!(
                            "{}: {}",
                            e.reason.as_deref().unwrap_or("error"),
                            e.message.as_deref().unwrap_or("")
                        )
                    })
                    .unwrap_or_else(|| "unknown error".to_owned());
                return Err(SyncError::InsertRejected {
                    table: endpoint.table.to_owned(),
                    attempted: chunk.len(),
                    failed: result.insert_errors.len(),
                    first: format!("row {}: {detail}", first.index),
                });
            }
            written += chunk.len();
            tracing::debug!(table = endpoint.table, batch = chunk.len(), "inserted batch");
        }

        Ok(written)
    }
}
