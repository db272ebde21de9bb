use pcosync::SyncError;
use pcosync::catalog::{DONATIONS, FUNDS};
use pcosync::token::TokenSource;
use pcosync::transform::Row;
use pcosync::warehouse::{BigQueryClient, INSERT_BATCH_SIZE, Warehouse};
use secrecy::SecretString;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const QUERIES: &str = "/projects/church-data/queries";
const FUNDS_TABLE: &str = "/projects/church-data/datasets/giving/tables/pco-funds";

fn client(server: &MockServer) -> BigQueryClient {
    BigQueryClient::new(
        reqwest::Client::new(),
        server.uri(),
        "church-data",
        "giving",
        TokenSource::Static(SecretString::from("test-token".to_owned())),
    )
}

fn fund_row(id: usize) -> Row {
    let mut row = Row::new();
    row.insert("fund_id".to_owned(), Value::String(id.to_string()));
    row.insert("name".to_owned(), Value::String(format!("Fund {id}")));
    row
}

fn id_rows(ids: &[&str]) -> Value {
    Value::Array(
        ids.iter()
            .map(|id| json!({ "f": [{ "v": id }] }))
            .collect(),
    )
}

// ── existing ids ──

#[tokio::test]
async fn existing_ids_queries_distinct_ids_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERIES))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "query": "SELECT DISTINCT `fund_id` FROM `church-data.giving.pco-funds`",
            "useLegacySql": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": true,
            "jobReference": { "jobId": "job_1", "location": "US" },
            "rows": id_rows(&["1", "2"])
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ids = client(&server).existing_ids(&FUNDS).await.unwrap();

    assert_eq!(ids.len(), 2);
    assert!(ids.contains("1") && ids.contains("2"));
}

#[tokio::test]
async fn missing_table_means_no_existing_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERIES))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": 404, "message": "Not found: Table church-data:giving.pco-funds" }
        })))
        .mount(&server)
        .await;

    let ids = client(&server).existing_ids(&FUNDS).await.unwrap();

    assert!(ids.is_empty());
}

#[tokio::test]
async fn existing_ids_polls_and_pages_query_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERIES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": false,
            "jobReference": { "jobId": "job_7", "location": "US" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{QUERIES}/job_7")))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": true,
            "rows": id_rows(&["3"])
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{QUERIES}/job_7")))
        .and(query_param("location", "US"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": true,
            "jobReference": { "jobId": "job_7", "location": "US" },
            "rows": id_rows(&["1", "2"]),
            "pageToken": "p2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ids = client(&server).existing_ids(&FUNDS).await.unwrap();

    assert_eq!(ids.len(), 3);
    assert!(ids.contains("3"));
}

// ── table creation ──

#[tokio::test]
async fn ensure_table_leaves_existing_table_alone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FUNDS_TABLE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "pco-funds" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    client(&server).ensure_table(&FUNDS).await.unwrap();
}

#[tokio::test]
async fn ensure_table_creates_missing_table_with_schema() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/church-data/datasets/giving/tables/pco-donations"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/projects/church-data/datasets/giving/tables"))
        .and(body_partial_json(json!({
            "tableReference": { "tableId": "pco-donations" },
            "schema": { "fields": [
                { "name": "donation_id", "type": "STRING", "mode": "REQUIRED" },
                { "name": "amount", "type": "FLOAT", "mode": "NULLABLE" },
                { "name": "completed_date", "type": "TIMESTAMP", "mode": "NULLABLE" },
                { "name": "status", "type": "STRING", "mode": "NULLABLE" }
            ] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "pco-donations" })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).ensure_table(&DONATIONS).await.unwrap();
}

// ── inserts ──

#[tokio::test]
async fn insert_rows_batches_and_uses_ids_as_insert_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{FUNDS_TABLE}/insertAll")))
        .respond_with(|req: &Request| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            let rows = body["rows"].as_array().unwrap();
            assert!(rows.len() <= INSERT_BATCH_SIZE);
            for row in rows {
                assert_eq!(row["insertId"], row["json"]["fund_id"]);
            }
            ResponseTemplate::new(200).set_body_json(json!({ "kind": "bigquery#tableDataInsertAllResponse" }))
        })
        .expect(3)
        .mount(&server)
        .await;

    let rows: Vec<Row> = (0..1_201).map(fund_row).collect();
    let written = client(&server).insert_rows(&FUNDS, &rows).await.unwrap();

    assert_eq!(written, 1_201);
}

#[tokio::test]
async fn insert_errors_fail_the_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{FUNDS_TABLE}/insertAll")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "insertErrors": [
                { "index": 1, "errors": [{ "reason": "invalid", "message": "no such field: colour" }] }
            ]
        })))
        .mount(&server)
        .await;

    let rows = vec![fund_row(1), fund_row(2)];
    let err = client(&server).insert_rows(&FUNDS, &rows).await.unwrap_err();

    match err {
        SyncError::InsertRejected {
            table,
            attempted,
            failed,
            first,
        } => {
            assert_eq!(table, "pco-funds");
            assert_eq!(attempted, 2);
            assert_eq!(failed, 1);
            assert_eq!(first, "row 1: invalid: no such field: colour");
        }
        other => panic!("expected InsertRejected, got {other:?}"),
    }
}
