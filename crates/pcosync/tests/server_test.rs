use std::collections::HashMap;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use pcosync::server::{self, BUSY, STARTED, SUCCEEDED};
use pcosync::{AppState, Settings, TriggerMode, Worker};
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Settings pointing both APIs at `server`.
fn settings(server: &MockServer, extra: &[(&str, &str)]) -> Settings {
    let mut env: HashMap<String, String> = [
        ("CLIENT_ID", "app-id"),
        ("CLIENT_SECRET", "app-secret"),
        ("BQ_DATASET", "church-data.giving"),
        ("GOOGLE_OAUTH_ACCESS_TOKEN", "test-token"),
    ]
    .iter()
    .chain(extra)
    .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
    .collect();
    env.insert("PCO_BASE_URL".to_owned(), server.uri());
    env.insert("BIGQUERY_BASE_URL".to_owned(), server.uri());
    Settings::from_lookup(|k| env.get(k).cloned()).unwrap()
}

async fn app(server: &MockServer, mode: TriggerMode, extra: &[(&str, &str)]) -> (Router, AppState) {
    let settings = settings(server, extra);
    let worker = Worker::from_settings(&settings).await.unwrap();
    let state = AppState::new(worker, mode, settings.trigger_key.clone());
    (server::router(state.clone()), state)
}

/// Every Planning Center collection returns no records.
async fn empty_collections(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/(giving|people)/v2/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(server)
        .await;
}

async fn get(app: Router, uri: &str, key: Option<&str>) -> (StatusCode, String) {
    let mut request = Request::builder().uri(uri);
    if let Some(key) = key {
        request = request.header("X-Trigger-Key", key);
    }
    let response = app
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn health_is_ok() {
    let server = MockServer::start().await;
    let (app, _) = app(&server, TriggerMode::Background, &[]).await;

    let (status, body) = get(app, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn wait_mode_reports_success() {
    let server = MockServer::start().await;
    empty_collections(&server).await;
    let (app, state) = app(&server, TriggerMode::Wait, &[]).await;

    let (status, body) = get(app, "/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, SUCCEEDED);
    assert!(!state.lock.is_running());
}

#[tokio::test]
async fn wait_mode_reports_failure_as_500() {
    let server = MockServer::start().await;
    Mock::given(path("/giving/v2/donations"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;
    let (app, state) = app(&server, TriggerMode::Wait, &[]).await;

    let (status, body) = get(app, "/", None).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.starts_with("Error: donations: "), "{body}");
    assert!(body.contains("upstream down"));
    assert!(!state.lock.is_running());
}

#[tokio::test]
async fn wait_mode_inserts_new_records() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/giving/v2/funds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "type": "Fund", "id": "12", "attributes": { "name": "Missions" } }]
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    empty_collections(&server).await;
    Mock::given(method("POST"))
        .and(path("/projects/church-data/queries"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/projects/church-data/datasets/giving/tables/pco-funds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/projects/church-data/datasets/giving/tables/pco-funds/insertAll"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    let (app, _) = app(&server, TriggerMode::Wait, &[]).await;

    let (status, _) = get(app, "/", None).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn background_mode_accepts_immediately() {
    let server = MockServer::start().await;
    empty_collections(&server).await;
    let (app, _) = app(&server, TriggerMode::Background, &[]).await;

    let (status, body) = get(app, "/", None).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, STARTED);
}

#[tokio::test]
async fn overlapping_trigger_is_rejected() {
    let server = MockServer::start().await;
    let (app, state) = app(&server, TriggerMode::Background, &[]).await;
    let _running = state.lock.try_acquire().unwrap();

    let (status, body) = get(app, "/", None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, BUSY);
}

#[tokio::test]
async fn trigger_key_is_enforced() {
    let server = MockServer::start().await;
    empty_collections(&server).await;
    let (app, _) = app(&server, TriggerMode::Wait, &[("TRIGGER_KEY", "s3cret-key")]).await;

    let (missing, _) = get(app.clone(), "/", None).await;
    let (wrong, _) = get(app.clone(), "/", Some("guess")).await;
    let (right, _) = get(app.clone(), "/", Some("s3cret-key")).await;
    let (health, _) = get(app, "/health", None).await;

    assert_eq!(missing, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong, StatusCode::UNAUTHORIZED);
    assert_eq!(right, StatusCode::OK);
    assert_eq!(health, StatusCode::OK);
}

#[tokio::test]
async fn unqualified_dataset_without_project_is_rejected() {
    let server = MockServer::start().await;
    let mut env = HashMap::from([
        ("CLIENT_ID".to_owned(), "app-id".to_owned()),
        ("CLIENT_SECRET".to_owned(), "app-secret".to_owned()),
        ("BQ_DATASET".to_owned(), "giving".to_owned()),
        ("GOOGLE_OAUTH_ACCESS_TOKEN".to_owned(), "test-token".to_owned()),
    ]);
    env.insert("PCO_BASE_URL".to_owned(), server.uri());
    let settings = Settings::from_lookup(|k| env.get(k).cloned()).unwrap();

    let err = Worker::from_settings(&settings).await.unwrap_err();

    assert!(matches!(err, pcosync::SyncError::MissingProject));
}
