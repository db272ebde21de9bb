use pcosync::SyncError;
use pcosync::planning_center::{PlanningCenterClient, RecordSource};
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// base64("app-id:app-secret")
const BASIC_AUTH: &str = "Basic YXBwLWlkOmFwcC1zZWNyZXQ=";

fn client(server: &MockServer) -> PlanningCenterClient {
    PlanningCenterClient::new(
        reqwest::Client::new(),
        server.uri(),
        SecretString::from("app-id".to_owned()),
        SecretString::from("app-secret".to_owned()),
    )
}

fn fund(id: &str) -> serde_json::Value {
    json!({ "type": "Fund", "id": id, "attributes": { "name": format!("Fund {id}") } })
}

#[tokio::test]
async fn sends_base64_basic_auth_and_page_size() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/giving/v2/funds"))
        .and(header("authorization", BASIC_AUTH))
        .and(query_param("per_page", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [fund("1"), fund("2")],
            "links": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = client(&server).fetch_all("giving/v2/funds", &[]).await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], "1");
}

#[tokio::test]
async fn follows_next_links_until_exhausted() {
    let server = MockServer::start().await;
    let next = format!("{}/giving/v2/funds?offset=100&per_page=100", server.uri());

    Mock::given(path("/giving/v2/funds"))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [fund("101")],
            "links": { "self": "ignored" }
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/giving/v2/funds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [fund("1"), fund("2")],
            "links": { "next": next }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = client(&server).fetch_all("giving/v2/funds", &[]).await.unwrap();

    let ids: Vec<_> = items.iter().map(|i| i["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["1", "2", "101"]);
}

#[tokio::test]
async fn passes_window_filters() {
    let server = MockServer::start().await;
    Mock::given(path("/giving/v2/donations"))
        .and(query_param("where[completed_at][gte]", "2024-02-29"))
        .and(query_param("where[completed_at][lt]", "2024-03-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let filters = vec![
        ("where[completed_at][gte]".to_owned(), "2024-02-29".to_owned()),
        ("where[completed_at][lt]".to_owned(), "2024-03-01".to_owned()),
    ];
    let items = client(&server)
        .fetch_all("giving/v2/donations", &filters)
        .await
        .unwrap();

    assert!(items.is_empty());
}

#[tokio::test]
async fn retries_after_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(path("/people/v2/people"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(path("/people/v2/people"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "9", "attributes": { "first_name": "Ada" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = client(&server).fetch_all("people/v2/people", &[]).await.unwrap();

    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(path("/giving/v2/funds"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server)
        .with_max_attempts(3)
        .fetch_all("giving/v2/funds", &[])
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::RateLimited { attempts: 3, .. }));
}

#[tokio::test]
async fn server_errors_fail_with_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(path("/giving/v2/campuses"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let err = client(&server)
        .fetch_all("giving/v2/campuses", &[])
        .await
        .unwrap_err();

    match err {
        SyncError::Status { status, body, .. } => {
            assert_eq!(status, 401);
            assert_eq!(body, "bad credentials");
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn single_resource_documents_are_accepted() {
    let server = MockServer::start().await;
    Mock::given(path("/giving/v2/funds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": fund("5") })))
        .mount(&server)
        .await;

    let items = client(&server).fetch_all("/giving/v2/funds", &[]).await.unwrap();

    assert_eq!(items.len(), 1);
}
