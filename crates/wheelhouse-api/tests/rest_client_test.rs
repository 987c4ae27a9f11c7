// Integration tests for `RestClient` using wiremock.

use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wheelhouse_api::{Error, RestClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RestClient) {
    let server = MockServer::start().await;
    let base = Url::parse(&server.uri()).expect("mock server uri");
    let client = RestClient::new(base, &TransportConfig::default()).expect("client");
    (server, client)
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn list_page_with_profile_scope() {
    let (server, client) = setup().await;

    let body = json!({
        "items": [
            { "id": "r-1", "name": "web", "rule": "Host(`a.example`)", "service": "web-svc" },
            { "id": "r-2", "name": "api", "rule": "Host(`b.example`)", "service": "api-svc" },
        ],
        "total": 12
    });

    Mock::given(method("GET"))
        .and(path("/api/router"))
        .and(query_param("page", "0"))
        .and(query_param("page_size", "10"))
        .and(query_param("profile_id", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let page = client.list_page("router", Some("7"), 10, 0).await.expect("page");

    assert_eq!(page.total_count, 12);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0]["id"], "r-1");
    assert_eq!(page.items[1]["service"], "api-svc");
}

#[tokio::test]
async fn list_page_global_scope_omits_profile_param() {
    let (server, client) = setup().await;

    let body = json!({ "items": [ { "id": "a-1", "hostname": "edge-1" } ], "total": 1 });

    Mock::given(method("GET"))
        .and(path("/api/agent"))
        .and(query_param("page", "2"))
        .and(query_param("page_size", "25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let page = client.list_page("agent", None, 25, 2).await.expect("page");
    assert_eq!(page.total_count, 1);
}

#[tokio::test]
async fn bearer_token_is_sent() {
    let server = MockServer::start().await;
    let base = Url::parse(&server.uri()).expect("mock server uri");
    let config = TransportConfig {
        token: Some(secrecy::SecretString::from("sekrit".to_string())),
        ..TransportConfig::default()
    };
    let client = RestClient::new(base, &config).expect("client");

    Mock::given(method("GET"))
        .and(path("/api/service"))
        .and(header("authorization", "Bearer sekrit"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "items": [], "total": 0 })),
        )
        .mount(&server)
        .await;

    let page = client.list_page("service", None, 10, 0).await.expect("page");
    assert_eq!(page.total_count, 0);
}

// ── Error paths ─────────────────────────────────────────────────────

#[tokio::test]
async fn unauthorized_maps_to_authentication_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/router"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    let err = client.list_page("router", None, 10, 0).await.expect_err("401");
    assert!(matches!(err, Error::Authentication { .. }));
}

#[tokio::test]
async fn server_error_maps_to_api_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/middleware"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client
        .list_page("middleware", None, 10, 0)
        .await
        .expect_err("500");
    match err {
        Error::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_maps_to_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/router"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client.list_page("router", None, 10, 0).await.expect_err("bad body");
    assert!(matches!(err, Error::Deserialization { .. }));
}
