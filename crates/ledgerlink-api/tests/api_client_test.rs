// Integration tests for `ApiClient` and `Prober` using wiremock.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ledgerlink_api::{ApiClient, Error, Prober, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, ApiClient) {
    let server = MockServer::start().await;
    let client = ApiClient::from_reqwest(&server.uri(), reqwest::Client::new()).unwrap();
    (server, client)
}

// ── REST ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_json_decodes_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/invoices/7"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": 7, "total": "120.50"})),
        )
        .mount(&server)
        .await;

    let body: serde_json::Value = client.get_json("/invoices/7").await.unwrap();
    assert_eq!(body["id"], 7);
    assert_eq!(body["total"], "120.50");
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let server = MockServer::start().await;
    let token = SecretString::from("abc123".to_owned());
    let client = ApiClient::new(
        server.uri().parse().unwrap(),
        Some(&token),
        &TransportConfig::default(),
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "ops"})))
        .expect(1)
        .mount(&server)
        .await;

    let me: serde_json::Value = client.get_json("me").await.unwrap();
    assert_eq!(me["name"], "ops");
}

#[tokio::test]
async fn test_server_error_maps_to_status() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/stock"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client.get_json::<serde_json::Value>("stock").await.unwrap_err();
    match err {
        Error::Status { status, ref message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "maintenance");
        }
        other => panic!("expected Status, got {other:?}"),
    }
    assert!(!err.is_network());
}

#[tokio::test]
async fn test_delete_not_found_maps_to_status() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/orders/9"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client.delete("orders/9").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert!(!err.is_network());
}

#[tokio::test]
async fn test_post_json_roundtrip() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/purchase-orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "po-1"})))
        .mount(&server)
        .await;

    let created: serde_json::Value = client
        .post_json("purchase-orders", &json!({"supplier": "acme"}))
        .await
        .unwrap();
    assert_eq!(created["id"], "po-1");
}

#[tokio::test]
async fn test_invalid_json_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client.get_json::<serde_json::Value>("broken").await.unwrap_err();
    assert!(matches!(err, Error::Deserialization { ref body, .. } if body == "<html>"));
}

#[test]
fn test_unprintable_token_is_rejected_as_invalid_token() {
    let base = "https://erp.example.com/api/".parse().unwrap();
    let token = SecretString::from("abc\ndef".to_owned());
    let err = ApiClient::new(base, Some(&token), &TransportConfig::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidToken(_)), "got {err:?}");
}

// ── Probe ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_probe_any_response_is_reachable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let url = format!("{}/health", server.uri()).parse().unwrap();
    let prober = Prober::new(url, &TransportConfig::default(), Duration::from_secs(2)).unwrap();
    let result = prober.probe().await;

    assert!(result.reachable);
    assert_eq!(result.status, Some(500));
}

#[tokio::test]
async fn test_probe_refused_connection_is_unreachable() {
    // Bind then drop to get a port nobody listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let url = format!("http://127.0.0.1:{port}/health").parse().unwrap();
    let prober = Prober::new(url, &TransportConfig::default(), Duration::from_secs(2)).unwrap();
    let result = prober.probe().await;

    assert!(!result.reachable);
    assert_eq!(result.status, None);
}
