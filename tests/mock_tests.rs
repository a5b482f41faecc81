//! Mock-based tests for the upstream interactions.
//!
//! These tests use wiremock to stand in for the upstream API and drive the
//! full router with `oneshot`, so no real network traffic leaves the host.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use openrouter_proxy::{
    build_router,
    core::{init_metrics, AppConfig},
    AppState,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::{
    matchers::{body_string, header as header_matcher, method, path},
    Mock, MockServer, ResponseTemplate,
};

const API_KEY: &str = "sk-or-test-key";

fn config_for(base_url: &str, api_key: Option<&str>) -> AppConfig {
    let mut config = AppConfig::default();
    config.upstream.base_url = base_url.to_string();
    config.upstream.api_key = api_key.map(str::to_string);
    config.upstream.request_timeout_secs = 5;
    config.upstream.connect_timeout_secs = 2;
    config
}

fn create_test_app(config: AppConfig) -> Router {
    init_metrics();
    let state = AppState::new(config).expect("Failed to build app state");
    build_router(Arc::new(state))
}

fn chat_request(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: Response) -> axum::body::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn upstream_catalog() -> Value {
    json!({
        "data": [
            {"id": "openai/gpt-4o", "created": 1715367049, "name": "GPT-4o"},
            {"id": "anthropic/claude-3.5-sonnet", "created": 1718841600},
            {"id": "local-model", "created": 1700000000}
        ]
    })
}

async fn mount_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream_catalog()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_models_reshaped_without_filter() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let app = create_test_app(config_for(&server.uri(), Some(API_KEY)));
    let response = app.oneshot(get_request("/v1/models")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(
        json,
        json!({
            "object": "list",
            "data": [
                {"id": "openai/gpt-4o", "object": "model", "created": 1715367049, "owned_by": "openai"},
                {"id": "anthropic/claude-3.5-sonnet", "object": "model", "created": 1718841600, "owned_by": "anthropic"},
                {"id": "local-model", "object": "model", "created": 1700000000, "owned_by": "unknown"}
            ]
        })
    );
}

#[tokio::test]
async fn test_models_odd_created_values_pass_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "openai/gpt-4o", "created": null},
                {"id": "mistral/tiny", "created": 1.7e9},
                {"id": "local-model", "created": 1700000000}
            ]
        })))
        .mount(&server)
        .await;

    let app = create_test_app(config_for(&server.uri(), Some(API_KEY)));
    let response = app.oneshot(get_request("/v1/models")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 3);
    assert_eq!(data[0]["created"], Value::Null);
    assert_eq!(data[1]["created"], json!(1.7e9));
    assert_eq!(data[2]["created"], json!(1700000000));
}

#[tokio::test]
async fn test_models_filtered_by_allow_list() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "local-model").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "  openai/gpt-4o  ").unwrap();
    writeln!(file, "meta-llama/not-in-catalog").unwrap();
    file.flush().unwrap();

    let mut config = config_for(&server.uri(), Some(API_KEY));
    config.model_filter_file = Some(file.path().to_path_buf());
    let app = create_test_app(config);

    let response = app.oneshot(get_request("/v1/models")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let ids: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    // Upstream order is kept, not allow-list order.
    assert_eq!(ids, vec!["openai/gpt-4o", "local-model"]);
}

#[tokio::test]
async fn test_models_unreadable_allow_list_serves_full_catalog() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(&server.uri(), Some(API_KEY));
    config.model_filter_file = Some(dir.path().join("missing.txt"));
    let app = create_test_app(config);

    let response = app.oneshot(get_request("/v1/models")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_models_without_key_sends_no_authorization() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let app = create_test_app(config_for(&server.uri(), None));
    let request = Request::builder()
        .uri("/v1/models")
        .header(header::AUTHORIZATION, "Bearer caller-supplied")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_models_upstream_error_passthrough() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/models"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_raw(r#"{"error":"maintenance"}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let app = create_test_app(config_for(&server.uri(), Some(API_KEY)));
    let response = app.oneshot(get_request("/v1/models")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(&body_bytes(response).await[..], br#"{"error":"maintenance"}"#);
}

#[tokio::test]
async fn test_chat_non_streaming_passthrough() {
    let server = MockServer::start().await;
    let request_body = json!({
        "model": "openai/gpt-4o",
        "messages": [{"role": "user", "content": "Hello"}]
    });
    let upstream_body = json!({
        "id": "gen-123",
        "object": "chat.completion",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi"}, "finish_reason": "stop"}]
    });

    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header_matcher("authorization", "Bearer sk-or-test-key"))
        .and(body_string(request_body.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream_body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let app = create_test_app(config_for(&server.uri(), Some(API_KEY)));
    let response = app.oneshot(chat_request(&request_body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(body_json(response).await, upstream_body);
}

#[tokio::test]
async fn test_chat_upstream_429_passthrough() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429).set_body_raw(r#"{"error":"rate limited"}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let app = create_test_app(config_for(&server.uri(), Some(API_KEY)));
    let response = app
        .oneshot(chat_request(&json!({"model": "openai/gpt-4o", "messages": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(&body_bytes(response).await[..], br#"{"error":"rate limited"}"#);
}

#[tokio::test]
async fn test_chat_missing_key_rejected_without_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let app = create_test_app(config_for(&server.uri(), None));
    let response = app
        .oneshot(chat_request(&json!({"model": "openai/gpt-4o", "messages": [], "stream": true})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Missing OpenRouter API key"})
    );
    server.verify().await;
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_wrong_content_type_rejected_first() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    // No key either: content type is checked before the credential.
    let app = create_test_app(config_for(&server.uri(), None));
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(r#"{"model":"x"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Content-Type must be application/json"})
    );
    server.verify().await;
}

#[tokio::test]
async fn test_chat_invalid_json_rejected() {
    let server = MockServer::start().await;
    let app = create_test_app(config_for(&server.uri(), Some(API_KEY)));
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().starts_with("Invalid JSON body"));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_outbound_headers_rewritten() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "gen-1"})))
        .mount(&server)
        .await;

    let app = create_test_app(config_for(&server.uri(), Some(API_KEY)));
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::HOST, "localhost:8080")
        .header(header::AUTHORIZATION, "Bearer caller-supplied")
        .header("HTTP-Referer", "https://example.com")
        .header("X-Title", "test-app")
        .body(Body::from(r#"{"model":"openai/gpt-4o","messages":[]}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let received = server.received_requests().await.unwrap();
    let headers = &received[0].headers;
    let expected_host = server.uri().trim_start_matches("http://").to_string();

    assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-or-test-key");
    assert_eq!(headers.get("host").unwrap().to_str().unwrap(), expected_host);
    assert_eq!(headers.get("http-referer").unwrap(), "https://example.com");
    assert_eq!(headers.get("x-title").unwrap(), "test-app");
}

#[tokio::test]
async fn test_chat_streaming_reframed() {
    let server = MockServer::start().await;
    let upstream_sse = concat!(
        ": OPENROUTER PROCESSING\n\n",
        "data: {\"id\":1,\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\r\n\r\n",
        ": OPENROUTER PROCESSING\n",
        "event: message\n",
        "data: {\"id\":2,\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n",
        "\n",
        "data: [DONE]"
    );
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(upstream_sse, "text/event-stream"))
        .mount(&server)
        .await;

    let app = create_test_app(config_for(&server.uri(), Some(API_KEY)));
    let response = app
        .oneshot(chat_request(&json!({"model": "openai/gpt-4o", "messages": [], "stream": true})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream; charset=utf-8"
    );
    assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-cache");
    assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");

    let body = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
    assert_eq!(
        body,
        concat!(
            "\n",
            "data: {\"id\":1,\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "event: message\n",
            "data: {\"id\":2,\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n",
            "\n",
            "data: [DONE]\n",
            "\n"
        )
    );
    assert!(!body.contains("OPENROUTER PROCESSING"));
}

#[tokio::test]
async fn test_chat_streaming_upstream_refusal_passthrough() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(402).set_body_raw(r#"{"error":"insufficient credits"}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let app = create_test_app(config_for(&server.uri(), Some(API_KEY)));
    let response = app
        .oneshot(chat_request(&json!({"model": "openai/gpt-4o", "messages": [], "stream": true})))
        .await
        .unwrap();

    // Upstream refused before any stream opened: status passes through.
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(&body_bytes(response).await[..], br#"{"error":"insufficient credits"}"#);
}

#[tokio::test]
async fn test_transport_failure_maps_to_bad_gateway() {
    // Nothing listens on the discard port.
    let app = create_test_app(config_for("http://127.0.0.1:9", Some(API_KEY)));
    let response = app
        .oneshot(chat_request(&json!({"model": "openai/gpt-4o", "messages": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Connection error with OpenRouter API");
    assert!(json["details"].is_string());
    assert!(!json.to_string().contains(API_KEY));
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app(config_for("https://openrouter.ai", None));
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_cors_preflight() {
    let app = create_test_app(config_for("https://openrouter.ai", None));
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/v1/chat/completions")
        .header(header::ORIGIN, "https://app.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_connection_without_key() {
    let server = MockServer::start().await;
    let app = create_test_app(config_for(&server.uri(), None));
    let response = app.oneshot(get_request("/test-connection")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_connection_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/models"))
        .and(header_matcher("authorization", "Bearer sk-or-test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream_catalog()))
        .mount(&server)
        .await;

    let app = create_test_app(config_for(&server.uri(), Some(API_KEY)));
    let response = app.oneshot(get_request("/test-connection")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "connected");
    assert_eq!(json["modelCount"], 3);
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_connection_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/models"))
        .respond_with(ResponseTemplate::new(401).set_body_raw(r#"{"error":"bad key"}"#, "application/json"))
        .mount(&server)
        .await;

    let app = create_test_app(config_for(&server.uri(), Some(API_KEY)));
    let response = app.oneshot(get_request("/test-connection")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Connection test failed");
    assert!(json["details"].as_str().unwrap().contains("bad key"));
    assert_eq!(json["code"], "upstream_4xx");
}

#[tokio::test]
async fn test_metrics_endpoint_after_request() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let app = create_test_app(config_for(&server.uri(), None));
    let response = app
        .clone()
        .oneshot(get_request("/v1/models"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
    assert!(text.contains("openrouter_proxy_requests_total"));
}
