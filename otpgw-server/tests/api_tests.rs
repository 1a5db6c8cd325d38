//! End-to-end HTTP tests against the in-process router, driven with
//! `tower::ServiceExt::oneshot` over an in-memory store. No network I/O,
//! no telephony backend: `dispatch.voice_enabled = false` keeps the voice
//! channel out of the provider table entirely.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use otpgw_server::api::{router, AppState};
use otpgw_server::config::GatewayConfig;
use otpgw_server::state_factory;

async fn test_app() -> axum::Router {
    let config: GatewayConfig = toml::from_str("[dispatch]\nvoice_enabled = false\n").expect("valid default config");
    let gateway = state_factory::build(config).await.expect("gateway builds");
    router(AppState::new(gateway))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("readable body");
    serde_json::from_slice(&bytes).expect("valid json body")
}

#[tokio::test]
async fn dispatch_returns_sending_status_for_a_well_formed_request() {
    let app = test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/dispatch")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({"phone": "+15551234567", "code": "123456", "channels": ["sms"]}).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "sending");
    assert_eq!(body["channel"], "sms");
    assert_eq!(body["phone"], "+15551234567");
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn dispatch_rejects_malformed_json_with_bad_request() {
    let app = test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/dispatch")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dispatch_rejects_invalid_phone_with_bad_request() {
    let app = test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/dispatch")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({"phone": "not-a-phone", "code": "123456"}).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_ok_with_voice_disabled() {
    let app = test_app().await;
    let request = Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["asterisk"], "disabled");
}

#[tokio::test]
async fn metrics_reflects_a_dispatched_request() {
    let app = test_app().await;

    let dispatch_request = Request::builder()
        .method("POST")
        .uri("/dispatch")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({"phone": "+15557654321", "code": "654321"}).to_string()))
        .unwrap();
    app.clone().oneshot(dispatch_request).await.unwrap();

    let metrics_request = Request::builder().method("GET").uri("/metrics").body(Body::empty()).unwrap();
    let response = app.oneshot(metrics_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["events_emitted"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn auth_webhook_for_unknown_request_id_still_returns_ok() {
    let app = test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/auth")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({"request_id": "does-not-exist", "success": true}).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn dlr_webhook_for_unknown_provider_id_still_returns_ok() {
    let app = test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/dlr")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({"id": "unknown-provider-id", "status": "delivered"}).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn cdr_webhook_accepts_a_json_array() {
    let app = test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/cdr")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!([{"id": "call-1", "trunk_name": "sip-trunk-01", "price": 0.02}]).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn cdr_webhook_accepts_newline_delimited_json() {
    let app = test_app().await;
    let ndjson = "{\"id\": \"call-1\", \"trunk_name\": \"trunk-a\"}\n{\"id\": \"call-2\", \"trunk_name\": \"trunk-b\"}\n";
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/cdr")
        .header("content-type", "application/json")
        .body(Body::from(ndjson))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
