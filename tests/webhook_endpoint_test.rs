//! HTTP-level webhook behavior: status codes drive processor redelivery,
//! so they are part of the contract.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::TestApp;
use serde_json::json;
use tower::ServiceExt;

fn webhook_request(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/payments/webhook")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .expect("request")
}

#[tokio::test]
async fn malformed_payload_is_rejected() {
    let app = TestApp::new().await;
    let router = marketplace_api::app_router(app.state());

    let response = router
        .oneshot(webhook_request("not json".to_string()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_event_types_are_accepted() {
    let app = TestApp::new().await;
    let router = marketplace_api::app_router(app.state());

    let payload = json!({
        "type": "invoice.created",
        "data": { "object": { "id": "in_123" } }
    });
    let response = router
        .oneshot(webhook_request(payload.to_string()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_intent_returns_non_2xx_so_the_processor_retries() {
    let app = TestApp::new().await;
    let router = marketplace_api::app_router(app.state());

    let payload = json!({
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_does_not_exist" } }
    });
    let response = router
        .oneshot(webhook_request(payload.to_string()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unsigned_webhooks_are_rejected_when_a_secret_is_configured() {
    let app = TestApp::new().await;
    let mut state = app.state();
    state.config.payment_webhook_secret = Some("whsec_configured".to_string());
    let router = marketplace_api::app_router(state);

    let payload = json!({
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_123" } }
    });
    let response = router
        .oneshot(webhook_request(payload.to_string()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let app = TestApp::new().await;
    let router = marketplace_api::app_router(app.state());

    let response = router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}
