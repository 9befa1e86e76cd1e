//! HTTP-level order surface: bearer resolution and the response envelope.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::TestApp;
use http_body_util::BodyExt;
use marketplace_api::auth::{issue_token, Role};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn requests_without_a_bearer_token_are_rejected() {
    let app = TestApp::new().await;
    let router = marketplace_api::app_router(app.state());

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v1/orders")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn checkout_round_trips_through_the_http_surface() {
    let app = TestApp::new().await;
    let vendor = Uuid::new_v4();
    let product = app
        .seed_product(vendor, "notebook", dec!(14.00), 6, None)
        .await;

    let customer_id = Uuid::new_v4();
    let token = issue_token(
        customer_id,
        Role::Customer,
        None,
        &app.config.jwt_secret,
        3600,
    )
    .expect("token");

    let payload = json!({
        "items": [{ "product_id": product.id, "quantity": 2 }],
        "shipping_address": {
            "name": "Jamie Doe",
            "street": "1 Market St",
            "city": "Springfield",
            "state": "IL",
            "postal_code": "62701",
            "country": "US"
        }
    });

    let router = marketplace_api::app_router(app.state());
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/orders")
                .header("authorization", format!("Bearer {token}"))
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    let order_id = body["data"]["id"].as_str().expect("order id");
    assert_eq!(body["data"]["status"], json!("pending"));
    assert_eq!(body["data"]["vendor_orders"].as_array().unwrap().len(), 1);

    // The creator can fetch it back through the authed GET route.
    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/orders/{order_id}"))
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["data"]["order_number"]
        .as_str()
        .unwrap()
        .starts_with("ORD-"));
}

#[tokio::test]
async fn stock_shortfall_surfaces_the_machine_readable_code() {
    let app = TestApp::new().await;
    let vendor = Uuid::new_v4();
    let product = app
        .seed_product(vendor, "rare vinyl", dec!(80.00), 3, None)
        .await;

    let token = issue_token(
        Uuid::new_v4(),
        Role::Customer,
        None,
        &app.config.jwt_secret,
        3600,
    )
    .expect("token");

    let payload = json!({
        "items": [{ "product_id": product.id, "quantity": 5 }],
        "shipping_address": {
            "name": "Jamie Doe",
            "street": "1 Market St",
            "city": "Springfield",
            "state": "IL",
            "postal_code": "62701",
            "country": "US"
        }
    });

    let router = marketplace_api::app_router(app.state());
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/orders")
                .header("authorization", format!("Bearer {token}"))
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("insufficient_stock"));
    let details = body["details"].as_array().expect("shortfall details");
    assert_eq!(details[0]["requested"], json!(5));
    assert_eq!(details[0]["available"], json!(3));
}
