use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::orders::{map_order_detail, OrderResponse},
    services::gateway::PaymentIntent,
    ApiResponse, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-payment-intent", post(create_payment_intent))
        .route("/confirm-payment", post(confirm_payment))
        .route("/refund", post(refund_payment))
        .route("/webhook", post(super::payment_webhooks::payment_webhook))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreatePaymentIntentRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentIntentResponse {
    pub payment_intent_id: String,
    pub client_secret: String,
    pub amount: Decimal,
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ConfirmPaymentRequest {
    pub order_id: Uuid,
    pub payment_intent_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RefundPaymentRequest {
    pub order_id: Uuid,
    /// Defaults to a full refund of the order total.
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

fn map_intent(intent: PaymentIntent) -> PaymentIntentResponse {
    PaymentIntentResponse {
        payment_intent_id: intent.id,
        client_secret: intent.client_secret,
        amount: intent.amount,
        status: intent.status.as_str().to_string(),
    }
}

/// Create (or fetch the live) payment intent for an order.
#[utoipa::path(
    post,
    path = "/api/v1/payments/create-payment-intent",
    request_body = CreatePaymentIntentRequest,
    responses(
        (status = 201, description = "Intent handle", body = ApiResponse<PaymentIntentResponse>),
        (status = 400, description = "Payment no longer pending", body = crate::errors::ErrorResponse),
        (status = 403, description = "Order belongs to another customer", body = crate::errors::ErrorResponse),
        (status = 502, description = "Processor failure", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreatePaymentIntentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentIntentResponse>>), ServiceError> {
    let intent = state
        .services
        .payments
        .create_payment_intent(&user, request.order_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(map_intent(intent))),
    ))
}

/// Synchronously confirm a payment the processor reports as succeeded.
#[utoipa::path(
    post,
    path = "/api/v1/payments/confirm-payment",
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Order after confirmation", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Intent not completed at the processor", body = crate::errors::ErrorResponse),
        (status = 502, description = "Processor failure", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    state
        .services
        .payments
        .confirm_payment(&user, request.order_id, &request.payment_intent_id)
        .await?;
    let detail = state
        .services
        .orders
        .get_order_detail(request.order_id)
        .await?;
    Ok(Json(ApiResponse::success(map_order_detail(&detail))))
}

/// Admin refund. Never retried automatically; failures surface the raw
/// processor message to the caller.
#[utoipa::path(
    post,
    path = "/api/v1/payments/refund",
    request_body = RefundPaymentRequest,
    responses(
        (status = 200, description = "Order after refund", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid amount or payment state", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin only", body = crate::errors::ErrorResponse),
        (status = 502, description = "Processor refused the refund", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn refund_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<RefundPaymentRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    state
        .services
        .payments
        .refund(&user, request.order_id, request.amount, request.reason)
        .await?;
    let detail = state
        .services
        .orders
        .get_order_detail(request.order_id)
        .await?;
    Ok(Json(ApiResponse::success(map_order_detail(&detail))))
}
