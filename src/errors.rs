use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Standardized error body returned by every failing endpoint.
///
/// `code` is machine-readable and stable; `message` is for humans.
/// `details` carries field-level validation output or, for refund failures
/// surfaced to admins, the raw processor error.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    /// Machine-readable error code, e.g. "insufficient_stock"
    #[schema(example = "insufficient_stock")]
    pub code: String,
    /// Human-readable error description
    #[schema(example = "Requested 5 of product X but only 3 available")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// One product the customer asked more of than the catalog can supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StockShortfall {
    pub product_id: Uuid,
    pub product_name: String,
    pub requested: i32,
    pub available: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Operation is invalid for the resource's current status, e.g.
    /// cancelling a delivered order.
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// Order creation failed before any side effect, e.g. inactive products.
    #[error("Order creation failed: {0}")]
    OrderCreation(String),

    /// Pre-checkout stock check failed; lists every shortfall, not just the
    /// first one found.
    #[error("Insufficient stock for {} product(s)", .0.len())]
    InsufficientStock(Vec<StockShortfall>),

    /// A conditional stock decrement lost a race and would have gone
    /// negative.
    #[error("Stock conflict: {0}")]
    StockConflict(String),

    /// The processor reports the intent as anything other than succeeded.
    #[error("Payment not completed: {0}")]
    PaymentNotCompleted(String),

    /// The processor call itself failed, timed out, or returned an
    /// unexpected shape. Timeouts mean "outcome unknown", never success.
    #[error("Payment processor error: {0}")]
    ExternalPayment(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::StateConflict(_)
            | Self::OrderCreation(_)
            | Self::InsufficientStock(_)
            | Self::PaymentNotCompleted(_)
            | Self::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::StockConflict(_) => StatusCode::CONFLICT,
            Self::ExternalPayment(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable machine-readable code for clients.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => "internal_error",
            Self::EventError(_) => "event_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::StateConflict(_) => "state_conflict",
            Self::OrderCreation(_) => "order_creation_failed",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::StockConflict(_) => "stock_conflict",
            Self::PaymentNotCompleted(_) => "payment_not_completed",
            Self::ExternalPayment(_) => "payment_processor_error",
            Self::InvalidStatus(_) => "invalid_status",
        }
    }

    /// Message suitable for HTTP responses. Internal errors are redacted so
    /// implementation details never leak to customers.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) | Self::EventError(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Structured payload attached under `details`, where one exists.
    pub fn response_details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InsufficientStock(shortfalls) => serde_json::to_value(shortfalls).ok(),
            // Refund endpoints are admin-only; the raw processor message is
            // intentionally surfaced there.
            Self::ExternalPayment(raw) => Some(serde_json::json!({ "processor_error": raw })),
            _ => None,
        }
    }

    /// Shorthand used by the checkout path when summarizing shortfalls.
    pub fn insufficient_stock(shortfalls: Vec<StockShortfall>) -> Self {
        ServiceError::InsufficientStock(shortfalls)
    }

    pub fn stock_conflict(product_id: Uuid, requested: i32) -> Self {
        ServiceError::StockConflict(format!(
            "concurrent decrement of product {product_id} by {requested} would go negative"
        ))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            code: self.error_code().to_string(),
            message: self.response_message(),
            details: self.response_details(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

/// Helper for building a shortfall from catalog data.
pub fn shortfall(
    product_id: Uuid,
    product_name: &str,
    requested: i32,
    available: i32,
) -> StockShortfall {
    StockShortfall {
        product_id,
        product_name: product_name.to_string(),
        requested,
        available,
    }
}

/// Refund amounts have to be positive and within the captured total.
pub fn validate_refund_amount(amount: Decimal, total: Decimal) -> Result<(), ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Refund amount must be positive".to_string(),
        ));
    }
    if amount > total {
        return Err(ServiceError::ValidationError(format!(
            "Refund amount {amount} exceeds order total {total}"
        )));
    }
    Ok(())
}
