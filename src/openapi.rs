use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Marketplace API",
        description = "Multi-vendor order lifecycle and payment reconciliation"
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_vendor_status,
        crate::handlers::orders::cancel_order,
        crate::handlers::payments::create_payment_intent,
        crate::handlers::payments::confirm_payment,
        crate::handlers::payments::refund_payment,
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::health::health,
    ),
    components(schemas(
        crate::handlers::orders::OrderResponse,
        crate::handlers::orders::OrderSummaryRow,
        crate::handlers::orders::VendorOrderResponse,
        crate::handlers::orders::OrderItemResponse,
        crate::handlers::orders::PaymentInfo,
        crate::handlers::orders::OrderSummary,
        crate::handlers::orders::CancelOrderRequest,
        crate::handlers::payments::CreatePaymentIntentRequest,
        crate::handlers::payments::PaymentIntentResponse,
        crate::handlers::payments::ConfirmPaymentRequest,
        crate::handlers::payments::RefundPaymentRequest,
        crate::handlers::health::HealthStatus,
        crate::services::checkout::CreateOrderInput,
        crate::services::checkout::OrderItemInput,
        crate::services::checkout::Address,
        crate::services::orders::UpdateVendorStatusInput,
        crate::entities::order::OrderStatus,
        crate::entities::order::PaymentStatus,
        crate::entities::vendor_order::VendorOrderStatus,
        crate::errors::ErrorResponse,
        crate::errors::StockShortfall,
    )),
    tags(
        (name = "Orders", description = "Order lifecycle"),
        (name = "Payments", description = "Payment reconciliation"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub fn swagger_router() -> Router<AppState> {
    Router::new().merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
