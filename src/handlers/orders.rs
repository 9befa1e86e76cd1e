use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{
        order::{self, OrderStatus, PaymentStatus},
        vendor_order::VendorOrderStatus,
    },
    errors::ServiceError,
    services::{
        checkout::CreateOrderInput,
        orders::{OrderDetail, UpdateVendorStatusInput, VendorOrderDetail},
    },
    ApiResponse, AppState, ListQuery, PaginatedResponse,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/vendor-status", put(update_vendor_status))
        .route("/:id/cancel", put(cancel_order))
}

// Order DTOs

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub payment: PaymentInfo,
    pub summary: OrderSummary,
    pub vendor_orders: Vec<VendorOrderResponse>,
    pub shipping_address: serde_json::Value,
    pub billing_address: serde_json::Value,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentInfo {
    pub method: Option<String>,
    pub external_payment_id: Option<String>,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_amount: Option<Decimal>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderSummary {
    pub subtotal: Decimal,
    pub shipping_total: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub total_commission: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VendorOrderResponse {
    pub vendor_id: Uuid,
    pub status: VendorOrderStatus,
    pub subtotal: Decimal,
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
    pub vendor_earnings: Decimal,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub customization: Option<serde_json::Value>,
}

/// Summary row for list endpoints; the per-vendor breakdown needs a fetch.
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderSummaryRow {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

pub fn map_order_detail(detail: &OrderDetail) -> OrderResponse {
    let order = &detail.order;
    OrderResponse {
        id: order.id,
        order_number: order.order_number.clone(),
        customer_id: order.customer_id,
        status: order.status,
        payment: PaymentInfo {
            method: order.payment_method.clone(),
            external_payment_id: order.external_payment_id.clone(),
            status: order.payment_status,
            paid_at: order.paid_at,
            refunded_at: order.refunded_at,
            refund_amount: order.refund_amount,
        },
        summary: OrderSummary {
            subtotal: order.subtotal,
            shipping_total: order.shipping_total,
            tax: order.tax,
            total: order.total,
            total_commission: order.total_commission,
        },
        vendor_orders: detail.vendor_orders.iter().map(map_vendor_order).collect(),
        shipping_address: order.shipping_address.clone(),
        billing_address: order.billing_address.clone(),
        cancellation_reason: order.cancellation_reason.clone(),
        created_at: order.created_at,
        cancelled_at: order.cancelled_at,
        completed_at: order.completed_at,
    }
}

fn map_vendor_order(detail: &VendorOrderDetail) -> VendorOrderResponse {
    let vo = &detail.vendor_order;
    VendorOrderResponse {
        vendor_id: vo.vendor_id,
        status: vo.status,
        subtotal: vo.subtotal,
        commission_rate: vo.commission_rate,
        commission_amount: vo.commission_amount,
        vendor_earnings: vo.vendor_earnings,
        tracking_number: vo.tracking_number.clone(),
        estimated_delivery: vo.estimated_delivery,
        shipped_at: vo.shipped_at,
        delivered_at: vo.delivered_at,
        items: detail
            .items
            .iter()
            .map(|item| OrderItemResponse {
                product_id: item.product_id,
                name: item.name.clone(),
                image: item.image.clone(),
                unit_price: item.unit_price,
                quantity: item.quantity,
                customization: item.customization.clone(),
            })
            .collect(),
    }
}

fn map_order_row(order: &order::Model) -> OrderSummaryRow {
    OrderSummaryRow {
        id: order.id,
        order_number: order.order_number.clone(),
        customer_id: order.customer_id,
        status: order.status,
        payment_status: order.payment_status,
        total: order.total,
        created_at: order.created_at,
    }
}

// Handler functions

/// Create an order from the given items (checkout).
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderInput,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Validation, availability or stock failure", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent stock conflict", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<CreateOrderInput>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    let detail = state.services.checkout.create_order(&user, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(map_order_detail(&detail))),
    ))
}

/// List orders visible to the caller.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(ListQuery),
    responses(
        (status = 200, description = "Orders", body = ApiResponse<PaginatedResponse<OrderSummaryRow>>)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderSummaryRow>>>, ServiceError> {
    let page = state
        .services
        .orders
        .list_orders(&user, query.page, query.limit)
        .await?;

    let total_pages = page.total.div_ceil(page.per_page.max(1));
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: page.orders.iter().map(map_order_row).collect(),
        total: page.total,
        page: page.page,
        limit: page.per_page,
        total_pages,
    })))
}

/// Fetch one order with its vendor breakdown.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = ApiResponse<OrderResponse>),
        (status = 403, description = "Not the owner or an involved vendor", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let detail = state.services.orders.get_order_for(&user, id).await?;
    Ok(Json(ApiResponse::success(map_order_detail(&detail))))
}

/// Vendor fulfillment transition on their sub-order.
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/vendor-status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateVendorStatusInput,
    responses(
        (status = 200, description = "Updated order", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Illegal transition", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the owning vendor", body = crate::errors::ErrorResponse),
        (status = 404, description = "No sub-order for this vendor", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn update_vendor_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateVendorStatusInput>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let detail = state
        .services
        .orders
        .update_vendor_status(&user, id, input)
        .await?;
    Ok(Json(ApiResponse::success(map_order_detail(&detail))))
}

/// Cancel an order (owning customer or admin).
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Cancelled order", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Order already terminal", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not permitted", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let detail = state
        .services
        .orders
        .cancel_order(&user, id, request.reason)
        .await?;
    Ok(Json(ApiResponse::success(map_order_detail(&detail))))
}
