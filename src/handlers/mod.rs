use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sea_orm::DatabaseConnection;

use crate::{
    events::EventSender,
    services::{
        carts::CartService,
        checkout::{CheckoutService, PricingConfig},
        gateway::PaymentGateway,
        inventory::InventoryService,
        orders::OrderService,
        payments::PaymentService,
    },
    AppState,
};

pub mod health;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;

/// Services shared by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub payments: Arc<PaymentService>,
    pub inventory: InventoryService,
    pub carts: CartService,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
        pricing: PricingConfig,
        gateway_timeout: Duration,
    ) -> Self {
        let inventory = InventoryService::new(db.clone());
        let carts = CartService::new(db.clone());
        let orders = Arc::new(OrderService::new(
            db.clone(),
            event_sender.clone(),
            inventory.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            db.clone(),
            event_sender.clone(),
            inventory.clone(),
            carts.clone(),
            orders.clone(),
            pricing,
        ));
        let payments = Arc::new(PaymentService::new(
            db,
            gateway,
            event_sender,
            carts.clone(),
            gateway_timeout,
        ));

        Self {
            orders,
            checkout,
            payments,
            inventory,
            carts,
        }
    }
}

/// Versioned API surface plus the liveness endpoint.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1/orders", orders::router())
        .nest("/api/v1/payments", payments::router())
        .merge(health::router())
}
