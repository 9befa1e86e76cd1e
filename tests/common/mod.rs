//! Shared test harness: sqlite-in-memory database with the schema built
//! from the entity definitions, wired services, and seed helpers.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use marketplace_api::{
    auth::{AuthUser, Role},
    config::AppConfig,
    db::bootstrap_schema,
    entities::{cart_item, product},
    events::{process_events, EventSender},
    handlers::AppServices,
    services::checkout::{Address, CreateOrderInput, OrderItemInput, PricingConfig},
    services::gateway::SimulatedGateway,
    AppState,
};

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    pub gateway: Arc<SimulatedGateway>,
    pub event_sender: EventSender,
    pub config: AppConfig,
}

impl TestApp {
    pub async fn new() -> Self {
        // A single pooled connection keeps every test statement on the same
        // in-memory database.
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options.max_connections(1).sqlx_logging(false);
        let db = Database::connect(options).await.expect("sqlite connect");
        bootstrap_schema(&db).await.expect("schema bootstrap");
        let db = Arc::new(db);

        let (tx, rx) = mpsc::channel(256);
        let event_sender = EventSender::new(tx);
        tokio::spawn(process_events(rx));

        let gateway = SimulatedGateway::new();
        let services = AppServices::new(
            db.clone(),
            event_sender.clone(),
            gateway.clone(),
            PricingConfig::default(),
            Duration::from_secs(5),
        );

        let config = test_config();

        Self {
            db,
            services,
            gateway,
            event_sender,
            config,
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            db: self.db.clone(),
            config: self.config.clone(),
            event_sender: self.event_sender.clone(),
            services: self.services.clone(),
        }
    }

    pub fn customer(&self) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::Customer,
            vendor_id: None,
        }
    }

    pub fn vendor(&self, vendor_id: Uuid) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::Vendor,
            vendor_id: Some(vendor_id),
        }
    }

    pub fn admin(&self) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
            vendor_id: None,
        }
    }

    pub async fn seed_product(
        &self,
        vendor_id: Uuid,
        name: &str,
        price: Decimal,
        stock: i32,
        commission_rate: Option<Decimal>,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            vendor_id: Set(vendor_id),
            name: Set(name.to_string()),
            image: Set(None),
            price: Set(price),
            stock: Set(stock),
            commission_rate: Set(commission_rate),
            is_active: Set(true),
            sales_count: Set(0),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_inactive_product(
        &self,
        vendor_id: Uuid,
        name: &str,
        price: Decimal,
        stock: i32,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            vendor_id: Set(vendor_id),
            name: Set(name.to_string()),
            image: Set(None),
            price: Set(price),
            stock: Set(stock),
            commission_rate: Set(None),
            is_active: Set(false),
            sales_count: Set(0),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("seed inactive product")
    }

    pub async fn seed_cart_item(&self, customer_id: Uuid, product_id: Uuid, quantity: i32) {
        cart_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            customization: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed cart item");
    }

    pub async fn product(&self, id: Uuid) -> product::Model {
        marketplace_api::entities::Product::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("product query")
            .expect("product row")
    }

    pub async fn cart_len(&self, customer_id: Uuid) -> usize {
        use sea_orm::{ColumnTrait, QueryFilter};
        marketplace_api::entities::CartItem::find()
            .filter(cart_item::Column::CustomerId.eq(customer_id))
            .all(&*self.db)
            .await
            .expect("cart query")
            .len()
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test-secret-test-secret-test-secret-1234".to_string(),
        jwt_expiration: 3600,
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "test".to_string(),
        log_level: "warn".to_string(),
        log_json: false,
        auto_migrate: true,
        default_commission_rate: 10.0,
        default_tax_rate: 0.08,
        shipping_fee: 10.0,
        payment_webhook_secret: None,
        payment_webhook_tolerance_secs: None,
        payment_gateway_timeout_secs: 5,
        event_channel_capacity: 256,
    }
}

pub fn address(name: &str) -> Address {
    Address {
        name: name.to_string(),
        street: "1 Market St".to_string(),
        city: "Springfield".to_string(),
        state: "IL".to_string(),
        postal_code: "62701".to_string(),
        country: "US".to_string(),
        phone: None,
    }
}

pub fn order_input(items: Vec<(Uuid, i32)>) -> CreateOrderInput {
    CreateOrderInput {
        items: items
            .into_iter()
            .map(|(product_id, quantity)| OrderItemInput {
                product_id,
                quantity,
                customization: None,
            })
            .collect(),
        shipping_address: address("Jamie Doe"),
        billing_address: None,
    }
}
