use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{policy, Action, AuthUser, Ownership},
    entities::{
        order, product,
        vendor_order::{self, VendorOrderStatus},
        vendor_order_item,
        order::{OrderStatus, PaymentStatus},
        Product,
    },
    errors::{shortfall, ServiceError, StockShortfall},
    events::{Event, EventSender},
    services::{
        carts::CartService,
        inventory::InventoryService,
        orders::{OrderDetail, OrderService},
    },
};

/// Pricing knobs applied at checkout, resolved from configuration once at
/// startup.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// Percent retained when a vendor has no configured rate.
    pub default_commission_rate: Decimal,
    /// Fraction of the subtotal, e.g. 0.08 for 8%.
    pub tax_rate: Decimal,
    /// Flat shipping charge per order.
    pub shipping_fee: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            default_commission_rate: dec!(10),
            tax_rate: dec!(0.08),
            shipping_fee: dec!(10),
        }
    }
}

/// Address snapshot stored on the order. Deliberately a copy, never a
/// reference into a user profile.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct Address {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub street: String,
    #[validate(length(min = 1, max = 80))]
    pub city: String,
    #[validate(length(min = 1, max = 80))]
    pub state: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 80))]
    pub country: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
    pub customization: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderInput {
    #[validate(length(min = 1, message = "order must contain at least one item"))]
    pub items: Vec<OrderItemInput>,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
}

impl CreateOrderInput {
    /// Field validation across the whole input, including nested items and
    /// address snapshots.
    fn validate_all(&self) -> Result<(), ServiceError> {
        self.validate()?;
        for item in &self.items {
            item.validate()?;
        }
        self.shipping_address.validate()?;
        if let Some(billing) = &self.billing_address {
            billing.validate()?;
        }
        Ok(())
    }
}

/// Converts a cart's worth of items into a persisted multi-vendor order:
/// stock validation, vendor partitioning, commission math, atomic stock
/// decrement and cart clearing.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    inventory: InventoryService,
    carts: CartService,
    orders: Arc<OrderService>,
    pricing: PricingConfig,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        inventory: InventoryService,
        carts: CartService,
        orders: Arc<OrderService>,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            db,
            event_sender,
            inventory,
            carts,
            orders,
            pricing,
        }
    }

    /// Create an order for the acting customer.
    ///
    /// The order row, its vendor sub-orders and every conditional stock
    /// decrement commit in one transaction: either the order exists with
    /// its stock taken, or nothing happened. The cart clear runs after
    /// commit and is best-effort.
    #[instrument(skip(self, actor, input), fields(customer_id = %actor.user_id))]
    pub async fn create_order(
        &self,
        actor: &AuthUser,
        input: CreateOrderInput,
    ) -> Result<OrderDetail, ServiceError> {
        policy::ensure(actor.role, Action::CreateOrder, Ownership::NotApplicable)?;
        input.validate_all()?;

        let mut seen = HashSet::new();
        for item in &input.items {
            if !seen.insert(item.product_id) {
                return Err(ServiceError::ValidationError(format!(
                    "product {} appears more than once in the order",
                    item.product_id
                )));
            }
        }

        let customer_id = actor.user_id;
        let product_ids: Vec<Uuid> = input.items.iter().map(|i| i.product_id).collect();

        // Snapshot the catalog rows we need. Inactive products are treated
        // the same as missing ones.
        let products: HashMap<Uuid, product::Model> = Product::find()
            .filter(product::Column::Id.is_in(product_ids.clone()))
            .filter(product::Column::IsActive.eq(true))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        if products.len() < product_ids.len() {
            return Err(ServiceError::OrderCreation(
                "one or more products are unavailable".to_string(),
            ));
        }

        // Collect every shortfall, not just the first, so the customer can
        // fix their cart in one pass. No side effects on this path.
        let shortfalls: Vec<StockShortfall> = input
            .items
            .iter()
            .filter_map(|item| {
                let p = &products[&item.product_id];
                (p.stock < item.quantity)
                    .then(|| shortfall(p.id, &p.name, item.quantity, p.stock))
            })
            .collect();
        if !shortfalls.is_empty() {
            return Err(ServiceError::insufficient_stock(shortfalls));
        }

        // Partition by vendor; BTreeMap keeps sub-order ordering stable.
        let mut vendor_groups: BTreeMap<Uuid, Vec<&OrderItemInput>> = BTreeMap::new();
        for item in &input.items {
            let vendor_id = products[&item.product_id].vendor_id;
            vendor_groups.entry(vendor_id).or_default().push(item);
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = generate_order_number();

        let mut subtotal = Decimal::ZERO;
        let mut total_commission = Decimal::ZERO;
        struct VendorGroup<'a> {
            vendor_id: Uuid,
            items: Vec<&'a OrderItemInput>,
            subtotal: Decimal,
            commission_rate: Decimal,
            commission_amount: Decimal,
            vendor_earnings: Decimal,
        }
        let mut groups = Vec::with_capacity(vendor_groups.len());
        for (vendor_id, items) in vendor_groups {
            let group_subtotal: Decimal = items
                .iter()
                .map(|i| products[&i.product_id].price * Decimal::from(i.quantity))
                .sum();
            let rate = products[&items[0].product_id]
                .commission_rate
                .unwrap_or(self.pricing.default_commission_rate);
            let commission_amount = (group_subtotal * rate / dec!(100)).round_dp(2);
            let vendor_earnings = group_subtotal - commission_amount;

            subtotal += group_subtotal;
            total_commission += commission_amount;
            groups.push(VendorGroup {
                vendor_id,
                items,
                subtotal: group_subtotal,
                commission_rate: rate,
                commission_amount,
                vendor_earnings,
            });
        }

        let shipping_total = self.pricing.shipping_fee;
        let tax = (subtotal * self.pricing.tax_rate).round_dp(2);
        let total = subtotal + shipping_total + tax;

        let shipping_address = to_json(&input.shipping_address)?;
        let billing_address = match &input.billing_address {
            Some(addr) => to_json(addr)?,
            None => shipping_address.clone(),
        };

        let vendor_count = groups.len();
        let txn = self.db.begin().await?;

        order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            customer_id: Set(customer_id),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            payment_method: Set(None),
            external_payment_id: Set(None),
            paid_at: Set(None),
            refunded_at: Set(None),
            refund_amount: Set(None),
            refund_reason: Set(None),
            subtotal: Set(subtotal),
            shipping_total: Set(shipping_total),
            tax: Set(tax),
            total: Set(total),
            total_commission: Set(total_commission),
            shipping_address: Set(shipping_address),
            billing_address: Set(billing_address),
            cancellation_reason: Set(None),
            created_at: Set(now),
            cancelled_at: Set(None),
            completed_at: Set(None),
            updated_at: Set(Some(now)),
            version: Set(1),
        }
        .insert(&txn)
        .await?;

        for group in &groups {
            let vendor_order_id = Uuid::new_v4();
            vendor_order::ActiveModel {
                id: Set(vendor_order_id),
                order_id: Set(order_id),
                vendor_id: Set(group.vendor_id),
                status: Set(VendorOrderStatus::Pending),
                subtotal: Set(group.subtotal),
                commission_rate: Set(group.commission_rate),
                commission_amount: Set(group.commission_amount),
                vendor_earnings: Set(group.vendor_earnings),
                tracking_number: Set(None),
                estimated_delivery: Set(None),
                shipped_at: Set(None),
                delivered_at: Set(None),
                created_at: Set(now),
                updated_at: Set(Some(now)),
            }
            .insert(&txn)
            .await?;

            for item in &group.items {
                let p = &products[&item.product_id];
                vendor_order_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    vendor_order_id: Set(vendor_order_id),
                    product_id: Set(p.id),
                    name: Set(p.name.clone()),
                    image: Set(p.image.clone()),
                    unit_price: Set(p.price),
                    quantity: Set(item.quantity),
                    customization: Set(item.customization.clone()),
                }
                .insert(&txn)
                .await?;
            }
        }

        // Conditional decrements inside the same transaction: a loss here
        // rolls the whole order back rather than leaving stock and order
        // state disagreeing.
        for item in &input.items {
            self.inventory
                .decrement_stock(&txn, item.product_id, item.quantity)
                .await?;
        }

        txn.commit().await?;

        if let Err(e) = self.carts.clear_cart(customer_id).await {
            warn!(error = %e, %customer_id, "cart clear after checkout failed");
        }

        self.event_sender
            .send(Event::OrderCreated {
                order_id,
                order_number: order_number.clone(),
                customer_id,
                vendor_count,
            })
            .await;

        info!(%order_id, %order_number, vendor_count, "order created");
        self.orders.get_order_detail(order_id).await
    }
}

/// Timestamp-derived number with a random suffix; unique per order and
/// immutable afterwards.
fn generate_order_number() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("ORD-{millis}{suffix:04}")
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, ServiceError> {
    serde_json::to_value(value)
        .map_err(|e| ServiceError::InternalError(format!("address serialization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_are_timestamp_prefixed() {
        let a = generate_order_number();
        assert!(a.starts_with("ORD-"));
        // 13 millisecond digits plus the 4-digit random suffix.
        assert_eq!(a.len(), "ORD-".len() + 13 + 4);
        assert!(a["ORD-".len()..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn commission_split_is_exact() {
        let subtotal = dec!(99.99);
        let rate = dec!(12.5);
        let commission = (subtotal * rate / dec!(100)).round_dp(2);
        let earnings = subtotal - commission;
        assert_eq!(commission + earnings, subtotal);
    }
}
