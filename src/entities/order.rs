use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::vendor_order::VendorOrderStatus;

/// Root order aggregate. One row per customer checkout; the per-vendor
/// breakdown lives in `vendor_orders`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub customer_id: Uuid,
    pub status: OrderStatus,

    pub payment_status: PaymentStatus,
    #[sea_orm(nullable)]
    pub payment_method: Option<String>,
    /// Handle of the in-flight or settled charge at the payment processor.
    #[sea_orm(nullable)]
    pub external_payment_id: Option<String>,
    #[sea_orm(nullable)]
    pub paid_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub refunded_at: Option<DateTime<Utc>>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub refund_amount: Option<Decimal>,
    #[sea_orm(nullable)]
    pub refund_reason: Option<String>,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub shipping_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub tax: Decimal,
    /// Authoritative amount for all downstream charging and refunding.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_commission: Decimal,

    /// Address snapshots copied at creation, never a live profile reference.
    #[sea_orm(column_type = "Json")]
    pub shipping_address: Json,
    #[sea_orm(column_type = "Json")]
    pub billing_address: Json,

    #[sea_orm(nullable)]
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub completed_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::vendor_order::Entity")]
    VendorOrders,
}

impl Related<super::vendor_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VendorOrders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Overall order status. Derived from the vendor sub-order statuses except
/// for `Cancelled` and `Refunded`, which are owned by explicit actions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "partially_shipped")]
    PartiallyShipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl OrderStatus {
    /// Recompute the overall status from the vendor-status multiset.
    ///
    /// Pure priority-rule function; callers must skip it entirely when the
    /// current overall status is `Cancelled` or `Refunded`, which explicit
    /// actions own.
    pub fn derive(statuses: &[VendorOrderStatus]) -> OrderStatus {
        use super::vendor_order::VendorOrderStatus as V;
        if statuses.is_empty() {
            // Orders always carry at least one sub-order; guard anyway so a
            // bad read cannot surface as "delivered".
            return OrderStatus::Pending;
        }

        if statuses.iter().all(|s| *s == V::Delivered) {
            return OrderStatus::Delivered;
        }
        if statuses
            .iter()
            .any(|s| matches!(s, V::Delivered | V::Shipped))
        {
            return OrderStatus::PartiallyShipped;
        }
        if statuses
            .iter()
            .all(|s| matches!(s, V::Confirmed | V::Processing))
        {
            return OrderStatus::Processing;
        }
        if statuses.iter().all(|s| *s == V::Cancelled) {
            return OrderStatus::Cancelled;
        }
        OrderStatus::Pending
    }

    /// True for states that no further lifecycle action may leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }
}

/// Payment side of the order, kept separate from fulfillment status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::vendor_order::VendorOrderStatus as V;
    use rstest::rstest;

    #[rstest]
    #[case(vec![V::Delivered, V::Delivered], OrderStatus::Delivered)]
    #[case(vec![V::Delivered, V::Confirmed], OrderStatus::PartiallyShipped)]
    #[case(vec![V::Shipped, V::Confirmed], OrderStatus::PartiallyShipped)]
    #[case(vec![V::Shipped, V::Cancelled], OrderStatus::PartiallyShipped)]
    #[case(vec![V::Confirmed, V::Confirmed], OrderStatus::Processing)]
    #[case(vec![V::Confirmed, V::Processing], OrderStatus::Processing)]
    #[case(vec![V::Cancelled, V::Cancelled], OrderStatus::Cancelled)]
    #[case(vec![V::Pending, V::Pending], OrderStatus::Pending)]
    #[case(vec![V::Pending, V::Confirmed], OrderStatus::Pending)]
    #[case(vec![V::Pending, V::Cancelled], OrderStatus::Pending)]
    fn derives_overall_status(#[case] vendors: Vec<V>, #[case] expected: OrderStatus) {
        assert_eq!(OrderStatus::derive(&vendors), expected);
    }

    #[test]
    fn delivered_requires_every_sibling_delivered() {
        // One straggler keeps the order out of the terminal delivered state.
        let statuses = vec![V::Delivered, V::Delivered, V::Shipped];
        assert_eq!(OrderStatus::derive(&statuses), OrderStatus::PartiallyShipped);
    }

    #[test]
    fn single_vendor_order_rolls_up_directly() {
        assert_eq!(OrderStatus::derive(&[V::Delivered]), OrderStatus::Delivered);
        assert_eq!(OrderStatus::derive(&[V::Cancelled]), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::derive(&[V::Processing]), OrderStatus::Processing);
    }
}
