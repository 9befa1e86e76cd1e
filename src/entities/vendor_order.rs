use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// The portion of an order belonging to one vendor: its items, earnings
/// split and an independent fulfillment lifecycle.
///
/// The set of vendor orders under a parent order is fixed at checkout;
/// only the status and shipping fields mutate afterwards.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vendor_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub vendor_id: Uuid,
    pub status: VendorOrderStatus,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub commission_rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub commission_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub vendor_earnings: Decimal,

    #[sea_orm(nullable)]
    pub tracking_number: Option<String>,
    #[sea_orm(nullable)]
    pub estimated_delivery: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub shipped_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub delivered_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
    #[sea_orm(has_many = "super::vendor_order_item::Entity")]
    Items,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::vendor_order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Per-vendor fulfillment state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum VendorOrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl VendorOrderStatus {
    fn rank(&self) -> Option<u8> {
        match self {
            VendorOrderStatus::Pending => Some(0),
            VendorOrderStatus::Confirmed => Some(1),
            VendorOrderStatus::Processing => Some(2),
            VendorOrderStatus::Shipped => Some(3),
            VendorOrderStatus::Delivered => Some(4),
            VendorOrderStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VendorOrderStatus::Delivered | VendorOrderStatus::Cancelled
        )
    }

    /// Whether a vendor may move this sub-order from `self` to `next`.
    ///
    /// Forward moves along pending → confirmed → processing → shipped →
    /// delivered may skip intermediate states but never go backwards;
    /// `Cancelled` is reachable from any non-terminal state.
    pub fn can_transition_to(&self, next: VendorOrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            VendorOrderStatus::Cancelled => true,
            _ => match (self.rank(), next.rank()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }
}
