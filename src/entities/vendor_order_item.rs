use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Item snapshot inside a vendor sub-order. Copied from the catalog at
/// checkout and never re-read afterwards.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vendor_order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub vendor_order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    #[sea_orm(nullable)]
    pub image: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_price: Decimal,
    pub quantity: i32,
    #[sea_orm(column_type = "Json", nullable)]
    pub customization: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::vendor_order::Entity",
        from = "Column::VendorOrderId",
        to = "super::vendor_order::Column::Id"
    )]
    VendorOrder,
}

impl Related<super::vendor_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VendorOrder.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
