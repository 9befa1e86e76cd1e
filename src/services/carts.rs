use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{cart_item, CartItem},
    errors::ServiceError,
};

/// Boundary to the cart store. The order subsystem only clears carts;
/// cart CRUD lives with the storefront.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Remove every cart line for the customer. Invoked after checkout and
    /// again after payment confirmation, since the cart may have been
    /// repopulated in between.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, customer_id: Uuid) -> Result<u64, ServiceError> {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::CustomerId.eq(customer_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected > 0 {
            info!(%customer_id, removed = result.rows_affected, "cart cleared");
        }
        Ok(result.rows_affected)
    }
}
