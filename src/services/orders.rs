use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{policy, Action, AuthUser, Ownership, Role},
    entities::{
        order::{self, OrderStatus},
        vendor_order::{self, VendorOrderStatus},
        vendor_order_item, Order, VendorOrder, VendorOrderItem,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::InventoryService,
};

/// An order with its vendor sub-orders and item snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: order::Model,
    pub vendor_orders: Vec<VendorOrderDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VendorOrderDetail {
    pub vendor_order: vendor_order::Model,
    pub items: Vec<vendor_order_item::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub orders: Vec<order::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateVendorStatusInput {
    pub status: VendorOrderStatus,
    #[validate(length(min = 1, max = 100))]
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

/// How the acting principal relates to an order, for the policy table.
pub fn ownership_for(
    order: &order::Model,
    vendor_orders: &[vendor_order::Model],
    actor: &AuthUser,
) -> Ownership {
    match actor.role {
        Role::Admin => Ownership::NotApplicable,
        Role::Customer => {
            if order.customer_id == actor.user_id {
                Ownership::Owner
            } else {
                Ownership::NotOwner
            }
        }
        Role::Vendor => match actor.vendor_id {
            Some(vendor_id) if vendor_orders.iter().any(|vo| vo.vendor_id == vendor_id) => {
                Ownership::Owner
            }
            _ => Ownership::NotOwner,
        },
    }
}

/// Reads and lifecycle transitions on the order aggregate.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    inventory: InventoryService,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        inventory: InventoryService,
    ) -> Self {
        Self {
            db,
            event_sender,
            inventory,
        }
    }

    /// Load the full aggregate without authorization; internal callers and
    /// the payment service use this.
    pub async fn get_order_detail(&self, order_id: Uuid) -> Result<OrderDetail, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let vendor_orders = VendorOrder::find()
            .filter(vendor_order::Column::OrderId.eq(order_id))
            .order_by_asc(vendor_order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut details = Vec::with_capacity(vendor_orders.len());
        for vo in vendor_orders {
            let items = VendorOrderItem::find()
                .filter(vendor_order_item::Column::VendorOrderId.eq(vo.id))
                .all(&*self.db)
                .await?;
            details.push(VendorOrderDetail {
                vendor_order: vo,
                items,
            });
        }

        Ok(OrderDetail {
            order,
            vendor_orders: details,
        })
    }

    /// Authorized fetch: owner customer, an involved vendor, or an admin.
    #[instrument(skip(self, actor))]
    pub async fn get_order_for(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let detail = self.get_order_detail(order_id).await?;
        let vendor_models: Vec<vendor_order::Model> = detail
            .vendor_orders
            .iter()
            .map(|d| d.vendor_order.clone())
            .collect();
        policy::ensure(
            actor.role,
            Action::ViewOrder,
            ownership_for(&detail.order, &vendor_models, actor),
        )?;
        Ok(detail)
    }

    /// Role-scoped listing: customers see their own orders, vendors the
    /// orders they participate in, admins everything.
    #[instrument(skip(self, actor))]
    pub async fn list_orders(
        &self,
        actor: &AuthUser,
        page: u64,
        per_page: u64,
    ) -> Result<OrderPage, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let mut query = Order::find().order_by_desc(order::Column::CreatedAt);
        match actor.role {
            Role::Admin => {}
            Role::Customer => {
                query = query.filter(order::Column::CustomerId.eq(actor.user_id));
            }
            Role::Vendor => {
                let vendor_id = actor.acting_vendor_id()?;
                let order_ids: Vec<Uuid> = VendorOrder::find()
                    .filter(vendor_order::Column::VendorId.eq(vendor_id))
                    .all(&*self.db)
                    .await?
                    .into_iter()
                    .map(|vo| vo.order_id)
                    .collect();
                query = query.filter(order::Column::Id.is_in(order_ids));
            }
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok(OrderPage {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// Vendor-scoped fulfillment transition, with overall-status rollup.
    #[instrument(skip(self, actor, input), fields(order_id = %order_id, new_status = ?input.status))]
    pub async fn update_vendor_status(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
        input: UpdateVendorStatusInput,
    ) -> Result<OrderDetail, ServiceError> {
        input.validate()?;
        let new_status = input.status;
        let now = Utc::now();

        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let vendor_orders = VendorOrder::find()
            .filter(vendor_order::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;

        policy::ensure(
            actor.role,
            Action::UpdateVendorStatus,
            ownership_for(&order, &vendor_orders, actor),
        )?;
        let vendor_id = actor.acting_vendor_id()?;

        let target = vendor_orders
            .iter()
            .find(|vo| vo.vendor_id == vendor_id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::NotFound(format!("vendor {vendor_id} has no sub-order on {order_id}"))
            })?;

        let old_status = target.status;
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::StateConflict(format!(
                "vendor order cannot move from {old_status:?} to {new_status:?}"
            )));
        }

        let mut active: vendor_order::ActiveModel = target.clone().into();
        active.status = Set(new_status);
        active.updated_at = Set(Some(now));
        match new_status {
            VendorOrderStatus::Shipped => {
                active.shipped_at = Set(Some(now));
                if input.tracking_number.is_some() {
                    active.tracking_number = Set(input.tracking_number.clone());
                }
                if input.estimated_delivery.is_some() {
                    active.estimated_delivery = Set(input.estimated_delivery);
                }
            }
            VendorOrderStatus::Delivered => {
                active.delivered_at = Set(Some(now));
            }
            _ => {}
        }
        active.update(&txn).await?;

        let items = VendorOrderItem::find()
            .filter(vendor_order_item::Column::VendorOrderId.eq(target.id))
            .all(&txn)
            .await?;

        match new_status {
            // First transition into cancelled restores stock, exactly once:
            // the legality check above rejects cancelling twice.
            VendorOrderStatus::Cancelled => {
                for item in &items {
                    self.inventory
                        .restore_stock(&txn, item.product_id, item.quantity)
                        .await?;
                }
            }
            // Sales counters only move forward; nothing reverses them.
            VendorOrderStatus::Delivered => {
                for item in &items {
                    self.inventory
                        .increment_sales(&txn, item.product_id, item.quantity)
                        .await?;
                }
            }
            _ => {}
        }

        self.roll_up_status(&txn, &order, vendor_id, new_status, &vendor_orders, now)
            .await?;

        txn.commit().await?;

        if new_status == VendorOrderStatus::Cancelled {
            for item in &items {
                self.event_sender
                    .send(Event::StockRestored {
                        product_id: item.product_id,
                        quantity: item.quantity,
                        order_id,
                    })
                    .await;
            }
        }
        self.event_sender
            .send(Event::VendorOrderStatusChanged {
                order_id,
                vendor_id,
                old_status,
                new_status,
            })
            .await;

        info!(%order_id, %vendor_id, ?old_status, ?new_status, "vendor order status updated");
        self.get_order_detail(order_id).await
    }

    /// Re-derive the overall status after a vendor mutation. Orders already
    /// cancelled or refunded are owned by explicit actions and never
    /// recomputed here.
    async fn roll_up_status(
        &self,
        txn: &sea_orm::DatabaseTransaction,
        order: &order::Model,
        mutated_vendor: Uuid,
        mutated_status: VendorOrderStatus,
        vendor_orders: &[vendor_order::Model],
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if matches!(order.status, OrderStatus::Cancelled | OrderStatus::Refunded) {
            return Ok(());
        }

        let statuses: Vec<VendorOrderStatus> = vendor_orders
            .iter()
            .map(|vo| {
                if vo.vendor_id == mutated_vendor {
                    mutated_status
                } else {
                    vo.status
                }
            })
            .collect();
        let derived = OrderStatus::derive(&statuses);

        if derived == order.status {
            return Ok(());
        }

        let mut active: order::ActiveModel = order.clone().into();
        active.status = Set(derived);
        active.updated_at = Set(Some(now));
        active.version = Set(order.version + 1);
        match derived {
            OrderStatus::Delivered => active.completed_at = Set(Some(now)),
            OrderStatus::Cancelled => active.cancelled_at = Set(Some(now)),
            _ => {}
        }
        active.update(txn).await?;
        Ok(())
    }

    /// Cancel an order: every sub-order that is not delivered and not
    /// already cancelled is forced to cancelled, and stock is restored for
    /// exactly those. Does not touch money; refunds are a separate admin
    /// operation.
    #[instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderDetail, ServiceError> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let vendor_orders = VendorOrder::find()
            .filter(vendor_order::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;

        policy::ensure(
            actor.role,
            Action::CancelOrder,
            ownership_for(&order, &vendor_orders, actor),
        )?;

        if order.status.is_terminal() {
            return Err(ServiceError::StateConflict(format!(
                "order in status {:?} cannot be cancelled",
                order.status
            )));
        }

        let mut restored: Vec<(Uuid, i32)> = Vec::new();
        for vo in &vendor_orders {
            if matches!(
                vo.status,
                VendorOrderStatus::Delivered | VendorOrderStatus::Cancelled
            ) {
                // Delivered sub-orders keep their stock; sub-orders already
                // cancelled had theirs restored when they first cancelled.
                continue;
            }
            let items = VendorOrderItem::find()
                .filter(vendor_order_item::Column::VendorOrderId.eq(vo.id))
                .all(&txn)
                .await?;
            for item in &items {
                self.inventory
                    .restore_stock(&txn, item.product_id, item.quantity)
                    .await?;
                restored.push((item.product_id, item.quantity));
            }

            let mut active: vendor_order::ActiveModel = vo.clone().into();
            active.status = Set(VendorOrderStatus::Cancelled);
            active.updated_at = Set(Some(now));
            active.update(&txn).await?;
        }

        let mut active: order::ActiveModel = order.clone().into();
        active.status = Set(OrderStatus::Cancelled);
        active.cancelled_at = Set(Some(now));
        active.cancellation_reason = Set(reason.clone());
        active.updated_at = Set(Some(now));
        active.version = Set(order.version + 1);
        active.update(&txn).await?;

        txn.commit().await?;

        for (product_id, quantity) in restored {
            self.event_sender
                .send(Event::StockRestored {
                    product_id,
                    quantity,
                    order_id,
                })
                .await;
        }
        self.event_sender
            .send(Event::OrderCancelled {
                order_id,
                reason: reason.clone(),
            })
            .await;

        if reason.is_some() {
            info!(%order_id, reason = reason.as_deref().unwrap_or(""), "order cancelled");
        } else {
            info!(%order_id, "order cancelled");
        }
        self.get_order_detail(order_id).await
    }
}
