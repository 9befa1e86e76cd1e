use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{policy, Action, AuthUser, Ownership},
    entities::{
        order::{self, OrderStatus, PaymentStatus},
        vendor_order::{self, VendorOrderStatus},
        Order, VendorOrder,
    },
    errors::{validate_refund_amount, ServiceError},
    events::{Event, EventSender},
    services::{
        carts::CartService,
        gateway::{GatewayError, IntentMetadata, IntentStatus, PaymentGateway, PaymentIntent},
        orders::ownership_for,
    },
};

/// What the webhook handler did with a processor event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookDisposition {
    Applied,
    AlreadyApplied,
    Ignored,
}

/// Payment reconciliation against the external processor: intent creation,
/// confirmation (synchronous and via webhook), vendor earnings distribution
/// and refunds.
///
/// The synchronous confirm call and the webhook both funnel into
/// [`PaymentService::apply_payment_confirmed`], whose guard is one atomic
/// conditional update, so duplicate delivery and the confirm-vs-webhook
/// race both collapse to a no-op on the second application.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
    carts: CartService,
    gateway_timeout: Duration,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
        carts: CartService,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            carts,
            gateway_timeout,
        }
    }

    /// Run a processor call under the configured timeout. A timeout means
    /// the outcome is unknown; it is never treated as success.
    async fn gateway_call<T, F>(&self, fut: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match tokio::time::timeout(self.gateway_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ServiceError::ExternalPayment(e.to_string())),
            Err(_) => Err(ServiceError::ExternalPayment(
                "payment processor call timed out; outcome unknown".to_string(),
            )),
        }
    }

    async fn load_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))
    }

    /// Create (or return the still-live) payment intent for an order.
    ///
    /// Idempotent by order state: while an unconfirmed intent exists it is
    /// retrieved and returned instead of creating a duplicate charge.
    #[instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn create_payment_intent(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
    ) -> Result<PaymentIntent, ServiceError> {
        let order = self.load_order(order_id).await?;
        policy::ensure(
            actor.role,
            Action::CreatePaymentIntent,
            ownership_for(&order, &[], actor),
        )?;

        if order.payment_status != PaymentStatus::Pending {
            return Err(ServiceError::StateConflict(format!(
                "payment is already {:?}",
                order.payment_status
            )));
        }

        if let Some(existing_id) = &order.external_payment_id {
            let existing = self
                .gateway_call(self.gateway.retrieve_intent(existing_id))
                .await?;
            if existing.status != IntentStatus::Canceled {
                info!(%order_id, intent_id = %existing.id, "returning existing live intent");
                return Ok(existing);
            }
            // A canceled intent is dead; fall through and mint a new one.
        }

        // The platform fee is the commission across all vendor sub-orders;
        // the charge is the authoritative order total.
        let intent = self
            .gateway_call(self.gateway.create_intent(
                order.total,
                order.total_commission,
                IntentMetadata {
                    order_id: order.id,
                    order_number: order.order_number.clone(),
                    customer_id: order.customer_id,
                },
            ))
            .await?;

        let mut active: order::ActiveModel = order.into();
        active.external_payment_id = Set(Some(intent.id.clone()));
        active.payment_method = Set(Some("card".to_string()));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&*self.db).await?;

        self.event_sender
            .send(Event::PaymentIntentCreated {
                order_id,
                intent_id: intent.id.clone(),
            })
            .await;

        Ok(intent)
    }

    /// Synchronous confirmation: verify with the processor, then apply the
    /// guarded transition.
    #[instrument(skip(self, actor), fields(order_id = %order_id, intent_id = %intent_id))]
    pub async fn confirm_payment(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
        intent_id: &str,
    ) -> Result<order::Model, ServiceError> {
        let order = self.load_order(order_id).await?;
        policy::ensure(
            actor.role,
            Action::ConfirmPayment,
            ownership_for(&order, &[], actor),
        )?;

        match &order.external_payment_id {
            Some(stored) if stored == intent_id => {}
            Some(_) => {
                return Err(ServiceError::ValidationError(
                    "payment intent does not belong to this order".to_string(),
                ))
            }
            None => {
                return Err(ServiceError::StateConflict(
                    "order has no payment intent".to_string(),
                ))
            }
        }

        let intent = self
            .gateway_call(self.gateway.retrieve_intent(intent_id))
            .await?;
        if intent.status != IntentStatus::Succeeded {
            return Err(ServiceError::PaymentNotCompleted(format!(
                "intent is {}",
                intent.status.as_str()
            )));
        }

        self.apply_payment_confirmed(&order, intent_id).await?;
        self.load_order(order_id).await
    }

    /// The single entry point for the payment-confirmed transition, shared
    /// by the synchronous confirm call and the webhook.
    ///
    /// Guard: `payment_status = pending → completed` as one conditional
    /// UPDATE. Exactly one caller wins; every later application returns
    /// `false` and performs no side effects (no second transfer fan-out,
    /// no second cart clear).
    pub async fn apply_payment_confirmed(
        &self,
        order: &order::Model,
        intent_id: &str,
    ) -> Result<bool, ServiceError> {
        let now = Utc::now();
        let result = Order::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Completed),
            )
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Confirmed))
            .col_expr(order::Column::PaidAt, Expr::value(Some(now)))
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(now)))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            info!(order_id = %order.id, "payment confirmation already applied; skipping");
            return Ok(false);
        }

        // Payment confirmation fans out to every vendor sub-order
        // identically. Only pending sub-orders move; one cancelled before
        // payment stays cancelled.
        VendorOrder::update_many()
            .col_expr(
                vendor_order::Column::Status,
                Expr::value(VendorOrderStatus::Confirmed),
            )
            .col_expr(vendor_order::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(vendor_order::Column::OrderId.eq(order.id))
            .filter(vendor_order::Column::Status.eq(VendorOrderStatus::Pending))
            .exec(&*self.db)
            .await?;

        self.distribute_vendor_earnings(order).await;

        // Defensive second clear; the cart may have been repopulated since
        // checkout.
        if let Err(e) = self.carts.clear_cart(order.customer_id).await {
            warn!(error = %e, customer_id = %order.customer_id, "post-payment cart clear failed");
        }

        self.event_sender
            .send(Event::PaymentConfirmed {
                order_id: order.id,
                intent_id: intent_id.to_string(),
            })
            .await;

        info!(order_id = %order.id, %intent_id, "payment confirmed and applied");
        Ok(true)
    }

    /// Simulated transfer of each vendor's earnings. Best-effort: a failed
    /// transfer is logged for manual reconciliation and never unwinds the
    /// confirmed payment.
    async fn distribute_vendor_earnings(&self, order: &order::Model) {
        let vendor_orders = match VendorOrder::find()
            .filter(vendor_order::Column::OrderId.eq(order.id))
            .all(&*self.db)
            .await
        {
            Ok(vos) => vos,
            Err(e) => {
                warn!(error = %e, order_id = %order.id, "could not load sub-orders for payout");
                return;
            }
        };

        for vo in vendor_orders {
            match self
                .gateway_call(self.gateway.create_transfer(
                    vo.vendor_id,
                    vo.vendor_earnings,
                    &order.order_number,
                ))
                .await
            {
                Ok(outcome) => {
                    self.event_sender
                        .send(Event::VendorPayoutRecorded {
                            order_id: order.id,
                            vendor_id: vo.vendor_id,
                            amount: vo.vendor_earnings,
                            transfer_id: outcome.transfer_id,
                        })
                        .await;
                }
                Err(e) => {
                    warn!(error = %e, vendor_id = %vo.vendor_id, order_id = %order.id,
                        "vendor transfer failed; flagged for manual reconciliation");
                }
            }
        }
    }

    /// Apply a processor webhook event. Safe under redelivery and under
    /// arrival before or after the synchronous confirm call.
    #[instrument(skip(self))]
    pub async fn handle_webhook_event(
        &self,
        event_type: &str,
        intent_id: &str,
    ) -> Result<WebhookDisposition, ServiceError> {
        match event_type {
            "payment_intent.succeeded" | "payment_intent.payment_failed" => {}
            other => {
                // Unknown event types are accepted and ignored so new
                // processor events never break delivery.
                info!(event_type = other, "ignoring unhandled webhook event type");
                return Ok(WebhookDisposition::Ignored);
            }
        }

        let order = Order::find()
            .filter(order::Column::ExternalPaymentId.eq(intent_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("no order for payment intent {intent_id}"))
            })?;

        match event_type {
            "payment_intent.succeeded" => {
                let applied = self.apply_payment_confirmed(&order, intent_id).await?;
                Ok(if applied {
                    WebhookDisposition::Applied
                } else {
                    WebhookDisposition::AlreadyApplied
                })
            }
            _ => {
                let now = Utc::now();
                let result = Order::update_many()
                    .col_expr(
                        order::Column::PaymentStatus,
                        Expr::value(PaymentStatus::Failed),
                    )
                    .col_expr(order::Column::UpdatedAt, Expr::value(Some(now)))
                    .filter(order::Column::Id.eq(order.id))
                    .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
                    .exec(&*self.db)
                    .await?;

                if result.rows_affected == 0 {
                    return Ok(WebhookDisposition::AlreadyApplied);
                }
                self.event_sender
                    .send(Event::PaymentFailed {
                        order_id: order.id,
                        intent_id: intent_id.to_string(),
                    })
                    .await;
                Ok(WebhookDisposition::Applied)
            }
        }
    }

    /// Admin refund against the processor. Defaults to the full order
    /// total; never retried automatically, and a processor failure is
    /// surfaced raw to the (admin) caller.
    #[instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn refund(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
        amount: Option<Decimal>,
        reason: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        policy::ensure(actor.role, Action::RefundPayment, Ownership::NotApplicable)?;

        let order = self.load_order(order_id).await?;
        if order.payment_status != PaymentStatus::Completed {
            return Err(ServiceError::StateConflict(format!(
                "cannot refund an order with payment status {:?}",
                order.payment_status
            )));
        }
        let intent_id = order.external_payment_id.clone().ok_or_else(|| {
            ServiceError::StateConflict("order has no external payment id".to_string())
        })?;

        let amount = amount.unwrap_or(order.total);
        validate_refund_amount(amount, order.total)?;

        let outcome = self
            .gateway_call(self.gateway.create_refund(&intent_id, amount))
            .await?;

        let now = Utc::now();
        let mut active: order::ActiveModel = order.clone().into();
        active.status = Set(OrderStatus::Refunded);
        active.payment_status = Set(PaymentStatus::Refunded);
        active.refunded_at = Set(Some(now));
        active.refund_amount = Set(Some(amount));
        active.refund_reason = Set(reason);
        active.updated_at = Set(Some(now));
        active.version = Set(order.version + 1);
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send(Event::PaymentRefunded {
                order_id,
                amount,
                refund_id: outcome.refund_id,
            })
            .await;

        info!(%order_id, %amount, "refund applied");
        Ok(updated)
    }
}
