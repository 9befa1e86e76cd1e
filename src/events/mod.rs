use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::vendor_order::VendorOrderStatus;

/// Domain events emitted by the order and payment services.
///
/// Consumers are decoupled through an mpsc channel; today the only consumer
/// logs them, which is the hook point for outbox or queue integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        customer_id: Uuid,
        vendor_count: usize,
    },
    PaymentIntentCreated {
        order_id: Uuid,
        intent_id: String,
    },
    PaymentConfirmed {
        order_id: Uuid,
        intent_id: String,
    },
    PaymentFailed {
        order_id: Uuid,
        intent_id: String,
    },
    VendorPayoutRecorded {
        order_id: Uuid,
        vendor_id: Uuid,
        amount: Decimal,
        transfer_id: String,
    },
    VendorOrderStatusChanged {
        order_id: Uuid,
        vendor_id: Uuid,
        old_status: VendorOrderStatus,
        new_status: VendorOrderStatus,
    },
    OrderCancelled {
        order_id: Uuid,
        reason: Option<String>,
    },
    PaymentRefunded {
        order_id: Uuid,
        amount: Decimal,
        refund_id: String,
    },
    StockRestored {
        product_id: Uuid,
        quantity: i32,
        order_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, logging instead of failing the caller when the
    /// consumer has gone away. Event delivery is best-effort; state changes
    /// were already committed by the time an event is emitted.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!(error = %e, "event channel closed; dropping event");
        }
    }
}

/// Background consumer: logs every domain event.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                order_number,
                vendor_count,
                ..
            } => info!(%order_id, %order_number, vendor_count, "order created"),
            Event::PaymentConfirmed {
                order_id,
                intent_id,
            } => info!(%order_id, %intent_id, "payment confirmed"),
            Event::PaymentFailed {
                order_id,
                intent_id,
            } => warn!(%order_id, %intent_id, "payment failed"),
            Event::VendorPayoutRecorded {
                order_id,
                vendor_id,
                amount,
                ..
            } => info!(%order_id, %vendor_id, %amount, "vendor payout recorded"),
            Event::OrderCancelled { order_id, .. } => info!(%order_id, "order cancelled"),
            Event::PaymentRefunded {
                order_id, amount, ..
            } => info!(%order_id, %amount, "payment refunded"),
            other => info!(event = ?other, "domain event"),
        }
    }
    info!("event channel closed; consumer exiting");
}
