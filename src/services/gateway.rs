//! Payment processor boundary.
//!
//! The processor is an opaque external dependency: the service layer only
//! sees this trait. `SimulatedGateway` is the in-process stand-in used for
//! development and tests; a production deployment implements the trait
//! against the real processor's client.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Lifecycle states a payment intent can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    Processing,
    Succeeded,
    Canceled,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::RequiresPaymentMethod => "requires_payment_method",
            IntentStatus::RequiresConfirmation => "requires_confirmation",
            IntentStatus::Processing => "processing",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Canceled => "canceled",
        }
    }
}

/// Processor-side view of an in-progress charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub status: IntentStatus,
    pub amount: Decimal,
    pub application_fee: Decimal,
}

/// Order context attached to an intent for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentMetadata {
    pub order_id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundOutcome {
    pub refund_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub transfer_id: String,
    pub vendor_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("intent {0} not found at processor")]
    IntentNotFound(String),
    #[error("invalid processor state: {0}")]
    InvalidState(String),
    #[error("processor unavailable: {0}")]
    Unavailable(String),
}

/// Opaque payment processor operations used by the reconciliation service.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount: Decimal,
        application_fee: Decimal,
        metadata: IntentMetadata,
    ) -> Result<PaymentIntent, GatewayError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError>;

    async fn create_refund(
        &self,
        intent_id: &str,
        amount: Decimal,
    ) -> Result<RefundOutcome, GatewayError>;

    /// Move a vendor's earnings to their account. Simulated in this
    /// implementation; the outcome is recorded for reconciliation.
    async fn create_transfer(
        &self,
        vendor_id: Uuid,
        amount: Decimal,
        reference: &str,
    ) -> Result<TransferOutcome, GatewayError>;
}

#[derive(Debug, Clone)]
struct SimulatedIntent {
    intent: PaymentIntent,
    #[allow(dead_code)]
    metadata: IntentMetadata,
    refunded: Decimal,
}

/// In-memory processor simulation. Intents start unconfirmed; tests and dev
/// tooling drive them to `succeeded` via [`SimulatedGateway::settle`].
#[derive(Default)]
pub struct SimulatedGateway {
    intents: DashMap<String, SimulatedIntent>,
    transfers: DashMap<String, TransferOutcome>,
}

impl SimulatedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark an intent as succeeded, as a customer completing the hosted
    /// payment flow would.
    pub fn settle(&self, intent_id: &str) -> Result<(), GatewayError> {
        let mut entry = self
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| GatewayError::IntentNotFound(intent_id.to_string()))?;
        entry.intent.status = IntentStatus::Succeeded;
        Ok(())
    }

    /// Mark an intent as abandoned/canceled.
    pub fn cancel(&self, intent_id: &str) -> Result<(), GatewayError> {
        let mut entry = self
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| GatewayError::IntentNotFound(intent_id.to_string()))?;
        entry.intent.status = IntentStatus::Canceled;
        Ok(())
    }

    /// Transfers recorded so far; used by reconciliation checks and tests.
    pub fn recorded_transfers(&self) -> Vec<TransferOutcome> {
        self.transfers.iter().map(|e| e.value().clone()).collect()
    }

    pub fn intent_count(&self) -> usize {
        self.intents.len()
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_intent(
        &self,
        amount: Decimal,
        application_fee: Decimal,
        metadata: IntentMetadata,
    ) -> Result<PaymentIntent, GatewayError> {
        let id = format!("pi_{}", Uuid::new_v4().simple());
        let intent = PaymentIntent {
            id: id.clone(),
            client_secret: format!("{}_secret_{}", id, Uuid::new_v4().simple()),
            status: IntentStatus::RequiresPaymentMethod,
            amount,
            application_fee,
        };
        info!(intent_id = %id, %amount, %application_fee, "simulated intent created");
        self.intents.insert(
            id,
            SimulatedIntent {
                intent: intent.clone(),
                metadata,
                refunded: Decimal::ZERO,
            },
        );
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        self.intents
            .get(intent_id)
            .map(|e| e.intent.clone())
            .ok_or_else(|| GatewayError::IntentNotFound(intent_id.to_string()))
    }

    async fn create_refund(
        &self,
        intent_id: &str,
        amount: Decimal,
    ) -> Result<RefundOutcome, GatewayError> {
        let mut entry = self
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| GatewayError::IntentNotFound(intent_id.to_string()))?;
        if entry.intent.status != IntentStatus::Succeeded {
            return Err(GatewayError::InvalidState(format!(
                "cannot refund intent in state {}",
                entry.intent.status.as_str()
            )));
        }
        if entry.refunded + amount > entry.intent.amount {
            return Err(GatewayError::InvalidState(format!(
                "refund of {amount} exceeds remaining captured amount"
            )));
        }
        entry.refunded += amount;
        Ok(RefundOutcome {
            refund_id: format!("re_{}", Uuid::new_v4().simple()),
            status: "succeeded".to_string(),
        })
    }

    async fn create_transfer(
        &self,
        vendor_id: Uuid,
        amount: Decimal,
        reference: &str,
    ) -> Result<TransferOutcome, GatewayError> {
        let outcome = TransferOutcome {
            transfer_id: format!("tr_{}", Uuid::new_v4().simple()),
            vendor_id,
            amount,
        };
        info!(vendor_id = %vendor_id, %amount, reference, "simulated vendor transfer");
        self.transfers
            .insert(outcome.transfer_id.clone(), outcome.clone());
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn metadata() -> IntentMetadata {
        IntentMetadata {
            order_id: Uuid::new_v4(),
            order_number: "ORD-1".to_string(),
            customer_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn intent_starts_unconfirmed_and_settles() {
        let gw = SimulatedGateway::new();
        let intent = gw
            .create_intent(dec!(120), dec!(12), metadata())
            .await
            .unwrap();
        assert_eq!(intent.status, IntentStatus::RequiresPaymentMethod);

        gw.settle(&intent.id).unwrap();
        let fetched = gw.retrieve_intent(&intent.id).await.unwrap();
        assert_eq!(fetched.status, IntentStatus::Succeeded);
    }

    #[tokio::test]
    async fn refund_requires_settled_intent_and_respects_captured_amount() {
        let gw = SimulatedGateway::new();
        let intent = gw
            .create_intent(dec!(120), dec!(12), metadata())
            .await
            .unwrap();

        assert!(gw.create_refund(&intent.id, dec!(50)).await.is_err());

        gw.settle(&intent.id).unwrap();
        gw.create_refund(&intent.id, dec!(50)).await.unwrap();
        gw.create_refund(&intent.id, dec!(70)).await.unwrap();
        assert!(gw.create_refund(&intent.id, dec!(1)).await.is_err());
    }
}
