use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::CheckoutError;
use crate::models::OrderDraft;

/// Order-creation collaborator. Accepts the finalized draft (lines, delivery
/// method per seller, fees, pickup slots) plus the payment reference and
/// returns the order identifier.
#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn create_order(
        &self,
        draft: &OrderDraft,
        payment_ref: &str,
    ) -> Result<Uuid, CheckoutError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedOrder {
    pub order_id: Uuid,
    pub draft_id: Uuid,
    pub total: Decimal,
    pub payment_ref: String,
}

/// In-memory sink recording every created order, for tests and local runs.
#[derive(Debug, Default)]
pub struct RecordingOrderSink {
    orders: Mutex<Vec<CreatedOrder>>,
}

impl RecordingOrderSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn created(&self) -> Vec<CreatedOrder> {
        self.orders.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.orders.lock().await.len()
    }
}

#[async_trait]
impl OrderSink for RecordingOrderSink {
    async fn create_order(
        &self,
        draft: &OrderDraft,
        payment_ref: &str,
    ) -> Result<Uuid, CheckoutError> {
        let order_id = Uuid::new_v4();
        let mut orders = self.orders.lock().await;
        orders.push(CreatedOrder {
            order_id,
            draft_id: draft.draft_id,
            total: draft.total(),
            payment_ref: payment_ref.to_string(),
        });
        Ok(order_id)
    }
}
