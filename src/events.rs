use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{DeliveryMethod, PaymentRail};

/// Domain events emitted by the checkout engine.
///
/// Validation and payment logic emit structured events instead of performing
/// presentation side effects; the UI layer subscribes and reacts (toasts,
/// section updates) on its own terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// A previously selected delivery method became invalid (usually after an
    /// address edit) and was auto-replaced or dropped.
    DeliveryMethodInvalidated {
        seller_id: Uuid,
        previous: DeliveryMethod,
        fallback: Option<DeliveryMethod>,
        reason: String,
    },
    QuoteFetched {
        seller_id: Uuid,
        quote_id: Uuid,
        charged_amount: Decimal,
        estimated: bool,
    },
    QuotesEvicted {
        count: usize,
        reason: String,
    },
    DeliveryConfirmed {
        draft_id: Uuid,
        seller_count: usize,
    },
    PaymentIntentRequested {
        draft_id: Uuid,
        amount: Decimal,
    },
    PaymentIntentCancelled {
        draft_id: Uuid,
        handle: String,
    },
    PaymentSucceeded {
        draft_id: Uuid,
        order_id: Uuid,
        rail: PaymentRail,
        amount: Decimal,
    },
    PaymentFailed {
        draft_id: Uuid,
        reason: String,
        terminal: bool,
    },
    TopUpRequested {
        account_id: Uuid,
        shortfall: Decimal,
    },
    TopUpConfirmed {
        account_id: Uuid,
        new_balance: Decimal,
    },
    /// The unused courier buffer after settlement is owed back to the payer's
    /// ledger. Reconciliation consumes these; the buffer is refundable, never
    /// silently kept.
    BufferRefundObligation {
        account_id: Uuid,
        seller_id: Uuid,
        quote_id: Uuid,
        buffer_amount: Decimal,
    },
}

/// Cloneable handle for publishing events onto the session's event stream.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a bounded event channel and its sending handle.
    pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer);
        (EventSender::new(tx), rx)
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}
