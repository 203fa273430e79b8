use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::clients::{LedgerClient, LedgerCreditSource, LedgerError, OrderSink, PaymentGateway};
use crate::errors::CheckoutError;
use crate::events::{Event, EventSender};
use crate::models::{AccountRole, DeliveryMethod, OrderDraft, PaymentRail};

/// How the payer funds this attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PaymentInstrument {
    /// Confirm a reserved gateway intent with a tokenized payment method.
    Card {
        intent_handle: String,
        payment_method: String,
    },
    /// Debit the payer's internal prepaid balance.
    Ledger { account_id: Uuid },
}

impl PaymentInstrument {
    pub fn rail(&self) -> PaymentRail {
        match self {
            PaymentInstrument::Card { .. } => PaymentRail::Gateway,
            PaymentInstrument::Ledger { .. } => PaymentRail::Ledger,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub order_id: Uuid,
    pub draft_id: Uuid,
    pub amount: Decimal,
    pub rail: PaymentRail,
    pub payment_ref: String,
}

/// Uniform "attempt payment" contract over both rails.
///
/// Card payments confirm against the reserved gateway intent; declines clear
/// the handle, transient errors keep it for resubmission. Ledger payments
/// fetch a fresh balance, debit through the atomic compare-and-decrement, and
/// create the order as one logical unit: a failed order creation reverses the
/// debit, so no debit exists without an order and vice versa.
pub struct PaymentRailSelector {
    gateway: Arc<dyn PaymentGateway>,
    ledger: Arc<dyn LedgerClient>,
    orders: Arc<dyn OrderSink>,
    events: Option<EventSender>,
    completed: Mutex<HashMap<Uuid, PaymentReceipt>>,
}

impl PaymentRailSelector {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        ledger: Arc<dyn LedgerClient>,
        orders: Arc<dyn OrderSink>,
        events: Option<EventSender>,
    ) -> Self {
        Self {
            gateway,
            ledger,
            orders,
            events,
            completed: Mutex::new(HashMap::new()),
        }
    }

    /// Which rail an account role pays over.
    pub fn rail_for(role: AccountRole) -> PaymentRail {
        if role.ledger_eligible() {
            PaymentRail::Ledger
        } else {
            PaymentRail::Gateway
        }
    }

    /// Attempts payment for a finalized order draft.
    ///
    /// Idempotent per draft: replaying an already-succeeded draft returns the
    /// original receipt without touching the gateway, the ledger, or the
    /// order store again.
    #[instrument(skip(self, draft, instrument), fields(draft_id = %draft.draft_id, rail = %instrument.rail()))]
    pub async fn attempt_payment(
        &self,
        draft: &OrderDraft,
        instrument: &PaymentInstrument,
    ) -> Result<PaymentReceipt, CheckoutError> {
        if let Some(receipt) = self.completed.lock().await.get(&draft.draft_id) {
            info!(order_id = %receipt.order_id, "payment already settled for this draft");
            return Ok(receipt.clone());
        }

        let total = draft.total();
        match instrument {
            PaymentInstrument::Card {
                intent_handle,
                payment_method,
            } => self.attempt_card(draft, total, intent_handle, payment_method).await,
            PaymentInstrument::Ledger { account_id } => {
                self.attempt_ledger(draft, total, *account_id).await
            }
        }
    }

    async fn attempt_card(
        &self,
        draft: &OrderDraft,
        total: Decimal,
        intent_handle: &str,
        payment_method: &str,
    ) -> Result<PaymentReceipt, CheckoutError> {
        let confirmation = match self.gateway.confirm(intent_handle, payment_method).await {
            Ok(confirmation) => confirmation,
            Err(e) if e.is_terminal() => {
                // The handle is dead; release the reservation so nothing can
                // be captured against it later.
                if let Err(cancel_err) = self.gateway.cancel_intent(intent_handle).await {
                    warn!(error = %cancel_err, "failed to cancel declined intent");
                }
                let failure: CheckoutError = e.into();
                self.emit_failure(draft, &failure).await;
                return Err(failure);
            }
            Err(e) => {
                let failure: CheckoutError = e.into();
                self.emit_failure(draft, &failure).await;
                return Err(failure);
            }
        };

        let order_id = self
            .orders
            .create_order(draft, &confirmation.payment_ref)
            .await?;
        self.record_success(draft, total, PaymentRail::Gateway, confirmation.payment_ref, order_id)
            .await
    }

    async fn attempt_ledger(
        &self,
        draft: &OrderDraft,
        total: Decimal,
        account_id: Uuid,
    ) -> Result<PaymentReceipt, CheckoutError> {
        // Fresh fetch immediately before the debit; cached balances are
        // useless against concurrent spends.
        let balance = self
            .ledger
            .get_balance(account_id)
            .await
            .map_err(|e| CheckoutError::ExternalServiceError(e.to_string()))?;

        if balance < total {
            let shortfall = total - balance;
            info!(%balance, %total, %shortfall, "ledger balance short, top-up required");
            let failure = CheckoutError::LedgerInsufficientFunds { shortfall };
            self.emit_failure(draft, &failure).await;
            return Err(failure);
        }

        let outcome = match self.ledger.debit(account_id, total).await {
            Ok(outcome) => outcome,
            Err(LedgerError::InsufficientFunds { .. }) => {
                // Passed the pre-check but lost the funds to a concurrent
                // spend between fetch and debit.
                let failure = CheckoutError::LedgerRaceLost;
                self.emit_failure(draft, &failure).await;
                return Err(failure);
            }
            Err(e) => {
                let failure = CheckoutError::ExternalServiceError(e.to_string());
                self.emit_failure(draft, &failure).await;
                return Err(failure);
            }
        };

        let payment_ref = format!("ledger-{}", draft.draft_id);
        match self.orders.create_order(draft, &payment_ref).await {
            Ok(order_id) => {
                self.record_success(draft, total, PaymentRail::Ledger, payment_ref, order_id)
                    .await
            }
            Err(e) => {
                // Keep debit and order consistent: reverse the debit when the
                // order cannot be created.
                error!(error = %e, new_balance = %outcome.new_balance, "order creation failed after debit, reversing");
                if let Err(reversal_err) = self
                    .ledger
                    .credit(account_id, total, LedgerCreditSource::DebitReversal)
                    .await
                {
                    error!(error = %reversal_err, "debit reversal failed, ledger requires manual reconciliation");
                }
                self.emit_failure(draft, &e).await;
                Err(e)
            }
        }
    }

    async fn record_success(
        &self,
        draft: &OrderDraft,
        total: Decimal,
        rail: PaymentRail,
        payment_ref: String,
        order_id: Uuid,
    ) -> Result<PaymentReceipt, CheckoutError> {
        let receipt = PaymentReceipt {
            order_id,
            draft_id: draft.draft_id,
            amount: total,
            rail,
            payment_ref,
        };
        self.completed
            .lock()
            .await
            .insert(draft.draft_id, receipt.clone());

        info!(order_id = %order_id, amount = %total, "payment settled and order created");
        self.emit(Event::PaymentSucceeded {
            draft_id: draft.draft_id,
            order_id,
            rail,
            amount: total,
        })
        .await;

        // Every courier buffer in the paid draft becomes a refund obligation
        // owed back to the payer once the courier settles.
        for (seller_id, selection) in draft.selection.iter() {
            if selection.method != DeliveryMethod::CourierDelivery {
                continue;
            }
            if let Some(quote) = &selection.quote {
                self.emit(Event::BufferRefundObligation {
                    account_id: draft.buyer_account,
                    seller_id: *seller_id,
                    quote_id: quote.quote_id,
                    buffer_amount: quote.buffer_amount,
                })
                .await;
            }
        }

        Ok(receipt)
    }

    async fn emit_failure(&self, draft: &OrderDraft, error: &CheckoutError) {
        self.emit(Event::PaymentFailed {
            draft_id: draft.draft_id,
            reason: error.to_string(),
            terminal: error.is_terminal_payment_failure(),
        })
        .await;
    }

    async fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            if let Err(e) = events.send(event).await {
                warn!(error = %e, "failed to publish payment event");
            }
        }
    }
}
