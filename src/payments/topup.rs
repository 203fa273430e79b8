use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::clients::{LedgerClient, LedgerCreditSource};
use crate::errors::CheckoutError;
use crate::events::{Event, EventSender};
use crate::models::PendingPayment;
use crate::payments::rail::{PaymentInstrument, PaymentRailSelector, PaymentReceipt};

/// A solicited top-up: the payer must add at least `shortfall` to cover the
/// suspended payment.
#[derive(Debug, Clone, PartialEq)]
pub struct TopUpRequest {
    pub account_id: Uuid,
    pub shortfall: Decimal,
    pub total_amount: Decimal,
}

#[derive(Debug)]
struct SuspendedPayment {
    pending: PendingPayment,
    account_id: Uuid,
    shortfall: Decimal,
}

/// The insufficient-funds detour: suspends the in-flight ledger payment,
/// solicits a top-up, and on confirmation replays the original attempt
/// exactly once. A replay that still cannot find the funds (a concurrent
/// spend raced the top-up) surfaces `LedgerRaceLost` instead of looping.
pub struct LedgerTopUpFlow {
    ledger: Arc<dyn LedgerClient>,
    rail: Arc<PaymentRailSelector>,
    events: Option<EventSender>,
    suspended: Mutex<Option<SuspendedPayment>>,
}

impl LedgerTopUpFlow {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        rail: Arc<PaymentRailSelector>,
        events: Option<EventSender>,
    ) -> Self {
        Self {
            ledger,
            rail,
            events,
            suspended: Mutex::new(None),
        }
    }

    /// Suspends a payment that failed with a shortfall and asks for a top-up.
    /// The pending payment is held in memory until confirmation or abandon.
    #[instrument(skip(self, pending), fields(draft_id = %pending.order_draft.draft_id, shortfall = %shortfall))]
    pub async fn suspend(
        &self,
        account_id: Uuid,
        pending: PendingPayment,
        shortfall: Decimal,
    ) -> Result<TopUpRequest, CheckoutError> {
        if shortfall <= Decimal::ZERO {
            return Err(CheckoutError::InvalidInput(format!(
                "Shortfall must be positive, got {}",
                shortfall
            )));
        }
        let request = TopUpRequest {
            account_id,
            shortfall,
            total_amount: pending.total_amount,
        };

        let mut suspended = self.suspended.lock().await;
        if suspended.is_some() {
            return Err(CheckoutError::InvalidOperation(
                "A payment is already suspended for top-up".to_string(),
            ));
        }
        *suspended = Some(SuspendedPayment {
            pending,
            account_id,
            shortfall,
        });
        drop(suspended);

        self.emit(Event::TopUpRequested {
            account_id,
            shortfall,
        })
        .await;
        Ok(request)
    }

    pub async fn has_suspended(&self) -> bool {
        self.suspended.lock().await.is_some()
    }

    /// Applies a confirmed top-up and deterministically replays the held
    /// payment once. The authoritative balance is re-fetched after the
    /// credit; the top-up's reported delta is never trusted on its own.
    #[instrument(skip(self), fields(amount = %amount))]
    pub async fn confirm_top_up(&self, amount: Decimal) -> Result<PaymentReceipt, CheckoutError> {
        let shortfall = {
            let suspended = self.suspended.lock().await;
            let held = suspended.as_ref().ok_or_else(|| {
                CheckoutError::InvalidOperation("No payment is suspended for top-up".to_string())
            })?;
            held.shortfall
        };
        if amount < shortfall {
            // The suspension stays; the payer can retry with enough.
            return Err(CheckoutError::InvalidInput(format!(
                "Top-up of {} does not cover the shortfall of {}",
                amount, shortfall
            )));
        }

        // The replay happens exactly once: the held payment is consumed here
        // whatever the outcome.
        let held = self
            .suspended
            .lock()
            .await
            .take()
            .ok_or_else(|| {
                CheckoutError::InvalidOperation("No payment is suspended for top-up".to_string())
            })?;

        self.ledger
            .credit(held.account_id, amount, LedgerCreditSource::CardTopUp)
            .await
            .map_err(|e| CheckoutError::ExternalServiceError(e.to_string()))?;

        let balance = self
            .ledger
            .get_balance(held.account_id)
            .await
            .map_err(|e| CheckoutError::ExternalServiceError(e.to_string()))?;
        info!(new_balance = %balance, "top-up confirmed, replaying held payment");
        self.emit(Event::TopUpConfirmed {
            account_id: held.account_id,
            new_balance: balance,
        })
        .await;

        let instrument = PaymentInstrument::Ledger {
            account_id: held.account_id,
        };
        match self
            .rail
            .attempt_payment(&held.pending.order_draft, &instrument)
            .await
        {
            Ok(receipt) => Ok(receipt),
            Err(CheckoutError::LedgerInsufficientFunds { shortfall }) => {
                // A concurrent spend raced the top-up to the balance. Only
                // one automatic retry; surface instead of looping.
                warn!(%shortfall, "replayed payment still short after top-up");
                Err(CheckoutError::LedgerRaceLost)
            }
            Err(e) => Err(e),
        }
    }

    /// Drops the held payment without replaying it (the payer walked away).
    pub async fn abandon(&self) -> Option<PendingPayment> {
        self.suspended
            .lock()
            .await
            .take()
            .map(|held| held.pending)
    }

    async fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            if let Err(e) = events.send(event).await {
                warn!(error = %e, "failed to publish top-up event");
            }
        }
    }
}
