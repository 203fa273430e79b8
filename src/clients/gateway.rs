use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::CheckoutError;

/// A reserved gateway payment, identified by the client handle ("client
/// secret") handed to the card entry form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub handle: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfirmation {
    pub payment_ref: String,
}

/// Gateway failures split into terminal declines (the handle is dead, the
/// user must re-enter a payment method) and transient errors that may be
/// resubmitted against the same handle.
#[derive(Debug, Error, PartialEq)]
pub enum GatewayError {
    #[error("card declined: {0}")]
    Declined(String),
    #[error("card expired")]
    ExpiredCard,
    #[error("transient gateway error: {0}")]
    Transient(String),
    #[error("gateway unavailable: {0}")]
    Service(String),
}

impl GatewayError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GatewayError::Declined(_) | GatewayError::ExpiredCard)
    }
}

impl From<GatewayError> for CheckoutError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Declined(msg) => CheckoutError::GatewayDeclined(msg),
            GatewayError::ExpiredCard => CheckoutError::GatewayDeclined("card expired".into()),
            GatewayError::Transient(msg) => CheckoutError::GatewayTransient(msg),
            GatewayError::Service(msg) => CheckoutError::ExternalServiceError(msg),
        }
    }
}

/// External card payment gateway; tokenization internals are out of scope.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Reserves a payment sized to the order total and returns the client
    /// handle the card form confirms against.
    async fn create_intent(
        &self,
        amount: Decimal,
        currency: &str,
    ) -> Result<PaymentIntent, GatewayError>;

    async fn confirm(
        &self,
        handle: &str,
        payment_method: &str,
    ) -> Result<GatewayConfirmation, GatewayError>;

    /// Invalidates a reserved intent so a stale total can never be charged.
    async fn cancel_intent(&self, handle: &str) -> Result<(), GatewayError>;
}
