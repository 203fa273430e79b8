use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Error taxonomy for the checkout orchestration engine.
///
/// Recoverable conditions (fallback fee estimates, the top-up sub-flow) are
/// modelled as distinct variants so callers can branch on them instead of
/// parsing messages. Everything else carries an actionable, user-facing
/// description naming the blocking seller or field.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum CheckoutError {
    #[error("Address incomplete: {0}")]
    AddressIncomplete(String),

    #[error("Delivery ineligible: {0}")]
    DeliveryIneligible(String),

    #[error("Courier quote {quote_id} for seller {seller_id} has expired")]
    QuoteExpired { seller_id: Uuid, quote_id: Uuid },

    #[error("Courier quoting service unavailable: {0}")]
    QuoteServiceUnavailable(String),

    #[error("Payment declined: {0}")]
    GatewayDeclined(String),

    #[error("Payment gateway error (retryable): {0}")]
    GatewayTransient(String),

    #[error("Insufficient ledger balance: short {shortfall}")]
    LedgerInsufficientFunds { shortfall: Decimal },

    #[error("Ledger debit lost to a concurrent spend")]
    LedgerRaceLost,

    #[error("Schedule unavailable: {0}")]
    ScheduleUnavailable(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for CheckoutError {
    fn from(err: validator::ValidationErrors) -> Self {
        CheckoutError::ValidationError(err.to_string())
    }
}

impl CheckoutError {
    /// Whether the checkout flow can recover from this error without user
    /// re-entry of a payment method (quote fallback, top-up retry).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::QuoteServiceUnavailable(_)
                | Self::GatewayTransient(_)
                | Self::LedgerInsufficientFunds { .. }
        )
    }

    /// Terminal payment failures end the session and clear any held gateway
    /// handle. Transient gateway errors and ledger shortfalls do not.
    pub fn is_terminal_payment_failure(&self) -> bool {
        matches!(self, Self::GatewayDeclined(_) | Self::LedgerRaceLost)
    }

    /// A held gateway intent survives transient errors so the same handle can
    /// be resubmitted; declines invalidate it.
    pub fn clears_gateway_handle(&self) -> bool {
        matches!(self, Self::GatewayDeclined(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn shortfall_is_part_of_the_error_surface() {
        let err = CheckoutError::LedgerInsufficientFunds {
            shortfall: dec!(20),
        };
        assert!(err.is_recoverable());
        assert!(!err.is_terminal_payment_failure());
        assert!(err.to_string().contains("20"));
    }

    #[test]
    fn transient_gateway_errors_keep_the_handle() {
        assert!(!CheckoutError::GatewayTransient("bad cvc".into()).clears_gateway_handle());
        assert!(CheckoutError::GatewayDeclined("card declined".into()).clears_gateway_handle());
        assert!(CheckoutError::LedgerRaceLost.is_terminal_payment_failure());
    }
}
