//! Craftmarket Checkout
//!
//! Checkout and delivery-fee orchestration for a multi-seller local-goods
//! marketplace: per-seller delivery eligibility, buffered third-party courier
//! quotes, pickup scheduling, and a dual-rail payment flow (card gateway or
//! internal prepaid ledger) with an insufficient-funds top-up-and-retry
//! cycle.
//!
//! External collaborators (geocoding, courier quoting, the payment gateway,
//! the ledger, and order creation) are consumed through the trait seams in
//! [`clients`]; the engine itself holds no HTTP or persistence code.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod checkout;
pub mod clients;
pub mod config;
pub mod delivery;
pub mod errors;
pub mod events;
pub mod geo;
pub mod models;
pub mod payments;

pub use checkout::{CheckoutSession, CheckoutState};
pub use config::CheckoutConfig;
pub use delivery::{CourierQuoteService, EligibilityReport, SellerDeliveryConfig};
pub use errors::CheckoutError;
pub use events::{Event, EventSender};
pub use models::{
    AccountRole, CartLine, CheckoutSelection, CourierQuote, DeliveryAddress, DeliveryMethod,
    DeliveryOption, FulfillmentType, OrderDraft, PaymentRail, PendingPayment, SellerCartGroup,
};
pub use payments::{LedgerTopUpFlow, PaymentInstrument, PaymentRailSelector, PaymentReceipt};

/// Initializes the tracing subscriber for binaries and examples, honoring
/// `RUST_LOG` with the configured level as the default.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
