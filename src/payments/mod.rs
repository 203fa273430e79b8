//! Dual-rail payment execution: the external card gateway and the internal
//! prepaid ledger, plus the insufficient-funds top-up detour.

pub mod rail;
pub mod topup;

pub use rail::{PaymentInstrument, PaymentRailSelector, PaymentReceipt};
pub use topup::{LedgerTopUpFlow, TopUpRequest};
