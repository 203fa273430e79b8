//! The checkout state machine and its session-scoped timing tools.

pub mod debounce;
pub mod session;

pub use debounce::{Debouncer, RequestSequence};
pub use session::{CheckoutSession, CheckoutState, PaymentSetup, RevalidationStatus, SectionView};
