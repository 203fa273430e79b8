//! Trait seams for the external collaborators of the checkout engine:
//! geocoding, courier quoting, the payment gateway, the internal ledger, and
//! the order-creation endpoint. The engine only ever sees these interfaces.

pub mod courier;
pub mod gateway;
pub mod geocoding;
pub mod ledger;
pub mod orders;

pub use courier::{CourierClient, CourierQuoteResponse, PackageDetails};
pub use gateway::{GatewayConfirmation, GatewayError, PaymentGateway, PaymentIntent};
pub use geocoding::{GeocodeOutcome, GeocodeResult, GeocodingClient, RateLimitedGeocoder};
pub use ledger::{DebitOutcome, InMemoryLedger, LedgerClient, LedgerCreditSource, LedgerError};
pub use orders::{OrderSink, RecordingOrderSink};
