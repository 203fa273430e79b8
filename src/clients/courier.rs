use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CheckoutError;
use crate::models::DeliveryAddress;

/// Physical description of one seller's shipment, as the quoting service
/// wants it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDetails {
    pub weight_kg: f64,
    pub item_count: u32,
    pub description: Option<String>,
}

/// Raw quote as priced by the courier service. The quote cache recomputes the
/// buffer locally so the charged-amount invariant holds regardless of what
/// the service reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierQuoteResponse {
    pub quote_id: Uuid,
    pub estimated_fee: Decimal,
    pub charged_amount: Decimal,
    pub expires_at: DateTime<Utc>,
}

/// Third-party courier quoting service (route optimization internals are its
/// problem, not ours).
#[async_trait]
pub trait CourierClient: Send + Sync {
    async fn quote(
        &self,
        pickup: &DeliveryAddress,
        dropoff: &DeliveryAddress,
        package: &PackageDetails,
        buffer_percent: u32,
    ) -> Result<CourierQuoteResponse, CheckoutError>;
}
