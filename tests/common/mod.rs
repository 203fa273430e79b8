//! Shared fixtures and collaborator mocks for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use craftmarket_checkout::clients::{
    CourierClient, CourierQuoteResponse, GatewayConfirmation, GatewayError, OrderSink,
    PackageDetails, PaymentGateway, PaymentIntent,
};
use craftmarket_checkout::delivery::eligibility::SellerDeliveryConfig;
use craftmarket_checkout::errors::CheckoutError;
use craftmarket_checkout::geo::Coordinates;
use craftmarket_checkout::models::{
    CartLine, CheckoutSelection, DeliveryAddress, FulfillmentType, OrderDraft, SellerCartGroup,
};

pub fn address(street: &str) -> DeliveryAddress {
    DeliveryAddress {
        street: street.to_string(),
        city: "Montreal".to_string(),
        state: "QC".to_string(),
        postal_code: "H2Y 1G1".to_string(),
        country: "CA".to_string(),
        latitude: Some(45.01),
        longitude: Some(-73.0),
    }
}

pub fn package() -> PackageDetails {
    PackageDetails {
        weight_kg: 2.5,
        item_count: 1,
        description: Some("ceramics".to_string()),
    }
}

pub fn cart_line(seller_id: Uuid, unit_price: Decimal, quantity: u32) -> CartLine {
    CartLine {
        product_id: Uuid::new_v4(),
        seller_id,
        unit_price,
        quantity,
        fulfillment: FulfillmentType::ReadyToShip,
        lead_time: None,
        next_available_date: None,
    }
}

/// A one-line order draft totalling `total`, for exercising the payment rails
/// without driving a whole session.
pub fn draft_totalling(buyer_account: Uuid, total: Decimal) -> OrderDraft {
    let seller_id = Uuid::new_v4();
    OrderDraft {
        draft_id: Uuid::new_v4(),
        buyer_account,
        currency: "CAD".to_string(),
        groups: vec![SellerCartGroup {
            seller_id,
            lines: vec![cart_line(seller_id, total, 1)],
        }],
        selection: CheckoutSelection::default(),
    }
}

pub fn seller_config() -> SellerDeliveryConfig {
    SellerDeliveryConfig {
        pickup_enabled: true,
        delivery_enabled: true,
        delivery_radius_km: 10.0,
        delivery_base_fee: dec!(7.00),
        free_delivery_threshold: Some(dec!(75.00)),
        professional_enabled: true,
        professional_radius_km: 25.0,
        coordinates: Some(Coordinates::new(45.0, -73.0)),
    }
}

/// Scriptable courier quoting service.
pub struct MockCourierClient {
    pub fee: Decimal,
    pub ttl_secs: i64,
    pub failing: AtomicBool,
    pub calls: AtomicUsize,
}

impl MockCourierClient {
    pub fn quoting(fee: Decimal) -> Self {
        Self {
            fee,
            ttl_secs: 900,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CourierClient for MockCourierClient {
    async fn quote(
        &self,
        _pickup: &DeliveryAddress,
        _dropoff: &DeliveryAddress,
        _package: &PackageDetails,
        buffer_percent: u32,
    ) -> Result<CourierQuoteResponse, CheckoutError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CheckoutError::QuoteServiceUnavailable(
                "courier api timeout".to_string(),
            ));
        }
        let buffer = (self.fee * Decimal::from(buffer_percent) / Decimal::from(100)).round_dp(2);
        Ok(CourierQuoteResponse {
            quote_id: Uuid::new_v4(),
            estimated_fee: self.fee,
            charged_amount: self.fee + buffer,
            expires_at: Utc::now() + Duration::seconds(self.ttl_secs),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GatewayMode {
    Succeed,
    Decline,
    Transient,
}

/// Scriptable card gateway recording intent lifecycle calls.
pub struct MockGateway {
    pub mode: Mutex<GatewayMode>,
    pub cancelled: Mutex<Vec<String>>,
    pub created: AtomicUsize,
}

impl MockGateway {
    pub fn new(mode: GatewayMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            cancelled: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
        }
    }

    pub fn set_mode(&self, mode: GatewayMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn cancelled_handles(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_intent(
        &self,
        amount: Decimal,
        currency: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentIntent {
            handle: format!("pi_test_{}", n),
            amount,
            currency: currency.to_string(),
        })
    }

    async fn confirm(
        &self,
        _handle: &str,
        _payment_method: &str,
    ) -> Result<GatewayConfirmation, GatewayError> {
        match *self.mode.lock().unwrap() {
            GatewayMode::Succeed => Ok(GatewayConfirmation {
                payment_ref: format!("ch_{}", Uuid::new_v4()),
            }),
            GatewayMode::Decline => Err(GatewayError::Declined("insufficient funds".to_string())),
            GatewayMode::Transient => {
                Err(GatewayError::Transient("incorrect cvc, resubmit".to_string()))
            }
        }
    }

    async fn cancel_intent(&self, handle: &str) -> Result<(), GatewayError> {
        self.cancelled.lock().unwrap().push(handle.to_string());
        Ok(())
    }
}

/// Order sink that always refuses, for exercising debit reversal.
pub struct FailingOrderSink;

#[async_trait]
impl OrderSink for FailingOrderSink {
    async fn create_order(
        &self,
        _draft: &OrderDraft,
        _payment_ref: &str,
    ) -> Result<Uuid, CheckoutError> {
        Err(CheckoutError::ExternalServiceError(
            "order service down".to_string(),
        ))
    }
}
