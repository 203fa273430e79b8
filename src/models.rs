use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::geo::Coordinates;

/// How a line item gets fulfilled, which drives its earliest pickup date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FulfillmentType {
    ReadyToShip,
    MadeToOrder,
    ScheduledOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadTimeUnit {
    Hours,
    Days,
    Weeks,
}

/// Production lead time for made-to-order items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadTime {
    pub value: u32,
    pub unit: LeadTimeUnit,
}

impl LeadTime {
    /// Lead time in whole days; hour-granular lead times round up since
    /// pickup scheduling is day-granular.
    pub fn days_ceil(&self) -> i64 {
        match self.unit {
            LeadTimeUnit::Hours => (i64::from(self.value) + 23) / 24,
            LeadTimeUnit::Days => i64::from(self.value),
            LeadTimeUnit::Weeks => i64::from(self.value) * 7,
        }
    }
}

/// One cart entry. Immutable once the order draft is finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub fulfillment: FulfillmentType,
    pub lead_time: Option<LeadTime>,
    pub next_available_date: Option<NaiveDate>,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Cart lines bundled by the seller fulfilling them. Derived from the cart,
/// never independently persisted; the subtotal is always recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerCartGroup {
    pub seller_id: Uuid,
    pub lines: Vec<CartLine>,
}

impl SellerCartGroup {
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Groups a flat cart by seller, in stable seller-id order.
    pub fn group(lines: Vec<CartLine>) -> Vec<SellerCartGroup> {
        let mut by_seller: BTreeMap<Uuid, Vec<CartLine>> = BTreeMap::new();
        for line in lines {
            by_seller.entry(line.seller_id).or_default().push(line);
        }
        by_seller
            .into_iter()
            .map(|(seller_id, lines)| SellerCartGroup { seller_id, lines })
            .collect()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryMethod {
    Pickup,
    PersonalDelivery,
    CourierDelivery,
}

/// Availability of one delivery method for one seller.
///
/// `PendingAddress` is distinct from `Unavailable`: a guest or patron who has
/// not entered an address yet must not see "out of radius".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable,
    PendingAddress,
    Error,
}

/// One delivery method entry in a seller's eligibility report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOption {
    pub method: DeliveryMethod,
    pub availability: Availability,
    /// Human-readable reason when not available.
    pub reason: Option<String>,
    /// For courier delivery this is quote-derived and stays zero until a
    /// quote is attached to the selection.
    pub fee: Decimal,
}

impl DeliveryOption {
    pub fn is_selectable(&self) -> bool {
        self.availability == Availability::Available
    }
}

/// Delivery destination. Two sources exist: a saved address referenced
/// read-only, or a freshly entered draft. Exactly one is active at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DeliveryAddress {
    #[validate(length(min = 1, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "Postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, message = "Country is required"))]
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl DeliveryAddress {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.validate().is_ok()
    }

    /// Normalized fingerprint used as the quote cache key component. A quote
    /// must never be charged against a different address than it was priced
    /// for, so any textual change produces a new fingerprint.
    pub fn fingerprint(&self) -> String {
        [
            &self.street,
            &self.city,
            &self.state,
            &self.postal_code,
            &self.country,
        ]
        .iter()
        .map(|part| part.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join("|")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    /// Read-only reference to an address book entry.
    Saved(Uuid),
    /// Mutable address entered during checkout.
    Draft,
}

/// The currently active delivery destination. Switching sources invalidates
/// all courier quotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveAddress {
    pub source: AddressSource,
    pub address: DeliveryAddress,
}

/// A priced, buffered courier quote. At most one live authoritative quote
/// exists per seller; fallback estimates (`estimated: true`) are never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierQuote {
    pub quote_id: Uuid,
    pub seller_id: Uuid,
    pub estimated_fee: Decimal,
    pub buffer_percent: u32,
    pub buffer_amount: Decimal,
    /// Always `estimated_fee + buffer_amount`; this is what the payer is
    /// charged, never the bare estimate.
    pub charged_amount: Decimal,
    pub expires_at: DateTime<Utc>,
    /// True for locally estimated fallback quotes produced while the quoting
    /// service is unavailable.
    pub estimated: bool,
}

impl CourierQuote {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A bookable pickup window on a specific date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupSlot {
    pub slot_id: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl PickupSlot {
    pub fn new(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            slot_id: format!(
                "{}-{}-{}",
                date.format("%Y%m%d"),
                start.format("%H%M"),
                end.format("%H%M")
            ),
            date,
            start,
            end,
        }
    }
}

/// The delivery method chosen for one seller group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerSelection {
    pub method: DeliveryMethod,
    pub fee: Decimal,
    pub pickup_slot: Option<PickupSlot>,
    /// Present when the method is courier delivery; carries the buffer that
    /// becomes a refund obligation after settlement.
    pub quote: Option<CourierQuote>,
}

/// Per-seller delivery choices. Mutated only through checkout session
/// transitions; complete (one entry per seller group) before payment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSelection {
    selections: HashMap<Uuid, SellerSelection>,
}

impl CheckoutSelection {
    pub fn get(&self, seller_id: Uuid) -> Option<&SellerSelection> {
        self.selections.get(&seller_id)
    }

    pub fn set(&mut self, seller_id: Uuid, selection: SellerSelection) {
        self.selections.insert(seller_id, selection);
    }

    pub fn remove(&mut self, seller_id: Uuid) -> Option<SellerSelection> {
        self.selections.remove(&seller_id)
    }

    pub fn set_pickup_slot(&mut self, seller_id: Uuid, slot: PickupSlot) -> bool {
        match self.selections.get_mut(&seller_id) {
            Some(selection) if selection.method == DeliveryMethod::Pickup => {
                selection.pickup_slot = Some(slot);
                true
            }
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &SellerSelection)> {
        self.selections.iter()
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn total_delivery_fees(&self) -> Decimal {
        self.selections.values().map(|s| s.fee).sum()
    }
}

/// Marketplace account roles. Patrons hold a prepaid internal balance and pay
/// over the ledger rail; everyone else pays through the card gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccountRole {
    Guest,
    Buyer,
    Patron,
    Artisan,
    Admin,
}

impl AccountRole {
    pub fn ledger_eligible(&self) -> bool {
        matches!(self, AccountRole::Patron)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentRail {
    Gateway,
    Ledger,
}

/// The finalized aggregate handed to the order-creation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub draft_id: Uuid,
    pub buyer_account: Uuid,
    pub currency: String,
    pub groups: Vec<SellerCartGroup>,
    pub selection: CheckoutSelection,
}

impl OrderDraft {
    pub fn subtotal(&self) -> Decimal {
        self.groups.iter().map(SellerCartGroup::subtotal).sum()
    }

    pub fn delivery_total(&self) -> Decimal {
        self.selection.total_delivery_fees()
    }

    pub fn total(&self) -> Decimal {
        self.subtotal() + self.delivery_total()
    }
}

/// An in-flight payment held in memory across a top-up detour. Created when
/// payment begins, destroyed on success or terminal failure, replayed exactly
/// once on top-up confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPayment {
    pub order_draft: OrderDraft,
    pub total_amount: Decimal,
    pub attempted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(seller_id: Uuid, price: Decimal, quantity: u32) -> CartLine {
        CartLine {
            product_id: Uuid::new_v4(),
            seller_id,
            unit_price: price,
            quantity,
            fulfillment: FulfillmentType::ReadyToShip,
            lead_time: None,
            next_available_date: None,
        }
    }

    #[test]
    fn group_subtotal_is_derived_from_lines() {
        let seller = Uuid::new_v4();
        let group = SellerCartGroup {
            seller_id: seller,
            lines: vec![line(seller, dec!(12.50), 2), line(seller, dec!(3.00), 1)],
        };
        assert_eq!(group.subtotal(), dec!(28.00));
    }

    #[test]
    fn grouping_splits_a_multi_seller_cart() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let groups = SellerCartGroup::group(vec![
            line(a, dec!(10), 1),
            line(b, dec!(5), 2),
            line(a, dec!(1), 3),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups.iter().map(|g| g.lines.len()).sum::<usize>(),
            3
        );
    }

    #[test]
    fn lead_time_hours_round_up_to_days() {
        let lt = LeadTime {
            value: 30,
            unit: LeadTimeUnit::Hours,
        };
        assert_eq!(lt.days_ceil(), 2);
        let lt = LeadTime {
            value: 2,
            unit: LeadTimeUnit::Weeks,
        };
        assert_eq!(lt.days_ceil(), 14);
    }

    #[test]
    fn fingerprint_normalizes_case_and_whitespace() {
        let mut addr = DeliveryAddress {
            street: " 12 Rue St-Paul ".into(),
            city: "Montreal".into(),
            state: "QC".into(),
            postal_code: "H2Y 1G1".into(),
            country: "CA".into(),
            latitude: None,
            longitude: None,
        };
        let original = addr.fingerprint();
        addr.street = "12 rue st-paul".into();
        assert_eq!(addr.fingerprint(), original);
        addr.street = "14 rue st-paul".into();
        assert_ne!(addr.fingerprint(), original);
    }
}
