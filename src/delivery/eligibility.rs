use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::geo::{haversine_km, Coordinates};
use crate::models::{Availability, DeliveryMethod, DeliveryOption};

/// A seller's delivery configuration as saved in their shop profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerDeliveryConfig {
    pub pickup_enabled: bool,
    pub delivery_enabled: bool,
    /// Radius for the seller's own ("personal") delivery.
    pub delivery_radius_km: f64,
    pub delivery_base_fee: Decimal,
    /// Order subtotal at or above which personal delivery is free.
    pub free_delivery_threshold: Option<Decimal>,
    /// Third-party ("professional") courier delivery toggle.
    pub professional_enabled: bool,
    /// Courier service radius, independent of the personal radius.
    pub professional_radius_km: f64,
    /// Seller shop location.
    pub coordinates: Option<Coordinates>,
}

/// The three delivery method entries resolved for one seller group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub seller_id: Uuid,
    pub pickup: DeliveryOption,
    pub personal: DeliveryOption,
    pub courier: DeliveryOption,
}

impl EligibilityReport {
    pub fn option(&self, method: DeliveryMethod) -> &DeliveryOption {
        match method {
            DeliveryMethod::Pickup => &self.pickup,
            DeliveryMethod::PersonalDelivery => &self.personal,
            DeliveryMethod::CourierDelivery => &self.courier,
        }
    }

    pub fn is_selectable(&self, method: DeliveryMethod) -> bool {
        self.option(method).is_selectable()
    }
}

/// Resolves which delivery methods a seller offers for this buyer and cart.
///
/// Pickup ignores distance entirely. Personal delivery requires the buyer to
/// be inside the configured radius, with a free-delivery threshold on the
/// fee. Courier delivery depends only on the professional toggle and its own
/// radius. Missing buyer coordinates report "pending address"; distance
/// calculation failures surface as errors, never as "in range".
pub fn resolve_eligibility(
    seller_id: Uuid,
    config: &SellerDeliveryConfig,
    buyer: Option<Coordinates>,
    subtotal: Decimal,
) -> EligibilityReport {
    let pickup = if config.pickup_enabled {
        available(DeliveryMethod::Pickup, Decimal::ZERO)
    } else {
        unavailable(DeliveryMethod::Pickup, "Seller does not offer pickup")
    };

    let personal = resolve_personal(config, buyer, subtotal);
    let courier = resolve_courier(config, buyer);

    debug!(
        seller_id = %seller_id,
        pickup = ?pickup.availability,
        personal = ?personal.availability,
        courier = ?courier.availability,
        "delivery eligibility resolved"
    );

    EligibilityReport {
        seller_id,
        pickup,
        personal,
        courier,
    }
}

fn resolve_personal(
    config: &SellerDeliveryConfig,
    buyer: Option<Coordinates>,
    subtotal: Decimal,
) -> DeliveryOption {
    let method = DeliveryMethod::PersonalDelivery;
    if !config.delivery_enabled {
        return unavailable(method, "Seller does not offer delivery");
    }
    if config.delivery_radius_km <= 0.0 {
        return unavailable(method, "Delivery radius not configured");
    }

    match ranged(config, buyer, config.delivery_radius_km) {
        RangeCheck::Pending => pending(method),
        RangeCheck::Failed(reason) => errored(method, reason),
        RangeCheck::Outside(distance) => unavailable(
            method,
            &out_of_radius_reason(config.delivery_radius_km, distance),
        ),
        RangeCheck::Inside(_) => {
            let free = config
                .free_delivery_threshold
                .map(|threshold| subtotal >= threshold)
                .unwrap_or(false);
            let fee = if free {
                Decimal::ZERO
            } else {
                config.delivery_base_fee
            };
            available(method, fee)
        }
    }
}

fn resolve_courier(config: &SellerDeliveryConfig, buyer: Option<Coordinates>) -> DeliveryOption {
    let method = DeliveryMethod::CourierDelivery;
    if !config.professional_enabled {
        return unavailable(method, "Seller does not offer courier delivery");
    }
    if config.professional_radius_km <= 0.0 {
        return unavailable(method, "Courier radius not configured");
    }

    match ranged(config, buyer, config.professional_radius_km) {
        RangeCheck::Pending => pending(method),
        RangeCheck::Failed(reason) => errored(method, reason),
        RangeCheck::Outside(distance) => unavailable(
            method,
            &out_of_radius_reason(config.professional_radius_km, distance),
        ),
        // Fee is quote-derived; stays zero until a quote is attached.
        RangeCheck::Inside(_) => available(method, Decimal::ZERO),
    }
}

enum RangeCheck {
    Inside(f64),
    Outside(f64),
    Pending,
    Failed(String),
}

fn ranged(config: &SellerDeliveryConfig, buyer: Option<Coordinates>, radius_km: f64) -> RangeCheck {
    let Some(buyer) = buyer else {
        return RangeCheck::Pending;
    };
    let Some(seller) = config.coordinates else {
        return RangeCheck::Failed("Seller location is not configured".to_string());
    };
    match haversine_km(seller, buyer) {
        Ok(distance) if distance <= radius_km => RangeCheck::Inside(distance),
        Ok(distance) => RangeCheck::Outside(distance),
        Err(e) => RangeCheck::Failed(format!("Distance calculation failed: {}", e)),
    }
}

fn out_of_radius_reason(radius_km: f64, distance_km: f64) -> String {
    format!("outside {:.0}km radius ({:.1}km away)", radius_km, distance_km)
}

fn available(method: DeliveryMethod, fee: Decimal) -> DeliveryOption {
    DeliveryOption {
        method,
        availability: Availability::Available,
        reason: None,
        fee,
    }
}

fn unavailable(method: DeliveryMethod, reason: &str) -> DeliveryOption {
    DeliveryOption {
        method,
        availability: Availability::Unavailable,
        reason: Some(reason.to_string()),
        fee: Decimal::ZERO,
    }
}

fn pending(method: DeliveryMethod) -> DeliveryOption {
    DeliveryOption {
        method,
        availability: Availability::PendingAddress,
        reason: Some("Pending address".to_string()),
        fee: Decimal::ZERO,
    }
}

fn errored(method: DeliveryMethod, reason: String) -> DeliveryOption {
    DeliveryOption {
        method,
        availability: Availability::Error,
        reason: Some(reason),
        fee: Decimal::ZERO,
    }
}

/// Result of re-validating an existing selection against a fresh report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackOutcome {
    pub seller_id: Uuid,
    pub previous: DeliveryMethod,
    /// `None` means no method could replace the invalidated one.
    pub replacement: Option<DeliveryMethod>,
    /// User-facing explanation of why the previous method was removed.
    pub reason: String,
}

/// Re-validates a previously selected method after the buyer edits their
/// address. Returns `None` when the selection still stands. On invalidation
/// the fallback order is Pickup, then CourierDelivery, then nothing; the
/// caller turns the outcome into a structured event, keeping validation free
/// of presentation side effects.
pub fn revalidate(
    report: &EligibilityReport,
    current: DeliveryMethod,
) -> Option<FallbackOutcome> {
    if report.is_selectable(current) {
        return None;
    }

    let reason = report
        .option(current)
        .reason
        .clone()
        .unwrap_or_else(|| "No longer available".to_string());

    let replacement = [DeliveryMethod::Pickup, DeliveryMethod::CourierDelivery]
        .into_iter()
        .find(|&candidate| candidate != current && report.is_selectable(candidate));

    Some(FallbackOutcome {
        seller_id: report.seller_id,
        previous: current,
        replacement,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_config() -> SellerDeliveryConfig {
        SellerDeliveryConfig {
            pickup_enabled: true,
            delivery_enabled: true,
            delivery_radius_km: 10.0,
            delivery_base_fee: dec!(7.00),
            free_delivery_threshold: Some(dec!(75.00)),
            professional_enabled: false,
            professional_radius_km: 0.0,
            coordinates: Some(Coordinates::new(45.0, -73.0)),
        }
    }

    #[test]
    fn missing_buyer_coordinates_report_pending_not_out_of_radius() {
        let report = resolve_eligibility(Uuid::new_v4(), &base_config(), None, dec!(20));
        assert_eq!(report.personal.availability, Availability::PendingAddress);
        assert_eq!(report.personal.reason.as_deref(), Some("Pending address"));
    }

    #[test]
    fn free_delivery_above_threshold() {
        let buyer = Some(Coordinates::new(45.01, -73.0));
        let cheap = resolve_eligibility(Uuid::new_v4(), &base_config(), buyer, dec!(20));
        assert_eq!(cheap.personal.fee, dec!(7.00));
        let generous = resolve_eligibility(Uuid::new_v4(), &base_config(), buyer, dec!(80));
        assert_eq!(generous.personal.fee, dec!(0));
    }

    #[test]
    fn missing_seller_location_is_an_error_not_in_range() {
        let mut config = base_config();
        config.coordinates = None;
        let buyer = Some(Coordinates::new(45.01, -73.0));
        let report = resolve_eligibility(Uuid::new_v4(), &config, buyer, dec!(20));
        assert_eq!(report.personal.availability, Availability::Error);
    }

    #[test]
    fn fallback_prefers_pickup_over_courier() {
        let mut config = base_config();
        config.professional_enabled = true;
        config.professional_radius_km = 25.0;
        // Buyer ~12km north: outside the 10km personal radius.
        let buyer = Some(Coordinates::new(45.10793, -73.0));
        let report = resolve_eligibility(Uuid::new_v4(), &config, buyer, dec!(20));

        let outcome = revalidate(&report, DeliveryMethod::PersonalDelivery).unwrap();
        assert_eq!(outcome.replacement, Some(DeliveryMethod::Pickup));

        let mut no_pickup = config.clone();
        no_pickup.pickup_enabled = false;
        let report = resolve_eligibility(Uuid::new_v4(), &no_pickup, buyer, dec!(20));
        let outcome = revalidate(&report, DeliveryMethod::PersonalDelivery).unwrap();
        assert_eq!(outcome.replacement, Some(DeliveryMethod::CourierDelivery));
    }
}
