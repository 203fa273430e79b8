//! Per-seller delivery resolution: method eligibility, buffered courier
//! quotes, and pickup scheduling.

pub mod eligibility;
pub mod quotes;
pub mod schedule;

pub use eligibility::{resolve_eligibility, revalidate, EligibilityReport, FallbackOutcome, SellerDeliveryConfig};
pub use quotes::CourierQuoteService;
pub use schedule::{
    earliest_available_date, generate_slots, validate_selection, DaySchedule, TimeWindow,
    WeeklySchedule,
};
