use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use tracing::debug;

use crate::errors::CheckoutError;
use crate::models::{CartLine, FulfillmentType, PickupSlot};

/// One bookable time window a seller configures for a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// A single day's pickup availability.
#[derive(Debug, Clone, PartialEq)]
pub struct DaySchedule {
    pub enabled: bool,
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub windows: Vec<TimeWindow>,
}

/// A seller's weekly pickup schedule. Days without an entry are closed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeeklySchedule {
    days: HashMap<Weekday, DaySchedule>,
}

impl WeeklySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_day(&mut self, weekday: Weekday, schedule: DaySchedule) -> &mut Self {
        self.days.insert(weekday, schedule);
        self
    }

    pub fn day(&self, weekday: Weekday) -> Option<&DaySchedule> {
        self.days.get(&weekday)
    }
}

/// The earliest date the whole multi-item order can be ready: ready-to-ship
/// lines are ready today, made-to-order lines after their lead time, and
/// scheduled lines on their fixed availability date. The order cannot be
/// ready before its slowest item.
pub fn earliest_available_date(lines: &[CartLine], today: NaiveDate) -> NaiveDate {
    lines
        .iter()
        .map(|line| match line.fulfillment {
            FulfillmentType::ReadyToShip => today,
            FulfillmentType::MadeToOrder => line
                .lead_time
                .map(|lead| today + Duration::days(lead.days_ceil()))
                .unwrap_or(today),
            FulfillmentType::ScheduledOrder => line
                .next_available_date
                .map(|date| date.max(today))
                .unwrap_or(today),
        })
        .max()
        .unwrap_or(today)
}

/// Enumerates bookable slots for `days_ahead` calendar days starting at the
/// later of today and the order's earliest available date. Disabled, missing,
/// or malformed day entries are skipped without aborting the scan.
pub fn generate_slots(
    schedule: &WeeklySchedule,
    lines: &[CartLine],
    days_ahead: u32,
    today: NaiveDate,
) -> Vec<PickupSlot> {
    let start = earliest_available_date(lines, today).max(today);
    let mut slots = Vec::new();

    for offset in 0..i64::from(days_ahead) {
        let date = start + Duration::days(offset);
        slots.extend(day_slots(schedule, date));
    }
    slots
}

fn day_slots(schedule: &WeeklySchedule, date: NaiveDate) -> Vec<PickupSlot> {
    let Some(day) = schedule.day(date.weekday()) else {
        return Vec::new();
    };
    if !day.enabled {
        return Vec::new();
    }
    if day.open >= day.close {
        debug!(%date, "skipping malformed day schedule (open >= close)");
        return Vec::new();
    }

    day.windows
        .iter()
        .filter(|window| {
            window.start < window.end && window.start >= day.open && window.end <= day.close
        })
        .map(|window| PickupSlot::new(date, window.start, window.end))
        .collect()
}

/// Validates a chosen pickup date and slot against the seller's schedule.
pub fn validate_selection(
    schedule: &WeeklySchedule,
    date: NaiveDate,
    slot_id: &str,
) -> Result<PickupSlot, CheckoutError> {
    let open = schedule
        .day(date.weekday())
        .map(|day| day.enabled)
        .unwrap_or(false);
    if !open {
        return Err(CheckoutError::ScheduleUnavailable(format!(
            "Seller is closed on {}",
            date.weekday()
        )));
    }

    day_slots(schedule, date)
        .into_iter()
        .find(|slot| slot.slot_id == slot_id)
        .ok_or_else(|| {
            CheckoutError::ScheduleUnavailable(format!(
                "Time slot {} is not available on {}",
                slot_id, date
            ))
        })
}
