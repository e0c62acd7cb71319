//! Room-booking conflict detection, stay pricing and appointment capacity
//! admission.
//!
//! Stays are half-open night ranges `[check_in, check_out)`: a guest leaving
//! on the 5th frees the room for a guest arriving on the 5th.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::error::{RahatiError, Result};
use crate::model::{money, Accommodation, AccommodationStatus, ServiceCapacity, APPOINTMENT_SERVICE};

pub const ROOM_UNAVAILABLE: &str = "The room is not available for the selected dates";
pub const NO_SLOTS: &str = "No available slots for the selected date and time";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StayRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayRange {
    /// Build a stay, rejecting empty or inverted ranges
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self> {
        if check_out <= check_in {
            return Err(RahatiError::invalid_field(
                "check_out_date",
                "The check out date must be a date after check in date.",
            ));
        }
        Ok(Self { check_in, check_out })
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &StayRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }
}

/// Reject the stay if any live booking on the same room overlaps it.
///
/// `existing` are the room's other bookings; cancelled ones and the booking
/// identified by `exclude_id` (the one being edited) are ignored.
pub fn ensure_room_free(
    stay: &StayRange,
    existing: &[Accommodation],
    exclude_id: Option<i64>,
) -> Result<()> {
    let conflict = existing.iter().find(|booking| {
        Some(booking.id) != exclude_id
            && booking.status != AccommodationStatus::Cancelled
            && booking.stay().overlaps(stay)
    });

    match conflict {
        Some(booking) => {
            tracing::debug!(
                conflicting_id = booking.id,
                room_id = booking.room_id,
                "Stay overlaps an existing booking"
            );
            Err(RahatiError::rejected(ROOM_UNAVAILABLE))
        }
        None => Ok(()),
    }
}

/// Room nights plus the meal plan for every guest on every night.
pub fn stay_price(
    price_per_night: Decimal,
    stay: &StayRange,
    meal_price: Option<Decimal>,
    guests: i64,
) -> Decimal {
    let nights = Decimal::from(stay.nights());
    let mut total = price_per_night * nights;
    if let Some(meal) = meal_price {
        total += meal * nights * Decimal::from(guests);
    }
    money(total)
}

/// Pick the capacity rule governing an appointment at `at`.
///
/// Only active appointment rules for that calendar day are considered. A
/// rule with a time window applies when `at` falls inside it (bounds
/// inclusive); a rule without one covers the whole day. Windowed rules win
/// over day-wide ones, the narrowest window first.
pub fn governing_rule(rules: &[ServiceCapacity], at: NaiveDateTime) -> Option<&ServiceCapacity> {
    let time = at.time();
    rules
        .iter()
        .filter(|r| r.is_active && r.service_type == APPOINTMENT_SERVICE && r.date == at.date())
        .filter(|r| match r.window() {
            Some((start, end)) => start <= time && time <= end,
            None => true,
        })
        .min_by_key(|r| (window_width(r.window()), r.id))
}

fn window_width(window: Option<(NaiveTime, NaiveTime)>) -> i64 {
    match window {
        Some((start, end)) => (end - start).num_seconds(),
        None => i64::MAX,
    }
}

/// Admit one more booking under `rule` given how many it already holds.
pub fn admit(rule: &ServiceCapacity, booked: i64) -> Result<()> {
    if booked >= rule.max_capacity {
        tracing::info!(
            rule_id = rule.id,
            center_id = rule.center_id,
            booked,
            max_capacity = rule.max_capacity,
            "Capacity exhausted"
        );
        return Err(RahatiError::rejected(NO_SLOTS));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M:%S").unwrap()
    }

    fn booking(id: i64, check_in: &str, check_out: &str, status: AccommodationStatus) -> Accommodation {
        Accommodation {
            id,
            appointment_id: id,
            room_id: 1,
            meal_option_id: None,
            check_in_date: date(check_in),
            check_out_date: date(check_out),
            number_of_guests: 1,
            total_price: Decimal::ZERO,
            status,
            special_requests: None,
            created_at: at("2030-01-01 00:00:00"),
            updated_at: at("2030-01-01 00:00:00"),
        }
    }

    fn rule(id: i64, max: i64, window: Option<(&str, &str)>) -> ServiceCapacity {
        ServiceCapacity {
            id,
            center_id: 1,
            service_type: APPOINTMENT_SERVICE.to_string(),
            max_capacity: max,
            date: date("2030-06-01"),
            start_time: window.map(|(s, _)| time(s)),
            end_time: window.map(|(_, e)| time(e)),
            is_active: true,
            notes: None,
            created_at: at("2030-01-01 00:00:00"),
            updated_at: at("2030-01-01 00:00:00"),
        }
    }

    #[test]
    fn test_stay_rejects_inverted_range() {
        assert!(StayRange::new(date("2030-06-05"), date("2030-06-05")).is_err());
        assert!(StayRange::new(date("2030-06-05"), date("2030-06-04")).is_err());
        assert_eq!(StayRange::new(date("2030-06-01"), date("2030-06-04")).unwrap().nights(), 3);
    }

    #[test]
    fn test_overlap_is_half_open() {
        let a = StayRange::new(date("2030-06-01"), date("2030-06-05")).unwrap();
        let back_to_back = StayRange::new(date("2030-06-05"), date("2030-06-07")).unwrap();
        let inside = StayRange::new(date("2030-06-02"), date("2030-06-03")).unwrap();
        let around = StayRange::new(date("2030-05-30"), date("2030-06-10")).unwrap();
        assert!(!a.overlaps(&back_to_back));
        assert!(!back_to_back.overlaps(&a));
        assert!(a.overlaps(&inside));
        assert!(a.overlaps(&around));
        assert!(around.overlaps(&a));
    }

    #[test]
    fn test_ensure_room_free_ignores_cancelled_and_self() {
        let existing = vec![
            booking(1, "2030-06-01", "2030-06-05", AccommodationStatus::Cancelled),
            booking(2, "2030-06-03", "2030-06-06", AccommodationStatus::Reserved),
        ];
        let stay = StayRange::new(date("2030-06-02"), date("2030-06-04")).unwrap();

        let err = ensure_room_free(&stay, &existing, None).unwrap_err();
        assert_eq!(err.to_string(), ROOM_UNAVAILABLE);

        // Editing booking 2 itself is fine
        assert!(ensure_room_free(&stay, &existing, Some(2)).is_ok());
    }

    #[test]
    fn test_stay_price_with_meal_plan() {
        let stay = StayRange::new(date("2030-06-01"), date("2030-06-04")).unwrap();
        let room = Decimal::from_str("150.00").unwrap();
        let meal = Decimal::from_str("30.00").unwrap();

        assert_eq!(stay_price(room, &stay, None, 2).to_string(), "450.00");
        // 3 nights * 150 + 30 * 3 nights * 2 guests
        assert_eq!(stay_price(room, &stay, Some(meal), 2).to_string(), "630.00");
    }

    #[test]
    fn test_governing_rule_prefers_window() {
        let rules = vec![rule(1, 20, None), rule(2, 3, Some(("09:00:00", "12:00:00")))];

        let morning = governing_rule(&rules, at("2030-06-01 10:30:00")).unwrap();
        assert_eq!(morning.id, 2);

        let afternoon = governing_rule(&rules, at("2030-06-01 15:00:00")).unwrap();
        assert_eq!(afternoon.id, 1);

        assert!(governing_rule(&rules, at("2030-06-02 10:30:00")).is_none());
    }

    #[test]
    fn test_governing_rule_skips_inactive() {
        let mut inactive = rule(1, 5, None);
        inactive.is_active = false;
        assert!(governing_rule(&[inactive], at("2030-06-01 10:00:00")).is_none());
    }

    #[test]
    fn test_admit() {
        let r = rule(1, 2, None);
        assert!(admit(&r, 0).is_ok());
        assert!(admit(&r, 1).is_ok());
        assert_eq!(admit(&r, 2).unwrap_err().to_string(), NO_SLOTS);
    }
}
