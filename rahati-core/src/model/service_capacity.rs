use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Service type governed by appointment admission
pub const APPOINTMENT_SERVICE: &str = "appointment";

/// Maximum bookings a center accepts for one service on one day,
/// optionally restricted to a time-of-day window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCapacity {
    pub id: i64,
    pub center_id: i64,
    pub service_type: String,
    pub max_capacity: i64,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ServiceCapacity {
    /// The time window, only when both bounds are set
    pub fn window(&self) -> Option<(NaiveTime, NaiveTime)> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}
