use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum AppointmentStatus {
        Scheduled => "scheduled",
        Completed => "completed",
        Cancelled => "cancelled",
        NoShow => "no-show",
    }
}

/// Shortest bookable appointment, in minutes
pub const MIN_DURATION_MINUTES: i64 = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub center_id: i64,
    pub provider_id: Option<i64>,
    pub appointment_datetime: NaiveDateTime,
    /// Minutes
    pub appointment_duration: i64,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
