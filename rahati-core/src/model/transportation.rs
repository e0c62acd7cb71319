use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum TransportationStatus {
        Pending => "pending",
        Confirmed => "confirmed",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

impl TransportationStatus {
    /// Once a ride is confirmed or done it can no longer be cancelled
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Completed)
    }
}

pub const DEFAULT_TRANSPORTATION_TYPE: &str = "standard";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportationRequest {
    pub id: i64,
    pub user_id: i64,
    pub appointment_id: Option<i64>,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub pickup_time: NaiveDateTime,
    pub transportation_type: String,
    pub number_of_passengers: i64,
    pub status: TransportationStatus,
    pub special_instructions: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
