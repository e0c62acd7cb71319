use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum ConsultationStatus {
        InProgress => "in-progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consultation {
    pub id: i64,
    pub appointment_id: i64,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub provider_notes: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment_plan: Option<String>,
    pub status: ConsultationStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
