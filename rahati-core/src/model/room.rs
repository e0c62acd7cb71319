use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: i64,
    pub center_id: i64,
    /// Unique within the center
    pub room_number: String,
    #[serde(rename = "type")]
    pub room_type: String,
    pub description: Option<String>,
    pub price_per_night: Decimal,
    pub capacity: i64,
    pub is_accessible: bool,
    pub is_available: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
