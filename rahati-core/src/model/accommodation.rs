use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::booking::StayRange;

string_enum! {
    pub enum AccommodationStatus {
        Reserved => "reserved",
        CheckedIn => "checked-in",
        CheckedOut => "checked-out",
        Cancelled => "cancelled",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Accommodation {
    pub id: i64,
    pub appointment_id: i64,
    pub room_id: i64,
    pub meal_option_id: Option<i64>,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub number_of_guests: i64,
    pub total_price: Decimal,
    pub status: AccommodationStatus,
    pub special_requests: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Accommodation {
    /// The nights this stay occupies
    pub fn stay(&self) -> StayRange {
        StayRange {
            check_in: self.check_in_date,
            check_out: self.check_out_date,
        }
    }
}
