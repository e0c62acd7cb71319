//! Domain records.
//!
//! Every record carries a store-assigned `id` plus `created_at` / `updated_at`
//! timestamps (UTC, naive). Records built for insertion use `id = 0`; the
//! store fills in the real id.

/// Declares a status-like enum stored and serialised as a fixed string.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every accepted spelling, in declaration order
            pub const ALL: &'static [&'static str] = &[$($text),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        "invalid {}: {} (expected one of {})",
                        stringify!($name),
                        raw,
                        Self::ALL.join(", ")
                    ))
                })
            }
        }
    };
}

pub(crate) use string_enum;

pub mod accommodation;
pub mod appointment;
pub mod center;
pub mod consultation;
pub mod feedback;
pub mod meal_option;
pub mod notification;
pub mod payment;
pub mod room;
pub mod service_capacity;
pub mod transportation;
pub mod user;

pub use accommodation::{Accommodation, AccommodationStatus};
pub use appointment::{Appointment, AppointmentStatus};
pub use center::Center;
pub use consultation::{Consultation, ConsultationStatus};
pub use feedback::Feedback;
pub use meal_option::MealOption;
pub use notification::Notification;
pub use payment::{Payment, PaymentStatus};
pub use room::Room;
pub use service_capacity::{ServiceCapacity, APPOINTMENT_SERVICE};
pub use transportation::{TransportationRequest, TransportationStatus};
pub use user::{Role, User};

use chrono::{NaiveDateTime, Timelike, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

/// Current UTC wall-clock time, truncated to whole seconds.
pub fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Normalise a money amount to two decimal places.
pub fn money(mut amount: Decimal) -> Decimal {
    amount = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    amount.rescale(2);
    amount
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_money_rescales() {
        assert_eq!(money(Decimal::from(100)).to_string(), "100.00");
        assert_eq!(money(Decimal::from_str("12.345").unwrap()).to_string(), "12.35");
    }

    #[test]
    fn test_status_round_trip_text() {
        assert_eq!(AppointmentStatus::parse("no-show"), Some(AppointmentStatus::NoShow));
        assert_eq!(AccommodationStatus::CheckedIn.as_str(), "checked-in");
        assert!(PaymentStatus::parse("paid").is_none());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&ConsultationStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        let parsed: TransportationStatus = serde_json::from_str("\"confirmed\"").unwrap();
        assert_eq!(parsed, TransportationStatus::Confirmed);
    }
}
