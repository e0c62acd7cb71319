//! Request-body validation.
//!
//! A [`Validator`] walks a JSON object field by field. Each typed accessor
//! returns the parsed value when the field is valid and records a message
//! otherwise, so one pass reports every failing field. [`Validator::finish`]
//! turns the collected messages into a single `RahatiError::Validation`.

pub mod formats;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use crate::error::{FieldErrors, RahatiError, Result};
use formats::label;

/// Whether a field must be sent, and whether it may be `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Must be present and non-null
    Required,
    /// May be absent; when present it must be non-null
    Sometimes,
    /// May be absent or null
    Nullable,
}

pub struct Validator<'a> {
    body: &'a Value,
    errors: FieldErrors,
}

impl<'a> Validator<'a> {
    pub fn new(body: &'a Value) -> Self {
        Self {
            body,
            errors: FieldErrors::new(),
        }
    }

    /// Whether the body carries `field` at all (null included)
    pub fn has(&self, field: &str) -> bool {
        self.body.get(field).is_some()
    }

    pub fn is_valid(&self, field: &str) -> bool {
        !self.errors.contains_key(field)
    }

    pub fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Record `message` against `field` unless `ok` holds
    pub fn check(&mut self, ok: bool, field: &str, message: impl Into<String>) {
        if !ok {
            self.fail(field, message);
        }
    }

    /// Report a dangling foreign key
    pub fn exists(&mut self, field: &str, found: bool) {
        if !found {
            let msg = format!("The selected {} is invalid.", label(field));
            self.fail(field, msg);
        }
    }

    /// Resolve presence. `None` means there is nothing further to check.
    fn value(&mut self, field: &str, presence: Presence) -> Option<&'a Value> {
        let body: &'a Value = self.body;
        let value = body.get(field);
        let blank = match value {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        };

        let missing_is_error = match presence {
            Presence::Required => true,
            Presence::Sometimes => value.is_some(),
            Presence::Nullable => false,
        };

        if blank {
            if missing_is_error {
                let msg = format!("The {} field is required.", label(field));
                self.fail(field, msg);
            }
            return None;
        }
        value
    }

    pub fn string(&mut self, field: &str, presence: Presence, max: usize) -> Option<String> {
        match self.value(field, presence)? {
            Value::String(s) if s.chars().count() <= max => Some(s.clone()),
            Value::String(_) => {
                let msg = format!(
                    "The {} must not be greater than {} characters.",
                    label(field),
                    max
                );
                self.fail(field, msg);
                None
            }
            _ => {
                let msg = format!("The {} must be a string.", label(field));
                self.fail(field, msg);
                None
            }
        }
    }

    /// Free text with no length limit
    pub fn text(&mut self, field: &str, presence: Presence) -> Option<String> {
        self.string(field, presence, usize::MAX)
    }

    pub fn email(&mut self, field: &str, presence: Presence) -> Option<String> {
        let raw = self.string(field, presence, 255)?;
        if formats::is_email(&raw) {
            Some(raw)
        } else {
            let msg = format!("The {} must be a valid email address.", label(field));
            self.fail(field, msg);
            None
        }
    }

    pub fn url(&mut self, field: &str, presence: Presence) -> Option<String> {
        let raw = self.string(field, presence, 255)?;
        if formats::is_url(&raw) {
            Some(raw)
        } else {
            let msg = format!("The {} must be a valid URL.", label(field));
            self.fail(field, msg);
            None
        }
    }

    pub fn integer(
        &mut self,
        field: &str,
        presence: Presence,
        min: Option<i64>,
        max: Option<i64>,
    ) -> Option<i64> {
        let parsed = match self.value(field, presence)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        let Some(n) = parsed else {
            let msg = format!("The {} must be an integer.", label(field));
            self.fail(field, msg);
            return None;
        };
        self.in_range(field, n, min, max).then_some(n)
    }

    pub fn number(
        &mut self,
        field: &str,
        presence: Presence,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Option<f64> {
        let parsed = match self.value(field, presence)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        };
        let Some(n) = parsed else {
            let msg = format!("The {} must be a number.", label(field));
            self.fail(field, msg);
            return None;
        };
        self.in_range(field, n, min, max).then_some(n)
    }

    /// Exact decimal amount (money). Strings and JSON numbers are accepted.
    pub fn decimal(&mut self, field: &str, presence: Presence, min: Option<Decimal>) -> Option<Decimal> {
        let parsed = match self.value(field, presence)? {
            Value::Number(n) => Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .ok(),
            Value::String(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        };
        let Some(n) = parsed else {
            let msg = format!("The {} must be a number.", label(field));
            self.fail(field, msg);
            return None;
        };
        self.in_range(field, n, min, None).then_some(n)
    }

    pub fn boolean(&mut self, field: &str, presence: Presence) -> Option<bool> {
        let parsed = match self.value(field, presence)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            Value::String(s) => match s.as_str() {
                "1" => Some(true),
                "0" => Some(false),
                _ => None,
            },
            _ => None,
        };
        if parsed.is_none() {
            let msg = format!("The {} field must be true or false.", label(field));
            self.fail(field, msg);
        }
        parsed
    }

    pub fn date(&mut self, field: &str, presence: Presence) -> Option<NaiveDate> {
        self.temporal(field, presence, formats::parse_date, "is not a valid date")
    }

    pub fn datetime(&mut self, field: &str, presence: Presence) -> Option<NaiveDateTime> {
        self.temporal(field, presence, formats::parse_datetime, "is not a valid date")
    }

    pub fn time(&mut self, field: &str, presence: Presence) -> Option<NaiveTime> {
        self.temporal(
            field,
            presence,
            formats::parse_time,
            "does not match the format H:i:s",
        )
    }

    /// Any JSON object
    pub fn object(&mut self, field: &str, presence: Presence) -> Option<Value> {
        match self.value(field, presence)? {
            v @ Value::Object(_) => Some(v.clone()),
            _ => {
                let msg = format!("The {} must be an array.", label(field));
                self.fail(field, msg);
                None
            }
        }
    }

    /// Membership in a fixed vocabulary, parsed with `parse`
    pub fn one_of<T>(
        &mut self,
        field: &str,
        presence: Presence,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Option<T> {
        let parsed = match self.value(field, presence)? {
            Value::String(s) => parse(s),
            _ => None,
        };
        if parsed.is_none() {
            let msg = format!("The selected {} is invalid.", label(field));
            self.fail(field, msg);
        }
        parsed
    }

    /// Require `value` to be strictly after `bound`
    pub fn after<T: PartialOrd>(&mut self, field: &str, value: Option<&T>, bound: Option<&T>, bound_label: &str) {
        if let (Some(value), Some(bound)) = (value, bound)
            && value <= bound
        {
            let msg = format!("The {} must be a date after {}.", label(field), bound_label);
            self.fail(field, msg);
        }
    }

    /// Require `value` to be on or after `bound`
    pub fn after_or_equal<T: PartialOrd>(
        &mut self,
        field: &str,
        value: Option<&T>,
        bound: Option<&T>,
        bound_label: &str,
    ) {
        if let (Some(value), Some(bound)) = (value, bound)
            && value < bound
        {
            let msg = format!(
                "The {} must be a date after or equal to {}.",
                label(field),
                bound_label
            );
            self.fail(field, msg);
        }
    }

    /// Fail with every collected message, or succeed when there are none.
    pub fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            return Ok(());
        }

        let total: usize = self.errors.values().map(Vec::len).sum();
        let first = self
            .errors
            .values()
            .flatten()
            .next()
            .cloned()
            .unwrap_or_default();
        let message = match total {
            1 => first,
            2 => format!("{first} (and 1 more error)"),
            n => format!("{first} (and {} more errors)", n - 1),
        };

        Err(RahatiError::Validation {
            message,
            errors: self.errors,
        })
    }

    fn temporal<T>(
        &mut self,
        field: &str,
        presence: Presence,
        parse: fn(&str) -> Option<T>,
        complaint: &str,
    ) -> Option<T> {
        let parsed = match self.value(field, presence)? {
            Value::String(s) => parse(s),
            _ => None,
        };
        if parsed.is_none() {
            let msg = format!("The {} {}.", label(field), complaint);
            self.fail(field, msg);
        }
        parsed
    }

    fn in_range<T: PartialOrd + std::fmt::Display>(
        &mut self,
        field: &str,
        n: T,
        min: Option<T>,
        max: Option<T>,
    ) -> bool {
        let msg = match (min, max) {
            (Some(lo), Some(hi)) if n < lo || n > hi => {
                format!("The {} must be between {} and {}.", label(field), lo, hi)
            }
            (Some(lo), None) if n < lo => format!("The {} must be at least {}.", label(field), lo),
            (None, Some(hi)) if n > hi => {
                format!("The {} must not be greater than {}.", label(field), hi)
            }
            _ => return true,
        };
        self.fail(field, msg);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AppointmentStatus;
    use serde_json::json;

    fn field_errors(result: Result<()>) -> FieldErrors {
        match result {
            Err(RahatiError::Validation { errors, .. }) => errors,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_collects_every_failure() {
        let body = json!({"name": 12, "rating": 9});
        let mut v = Validator::new(&body);
        v.string("name", Presence::Required, 255);
        v.email("email", Presence::Required);
        v.integer("rating", Presence::Required, Some(1), Some(5));

        let errors = field_errors(v.finish());
        assert_eq!(errors.len(), 3);
        assert_eq!(errors["email"], vec!["The email field is required."]);
        assert_eq!(errors["rating"], vec!["The rating must be between 1 and 5."]);
    }

    #[test]
    fn test_summary_message_counts_extra_errors() {
        let body = json!({});
        let mut v = Validator::new(&body);
        v.string("name", Presence::Required, 255);
        v.string("title", Presence::Required, 255);
        v.string("message", Presence::Required, 255);
        match v.finish() {
            Err(RahatiError::Validation { message, .. }) => {
                assert_eq!(message, "The message field is required. (and 2 more errors)")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_presence_modes() {
        let body = json!({"notes": null, "diagnosis": null});
        let mut v = Validator::new(&body);
        assert_eq!(v.text("notes", Presence::Nullable), None);
        assert_eq!(v.text("absent", Presence::Sometimes), None);
        assert!(v.is_valid("notes"));
        assert!(v.is_valid("absent"));

        v.text("diagnosis", Presence::Sometimes);
        let errors = field_errors(v.finish());
        assert!(errors.contains_key("diagnosis"));
    }

    #[test]
    fn test_typed_accessors() {
        let body = json!({
            "amount": "120.50",
            "price": 30,
            "is_public": "1",
            "latitude": 45.5,
            "status": "no-show",
            "check_in_date": "2030-06-01",
            "start_time": "09:00:00",
            "data": {"appointment_id": 1}
        });
        let mut v = Validator::new(&body);
        assert_eq!(
            v.decimal("amount", Presence::Required, Some(Decimal::ZERO)).map(|d| d.to_string()),
            Some("120.50".to_string())
        );
        assert_eq!(v.decimal("price", Presence::Required, None), Some(Decimal::from(30)));
        assert_eq!(v.boolean("is_public", Presence::Required), Some(true));
        assert_eq!(v.number("latitude", Presence::Required, Some(-90.0), Some(90.0)), Some(45.5));
        assert_eq!(
            v.one_of("status", Presence::Required, AppointmentStatus::parse),
            Some(AppointmentStatus::NoShow)
        );
        assert!(v.date("check_in_date", Presence::Required).is_some());
        assert!(v.time("start_time", Presence::Required).is_some());
        assert!(v.object("data", Presence::Required).is_some());
        assert!(v.finish().is_ok());
    }

    #[test]
    fn test_ordering_rules() {
        let body = json!({});
        let mut v = Validator::new(&body);
        let today = formats::parse_date("2030-06-01").unwrap();
        let earlier = formats::parse_date("2030-05-31").unwrap();
        v.after("check_out_date", Some(&today), Some(&today), "check in date");
        v.after_or_equal("check_in_date", Some(&earlier), Some(&today), "today");
        v.after("end_time", None, Some(&today), "start time");

        let errors = field_errors(v.finish());
        assert_eq!(
            errors["check_out_date"],
            vec!["The check out date must be a date after check in date."]
        );
        assert_eq!(
            errors["check_in_date"],
            vec!["The check in date must be a date after or equal to today."]
        );
        assert!(!errors.contains_key("end_time"));
    }

    #[test]
    fn test_exists_and_string_length() {
        let body = json!({"room_number": "A-1000000"});
        let mut v = Validator::new(&body);
        v.string("room_number", Presence::Required, 5);
        v.exists("room_id", false);
        let errors = field_errors(v.finish());
        assert_eq!(errors["room_id"], vec!["The selected room id is invalid."]);
        assert_eq!(
            errors["room_number"],
            vec!["The room number must not be greater than 5 characters."]
        );
    }
}
