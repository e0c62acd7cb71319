pub mod accommodations;
pub mod appointments;
pub mod auth;
pub mod centers;
pub mod consultations;
pub mod feedback;
pub mod meal_options;
pub mod metadata;
pub mod notifications;
pub mod payments;
pub mod rooms;
pub mod service_capacity;
pub mod transportation;
pub mod users;

use axum::{
    extract::{FromRequestParts, Query, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{NaiveDate, NaiveDateTime};
use http_body_util::BodyExt;
use rahati_core::model::Appointment;
use rahati_core::validation::formats;
use rahati_core::{Actor, RahatiError, Relation};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::str::FromStr;

use crate::audit::AuditEntityId;
use crate::error::{ApiError, ApiResult};

/// Read the JSON object body of a request. An empty body reads as `{}`.
pub async fn extract_body(request: Request) -> ApiResult<Value> {
    let bytes = request
        .into_body()
        .collect()
        .await
        .map_err(|e| RahatiError::rejected(format!("Failed to read request body: {e}")))?
        .to_bytes();

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| RahatiError::rejected(format!("Invalid JSON body: {e}")))?;
    if !value.is_object() {
        return Err(RahatiError::rejected("Request body must be a JSON object").into());
    }
    Ok(value)
}

/// Turn a missing row into a 404
pub fn found<T>(record: Option<T>, entity: &'static str, id: i64) -> rahati_core::Result<T> {
    record.ok_or_else(|| RahatiError::not_found(entity, id))
}

/// `SameCenter` when records of `center_id` are within the caller's jurisdiction
pub fn jurisdiction(actor: &Actor, center_id: i64) -> &'static [Relation] {
    if actor.covers_center(center_id) {
        &[Relation::SameCenter]
    } else {
        &[]
    }
}

/// Relations the caller holds towards an appointment and the records hanging off it
pub fn appointment_relations(actor: &Actor, appointment: &Appointment) -> Vec<Relation> {
    let mut held = Vec::new();
    if appointment.patient_id == actor.id {
        held.push(Relation::OwnsAppointment);
    }
    if appointment.provider_id == Some(actor.id) {
        held.push(Relation::AssignedProvider);
    }
    if actor.covers_center(appointment.center_id) {
        held.push(Relation::SameCenter);
    }
    held
}

pub fn to_json<T: Serialize>(value: &T) -> rahati_core::Result<Value> {
    serde_json::to_value(value).map_err(|e| RahatiError::Storage(format!("Failed to serialize response: {e}")))
}

/// Serialize `record` with related records attached under the given keys
pub fn embed<T: Serialize>(record: &T, relations: Vec<(&str, Value)>) -> rahati_core::Result<Value> {
    let mut value = to_json(record)?;
    if let Value::Object(map) = &mut value {
        for (key, related) in relations {
            map.insert(key.to_string(), related);
        }
    }
    Ok(value)
}

/// Serialize an optional related record as the record or `null`
pub fn related<T: Serialize>(record: Option<&T>) -> rahati_core::Result<Value> {
    match record {
        Some(r) => to_json(r),
        None => Ok(Value::Null),
    }
}

/// 201 with the created record, tagged with its id for the audit trail
pub fn created<T: Serialize>(id: i64, body: &T) -> ApiResult<Response> {
    let body = to_json(body)?;
    let mut response = (StatusCode::CREATED, Json(body)).into_response();
    response.extensions_mut().insert(AuditEntityId(id));
    Ok(response)
}

pub fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

/// Query-string filters with typed accessors. An unparsable filter is a 422.
#[derive(Debug, Default, Clone)]
pub struct QueryParams(HashMap<String, String>);

impl<S: Send + Sync> FromRequestParts<S> for QueryParams {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(map) = Query::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|e| RahatiError::rejected(e.body_text()))?;
        Ok(Self(map))
    }
}

impl From<HashMap<String, String>> for QueryParams {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl QueryParams {
    /// The trimmed value, ignoring empty parameters
    pub fn text(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn typed<T>(&self, key: &str, parse: impl Fn(&str) -> Option<T>, what: &str) -> rahati_core::Result<Option<T>> {
        match self.text(key) {
            None => Ok(None),
            Some(raw) => parse(&raw).map(Some).ok_or_else(|| {
                RahatiError::invalid_field(key, format!("The {} {}.", formats::label(key), what))
            }),
        }
    }

    pub fn int(&self, key: &str) -> rahati_core::Result<Option<i64>> {
        self.typed(key, |s| s.parse().ok(), "must be an integer")
    }

    pub fn bool(&self, key: &str) -> rahati_core::Result<Option<bool>> {
        self.typed(key, formats::parse_bool, "field must be true or false")
    }

    pub fn date(&self, key: &str) -> rahati_core::Result<Option<NaiveDate>> {
        self.typed(key, formats::parse_date, "is not a valid date")
    }

    pub fn datetime(&self, key: &str) -> rahati_core::Result<Option<NaiveDateTime>> {
        self.typed(key, formats::parse_datetime, "is not a valid date")
    }

    pub fn decimal(&self, key: &str) -> rahati_core::Result<Option<Decimal>> {
        self.typed(key, |s| Decimal::from_str(s).ok(), "must be a number")
    }

    /// A value from a fixed vocabulary
    pub fn one_of<T>(&self, key: &str, parse: impl Fn(&str) -> Option<T>) -> rahati_core::Result<Option<T>> {
        match self.text(key) {
            None => Ok(None),
            Some(raw) => parse(&raw).map(Some).ok_or_else(|| {
                RahatiError::invalid_field(key, format!("The selected {} is invalid.", formats::label(key)))
            }),
        }
    }

    /// `start_date` and `end_date`, only when both are given
    pub fn date_range(&self) -> rahati_core::Result<Option<(NaiveDate, NaiveDate)>> {
        Ok(self.date("start_date")?.zip(self.date("end_date")?))
    }
}
