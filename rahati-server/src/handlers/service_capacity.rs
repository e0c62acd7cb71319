//! Per-center, per-day service capacity rules.

use axum::{
    extract::{Path, Request, State},
    response::{Json, Response},
    Extension,
};
use chrono::NaiveTime;
use rahati_core::model::{self, ServiceCapacity};
use rahati_core::policy::{authorize, Kind};
use rahati_core::{Action, Actor, Presence, RahatiError, Validator};
use rahati_store::repo::{centers, service_capacities};
use rusqlite::Connection;
use serde_json::Value;
use std::sync::Arc;

use super::{created, embed, extract_body, found, message, related, QueryParams};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

const DUPLICATE_RULE: &str = "A capacity rule already exists for this center, service type, date, and time range";

fn with_center(conn: &Connection, rule: &ServiceCapacity) -> rahati_core::Result<Value> {
    let center = centers::get(conn, rule.center_id)?;
    embed(rule, vec![("center", related(center.as_ref())?)])
}

fn ensure_manages(actor: &Actor, center_id: i64) -> rahati_core::Result<()> {
    if actor.covers_center(center_id) {
        Ok(())
    } else {
        Err(RahatiError::forbidden("Unauthorized to manage capacity for this center"))
    }
}

/// A time window needs both bounds, and must not be inverted
fn check_window(v: &mut Validator<'_>, start: Option<NaiveTime>, end: Option<NaiveTime>) {
    v.check(
        start.is_some() == end.is_some(),
        "end_time",
        "The start time and end time must be given together.",
    );
    v.after("end_time", end.as_ref(), start.as_ref(), "start time");
}

fn ensure_unique(conn: &Connection, rule: &ServiceCapacity, except_id: Option<i64>) -> rahati_core::Result<()> {
    let window = (rule.start_time, rule.end_time);
    if service_capacities::window_taken(conn, rule.center_id, &rule.service_type, rule.date, window, except_id)? {
        return Err(RahatiError::rejected(DUPLICATE_RULE));
    }
    Ok(())
}

/// GET /api/service-capacities
pub async fn index(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    params: QueryParams,
) -> ApiResult<Json<Vec<Value>>> {
    authorize(Kind::ServiceCapacity, Action::List, &auth.actor(), &[])?;
    let filter = service_capacities::CapacityFilter {
        center_id: params.int("center_id")?,
        service_type: params.text("service_type"),
        date: params.date("date")?,
        between: params.date_range()?,
        is_active: params.bool("is_active")?,
    };

    let list = state.store.read(|conn| -> rahati_core::Result<_> {
        service_capacities::list(conn, &filter)?
            .iter()
            .map(|rule| with_center(conn, rule))
            .collect()
    })?;
    Ok(Json(list))
}

/// POST /api/service-capacities
pub async fn store(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    request: Request,
) -> ApiResult<Response> {
    let actor = auth.actor();
    authorize(Kind::ServiceCapacity, Action::Create, &actor, &[])?;
    let body = extract_body(request).await?;
    let now = model::now();
    let today = now.date();

    let (rule, body) = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut v = Validator::new(&body);
        let center_id = v.integer("center_id", Presence::Required, None, None);
        let service_type = v.string("service_type", Presence::Required, 50);
        let max_capacity = v.integer("max_capacity", Presence::Required, Some(1), None);
        let date = v.date("date", Presence::Required);
        let start_time = v.time("start_time", Presence::Nullable);
        let end_time = v.time("end_time", Presence::Nullable);
        let is_active = v.boolean("is_active", Presence::Sometimes);
        let notes = v.text("notes", Presence::Nullable);
        v.after_or_equal("date", date.as_ref(), Some(&today), "today");
        check_window(&mut v, start_time, end_time);
        if let Some(id) = center_id {
            v.exists("center_id", centers::get(conn, id)?.is_some());
        }
        v.finish()?;

        let rule = ServiceCapacity {
            id: 0,
            center_id: center_id.unwrap_or_default(),
            service_type: service_type.unwrap_or_default(),
            max_capacity: max_capacity.unwrap_or(1),
            date: date.unwrap_or(today),
            start_time,
            end_time,
            is_active: is_active.unwrap_or(true),
            notes,
            created_at: now,
            updated_at: now,
        };
        ensure_manages(&actor, rule.center_id)?;
        ensure_unique(conn, &rule, None)?;

        let rule = service_capacities::insert(conn, &rule)?;
        let body = with_center(conn, &rule)?;
        Ok((rule, body))
    })?;

    tracing::info!(
        capacity_id = rule.id,
        center_id = rule.center_id,
        date = %rule.date,
        max_capacity = rule.max_capacity,
        "Capacity rule created"
    );
    created(rule.id, &body)
}

/// GET /api/service-capacities/{id}
pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    authorize(Kind::ServiceCapacity, Action::View, &auth.actor(), &[])?;
    let body = state.store.read(|conn| -> rahati_core::Result<_> {
        let rule = found(service_capacities::get(conn, id)?, "Service capacity", id)?;
        with_center(conn, &rule)
    })?;
    Ok(Json(body))
}

/// PUT|PATCH /api/service-capacities/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    request: Request,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    authorize(Kind::ServiceCapacity, Action::Update, &actor, &[])?;
    let body = extract_body(request).await?;
    let now = model::now();

    let body = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut rule = found(service_capacities::get(conn, id)?, "Service capacity", id)?;
        ensure_manages(&actor, rule.center_id)?;

        let mut v = Validator::new(&body);
        let max_capacity = v.integer("max_capacity", Presence::Sometimes, Some(1), None);
        let date = v.date("date", Presence::Sometimes);
        let start_time = v.time("start_time", Presence::Nullable);
        let end_time = v.time("end_time", Presence::Nullable);
        let is_active = v.boolean("is_active", Presence::Sometimes);
        let notes = v.text("notes", Presence::Nullable);
        v.after_or_equal("date", date.as_ref(), Some(&now.date()), "today");
        let start_sent = v.has("start_time");
        let end_sent = v.has("end_time");
        let effective_start = if start_sent { start_time } else { rule.start_time };
        let effective_end = if end_sent { end_time } else { rule.end_time };
        check_window(&mut v, effective_start, effective_end);
        v.finish()?;

        let moved = date.is_some() || start_sent || end_sent;
        rule.date = date.unwrap_or(rule.date);
        rule.start_time = effective_start;
        rule.end_time = effective_end;
        if moved {
            ensure_unique(conn, &rule, Some(rule.id))?;
        }
        rule.max_capacity = max_capacity.unwrap_or(rule.max_capacity);
        rule.is_active = is_active.unwrap_or(rule.is_active);
        if body.get("notes").is_some() {
            rule.notes = notes;
        }
        rule.updated_at = now;

        service_capacities::update(conn, &rule)?;
        with_center(conn, &rule)
    })?;

    Ok(Json(body))
}

/// DELETE /api/service-capacities/{id}
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    authorize(Kind::ServiceCapacity, Action::Delete, &actor, &[])?;

    state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let rule = found(service_capacities::get(conn, id)?, "Service capacity", id)?;
        ensure_manages(&actor, rule.center_id)?;
        service_capacities::delete(conn, id)?;
        Ok(())
    })?;

    tracing::info!(capacity_id = id, "Capacity rule deleted");
    Ok(message("Service capacity deleted successfully"))
}
