use axum::{
    extract::{Path, Request, State},
    response::{Json, Response},
    Extension,
};
use rahati_core::model::transportation::DEFAULT_TRANSPORTATION_TYPE;
use rahati_core::model::{self, TransportationRequest, TransportationStatus};
use rahati_core::policy::{self, authorize, authorize_or, Kind};
use rahati_core::{Action, Actor, Presence, RahatiError, Relation, Validator};
use rahati_store::repo::{appointments, transportation, users};
use rusqlite::Connection;
use serde_json::Value;
use std::sync::Arc;

use super::{appointment_relations, created, embed, extract_body, found, message, related, QueryParams};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

fn view(conn: &Connection, ride: &TransportationRequest) -> rahati_core::Result<Value> {
    let user = users::get(conn, ride.user_id)?;
    let appointment = match ride.appointment_id {
        Some(id) => appointments::get(conn, id)?,
        None => None,
    };
    embed(
        ride,
        vec![
            ("user", related(user.as_ref())?),
            ("appointment", related(appointment.as_ref())?),
        ],
    )
}

fn relations(actor: &Actor, ride: &TransportationRequest) -> &'static [Relation] {
    if ride.user_id == actor.id {
        &[Relation::Author]
    } else {
        &[]
    }
}

/// GET /api/transportation-requests
pub async fn index(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    params: QueryParams,
) -> ApiResult<Json<Vec<Value>>> {
    let scope = policy::list_scope(Kind::Transportation, &auth.actor())?;
    let filter = transportation::TransportationFilter {
        appointment_id: params.int("appointment_id")?,
        status: params.one_of("status", TransportationStatus::parse)?,
        date: params.date("date")?,
    };

    let list = state.store.read(|conn| -> rahati_core::Result<_> {
        transportation::list(conn, scope, &filter)?
            .iter()
            .map(|ride| view(conn, ride))
            .collect()
    })?;
    Ok(Json(list))
}

/// POST /api/transportation-requests
pub async fn store(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    request: Request,
) -> ApiResult<Response> {
    let actor = auth.actor();
    let body = extract_body(request).await?;
    let now = model::now();

    let (ride, body) = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut v = Validator::new(&body);
        let appointment_id = v.integer("appointment_id", Presence::Nullable, None, None);
        let pickup_location = v.text("pickup_location", Presence::Required);
        let dropoff_location = v.text("dropoff_location", Presence::Required);
        let pickup_time = v.datetime("pickup_time", Presence::Required);
        let transportation_type = v.string("transportation_type", Presence::Sometimes, 255);
        let passengers = v.integer("number_of_passengers", Presence::Sometimes, Some(1), None);
        let special_instructions = v.text("special_instructions", Presence::Nullable);
        v.after("pickup_time", pickup_time.as_ref(), Some(&now), "now");
        if let Some(id) = appointment_id {
            v.exists("appointment_id", appointments::get(conn, id)?.is_some());
        }
        v.finish()?;

        // Only a linked appointment needs to belong to the caller
        if let Some(id) = appointment_id {
            let appointment = found(appointments::get(conn, id)?, "Appointment", id)?;
            authorize_or(
                Kind::Transportation,
                Action::Create,
                &actor,
                &appointment_relations(&actor, &appointment),
                "Unauthorized to request transportation for this appointment",
            )?;
        }

        let ride = transportation::insert(
            conn,
            &TransportationRequest {
                id: 0,
                user_id: actor.id,
                appointment_id,
                pickup_location: pickup_location.unwrap_or_default(),
                dropoff_location: dropoff_location.unwrap_or_default(),
                pickup_time: pickup_time.unwrap_or(now),
                transportation_type: transportation_type.unwrap_or_else(|| DEFAULT_TRANSPORTATION_TYPE.to_string()),
                number_of_passengers: passengers.unwrap_or(1),
                status: TransportationStatus::Pending,
                special_instructions,
                created_at: now,
                updated_at: now,
            },
        )?;
        let body = view(conn, &ride)?;
        Ok((ride, body))
    })?;

    tracing::info!(
        transportation_id = ride.id,
        user_id = ride.user_id,
        pickup_time = %ride.pickup_time,
        "Transportation requested"
    );
    created(ride.id, &body)
}

/// GET /api/transportation-requests/{id}
pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    let body = state.store.read(|conn| -> rahati_core::Result<_> {
        let ride = found(transportation::get(conn, id)?, "Transportation request", id)?;
        authorize(Kind::Transportation, Action::View, &actor, relations(&actor, &ride))?;
        view(conn, &ride)
    })?;
    Ok(Json(body))
}

/// PUT|PATCH /api/transportation-requests/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    request: Request,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    let body = extract_body(request).await?;
    let now = model::now();

    let body = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut ride = found(transportation::get(conn, id)?, "Transportation request", id)?;
        authorize(Kind::Transportation, Action::Update, &actor, relations(&actor, &ride))?;
        if body.get("status").is_some() {
            authorize_or(
                Kind::Transportation,
                Action::ChangeStatus,
                &actor,
                &[],
                "Unauthorized to change status",
            )?;
        }

        let mut v = Validator::new(&body);
        let pickup_location = v.text("pickup_location", Presence::Sometimes);
        let dropoff_location = v.text("dropoff_location", Presence::Sometimes);
        let pickup_time = v.datetime("pickup_time", Presence::Sometimes);
        let transportation_type = v.string("transportation_type", Presence::Sometimes, 255);
        let passengers = v.integer("number_of_passengers", Presence::Sometimes, Some(1), None);
        let status = v.one_of("status", Presence::Sometimes, TransportationStatus::parse);
        let special_instructions = v.text("special_instructions", Presence::Nullable);
        v.after("pickup_time", pickup_time.as_ref(), Some(&now), "now");
        v.finish()?;

        if let Some(location) = pickup_location {
            ride.pickup_location = location;
        }
        if let Some(location) = dropoff_location {
            ride.dropoff_location = location;
        }
        ride.pickup_time = pickup_time.unwrap_or(ride.pickup_time);
        if let Some(kind) = transportation_type {
            ride.transportation_type = kind;
        }
        ride.number_of_passengers = passengers.unwrap_or(ride.number_of_passengers);
        ride.status = status.unwrap_or(ride.status);
        if body.get("special_instructions").is_some() {
            ride.special_instructions = special_instructions;
        }
        ride.updated_at = now;

        transportation::update(conn, &ride)?;
        view(conn, &ride)
    })?;

    Ok(Json(body))
}

/// DELETE /api/transportation-requests/{id}
///
/// Requests are cancelled, never removed. Confirmed and completed rides are
/// locked.
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();

    state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut ride = found(transportation::get(conn, id)?, "Transportation request", id)?;
        authorize(Kind::Transportation, Action::Delete, &actor, relations(&actor, &ride))?;
        if ride.status.is_locked() {
            return Err(RahatiError::rejected(
                "Cannot cancel a transportation request that is already confirmed or completed",
            ));
        }
        ride.status = TransportationStatus::Cancelled;
        ride.updated_at = model::now();
        transportation::update(conn, &ride)?;
        Ok(())
    })?;

    tracing::info!(transportation_id = id, "Transportation request cancelled");
    Ok(message("Transportation request cancelled successfully"))
}
