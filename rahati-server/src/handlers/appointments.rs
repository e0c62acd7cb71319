//! Appointment booking. Creating or moving an appointment passes through
//! capacity admission inside the same transaction that writes it.

use axum::{
    extract::{Path, Request, State},
    response::{Json, Response},
    Extension,
};
use chrono::{NaiveDateTime, NaiveTime};
use rahati_core::booking;
use rahati_core::model::{self, Appointment, AppointmentStatus, Role, APPOINTMENT_SERVICE};
use rahati_core::model::appointment::MIN_DURATION_MINUTES;
use rahati_core::policy::{self, authorize_or, Kind};
use rahati_core::validation::formats;
use rahati_core::{Action, Actor, Presence, RahatiError, Relation, Validator};
use rahati_store::repo::{accommodations, appointments, centers, consultations, payments, service_capacities, users};
use rusqlite::Connection;
use serde_json::Value;
use std::sync::Arc;

use super::{appointment_relations, created, embed, extract_body, found, jurisdiction, message, related, QueryParams};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

const NOT_A_PROVIDER: &str = "Selected user is not a provider";

/// Denial message for `verb` on an appointment
fn denial(actor: &Actor, verb: &str) -> String {
    if actor.role == Role::Admin {
        format!("Unauthorized to {verb} this appointment")
    } else {
        "Unauthorized".to_string()
    }
}

/// Appointment with its patient, provider and center attached
pub(crate) fn with_parties(conn: &Connection, appt: &Appointment) -> rahati_core::Result<Vec<(&'static str, Value)>> {
    let patient = users::get(conn, appt.patient_id)?;
    let provider = match appt.provider_id {
        Some(id) => users::get(conn, id)?,
        None => None,
    };
    let center = centers::get(conn, appt.center_id)?;
    Ok(vec![
        ("patient", related(patient.as_ref())?),
        ("provider", related(provider.as_ref())?),
        ("center", related(center.as_ref())?),
    ])
}

/// An appointment by id, serialized with its parties, for records that hang
/// off it
pub(crate) fn appointment_view(conn: &Connection, id: i64) -> rahati_core::Result<Value> {
    match appointments::get(conn, id)? {
        Some(appt) => embed(&appt, with_parties(conn, &appt)?),
        None => Ok(Value::Null),
    }
}

/// Check that a new or moved appointment fits under the center's capacity
/// rules. `exclude_id` is the appointment being moved.
fn admit(conn: &Connection, center_id: i64, at: NaiveDateTime, exclude_id: Option<i64>) -> rahati_core::Result<()> {
    let rules = service_capacities::for_day(conn, center_id, APPOINTMENT_SERVICE, at.date())?;
    let Some(rule) = booking::governing_rule(&rules, at) else {
        return Ok(());
    };
    let booked = appointments::count_active(conn, center_id, at.date(), rule.window(), exclude_id)?;
    booking::admit(rule, booked)
}

fn ensure_provider(conn: &Connection, provider_id: Option<i64>) -> rahati_core::Result<()> {
    if let Some(id) = provider_id {
        let provider = found(users::get(conn, id)?, "User", id)?;
        if !provider.is_provider() {
            return Err(RahatiError::rejected(NOT_A_PROVIDER));
        }
    }
    Ok(())
}

/// GET /api/appointments
pub async fn index(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    params: QueryParams,
) -> ApiResult<Json<Vec<Value>>> {
    let actor = auth.actor();
    let scope = policy::list_scope(Kind::Appointment, &actor)?;

    let center_id = params.int("center_id")?;
    if let Some(center) = center_id
        && !actor.covers_center(center)
    {
        return Err(RahatiError::forbidden("Unauthorized to view appointments for this center").into());
    }

    // A bare end date includes the whole day
    let start = params.datetime("start_date")?;
    let end = params.datetime("end_date")?.map(|end| {
        match params.text("end_date").as_deref().and_then(formats::parse_date) {
            Some(day) => day.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)),
            None => end,
        }
    });

    let filter = appointments::AppointmentFilter {
        center_id,
        between: start.zip(end),
        status: params.one_of("status", AppointmentStatus::parse)?,
    };

    let list = state.store.read(|conn| -> rahati_core::Result<_> {
        appointments::list(conn, scope, &filter)?
            .iter()
            .map(|appt| embed(appt, with_parties(conn, appt)?))
            .collect()
    })?;
    Ok(Json(list))
}

/// POST /api/appointments
pub async fn store(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    request: Request,
) -> ApiResult<Response> {
    let actor = auth.actor();
    let body = extract_body(request).await?;
    let now = model::now();

    let (appt, parties) = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut v = Validator::new(&body);
        let patient_id = v.integer("patient_id", Presence::Required, None, None);
        let center_id = v.integer("center_id", Presence::Required, None, None);
        let provider_id = v.integer("provider_id", Presence::Nullable, None, None);
        let at = v.datetime("appointment_datetime", Presence::Required);
        let duration = v.integer("appointment_duration", Presence::Required, Some(MIN_DURATION_MINUTES), None);
        let notes = v.text("notes", Presence::Nullable);

        v.after("appointment_datetime", at.as_ref(), Some(&now), "now");
        if let Some(id) = patient_id {
            v.exists("patient_id", users::get(conn, id)?.is_some());
        }
        if let Some(id) = center_id {
            v.exists("center_id", centers::get(conn, id)?.is_some());
        }
        if let Some(id) = provider_id {
            v.exists("provider_id", users::get(conn, id)?.is_some());
        }
        v.finish()?;
        let (patient_id, center_id, at) = (patient_id.unwrap_or_default(), center_id.unwrap_or_default(), at.unwrap_or(now));

        if actor.is_staff() {
            authorize_or(
                Kind::Appointment,
                Action::Create,
                &actor,
                jurisdiction(&actor, center_id),
                "Unauthorized to book for this center",
            )?;
        } else {
            let held: &[Relation] = if patient_id == actor.id { &[Relation::Itself] } else { &[] };
            authorize_or(
                Kind::Appointment,
                Action::Create,
                &actor,
                held,
                "Unauthorized to book for another patient",
            )?;
        }

        ensure_provider(conn, provider_id)?;
        let center = found(centers::get(conn, center_id)?, "Center", center_id)?;
        if !center.is_active {
            return Err(RahatiError::rejected("Selected center is not active"));
        }
        admit(conn, center_id, at, None)?;

        let appt = appointments::insert(
            conn,
            &Appointment {
                id: 0,
                patient_id,
                center_id,
                provider_id,
                appointment_datetime: at,
                appointment_duration: duration.unwrap_or(MIN_DURATION_MINUTES),
                status: AppointmentStatus::Scheduled,
                notes,
                created_at: now,
                updated_at: now,
            },
        )?;
        let parties = with_parties(conn, &appt)?;
        Ok((appt, parties))
    })?;

    tracing::info!(
        appointment_id = appt.id,
        center_id = appt.center_id,
        patient_id = appt.patient_id,
        "Appointment booked"
    );
    created(appt.id, &embed(&appt, parties)?)
}

/// GET /api/appointments/{id}
pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    let body = state.store.read(|conn| -> rahati_core::Result<_> {
        let appt = found(appointments::get(conn, id)?, "Appointment", id)?;
        authorize_or(
            Kind::Appointment,
            Action::View,
            &actor,
            &appointment_relations(&actor, &appt),
            &denial(&actor, "view"),
        )?;

        let mut relations = with_parties(conn, &appt)?;
        relations.push(("consultation", related(consultations::for_appointment(conn, id)?.as_ref())?));
        relations.push(("payment", related(payments::for_appointment(conn, id)?.as_ref())?));
        relations.push(("accommodation", related(accommodations::for_appointment(conn, id)?.as_ref())?));
        embed(&appt, relations)
    })?;
    Ok(Json(body))
}

/// PUT|PATCH /api/appointments/{id}
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
        let mut appt = found(appointments::get(conn, id)?, "Appointment", id)?;
        authorize_or(
            Kind::Appointment,
            Action::Update,
            &actor,
            &appointment_relations(&actor, &appt),
            &denial(&actor, "update"),
        )?;

        let mut v = Validator::new(&body);
        let provider_id = v.integer("provider_id", Presence::Nullable, None, None);
        let at = v.datetime("appointment_datetime", Presence::Sometimes);
        let duration = v.integer("appointment_duration", Presence::Sometimes, Some(MIN_DURATION_MINUTES), None);
        let status = v.one_of("status", Presence::Sometimes, AppointmentStatus::parse);
        let notes = v.text("notes", Presence::Nullable);

        v.after("appointment_datetime", at.as_ref(), Some(&now), "now");
        if let Some(provider) = provider_id {
            v.exists("provider_id", users::get(conn, provider)?.is_some());
        }
        let provider_sent = v.has("provider_id");
        v.finish()?;

        if provider_sent {
            authorize_or(
                Kind::Appointment,
                Action::ChangeProvider,
                &actor,
                &[],
                "Unauthorized to change provider",
            )?;
            ensure_provider(conn, provider_id)?;
            appt.provider_id = provider_id;
        }

        let reactivated = appt.status == AppointmentStatus::Cancelled
            && status.is_some_and(|s| s != AppointmentStatus::Cancelled);
        let moved = at.is_some_and(|at| at != appt.appointment_datetime);
        if let Some(at) = at {
            appt.appointment_datetime = at;
        }
        if let Some(duration) = duration {
            appt.appointment_duration = duration;
        }
        if let Some(status) = status {
            appt.status = status;
        }
        if body.get("notes").is_some() {
            appt.notes = notes;
        }

        if (moved || reactivated) && appt.status != AppointmentStatus::Cancelled {
            admit(conn, appt.center_id, appt.appointment_datetime, Some(appt.id))?;
        }

        appt.updated_at = now;
        appointments::update(conn, &appt)?;
        embed(&appt, with_parties(conn, &appt)?)
    })?;

    Ok(Json(body))
}

/// DELETE /api/appointments/{id}
///
/// An appointment with a consultation, payment or accommodation is
/// cancelled rather than deleted.
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();

    let cancelled = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let appt = found(appointments::get(conn, id)?, "Appointment", id)?;
        authorize_or(
            Kind::Appointment,
            Action::Delete,
            &actor,
            &appointment_relations(&actor, &appt),
            &denial(&actor, "delete"),
        )?;

        if appointments::has_dependents(conn, id)? {
            appointments::set_status(conn, id, AppointmentStatus::Cancelled, model::now())?;
            Ok(true)
        } else {
            appointments::delete(conn, id)?;
            Ok(false)
        }
    })?;

    if cancelled {
        tracing::info!(appointment_id = id, "Appointment cancelled");
        Ok(message("Appointment cancelled successfully"))
    } else {
        tracing::info!(appointment_id = id, "Appointment deleted");
        Ok(message("Appointment deleted successfully"))
    }
}
