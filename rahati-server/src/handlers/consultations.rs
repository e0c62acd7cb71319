use axum::{
    extract::{Path, Request, State},
    response::{Json, Response},
    Extension,
};
use rahati_core::model::{self, AppointmentStatus, Consultation, ConsultationStatus};
use rahati_core::policy::{self, authorize, authorize_or, Kind};
use rahati_core::{Action, Presence, RahatiError, Validator};
use rahati_store::repo::{appointments, consultations};
use rusqlite::Connection;
use serde_json::Value;
use std::sync::Arc;

use super::appointments::appointment_view;
use super::{appointment_relations, created, embed, extract_body, found, message, QueryParams};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

fn view(conn: &Connection, consultation: &Consultation) -> rahati_core::Result<Value> {
    let appointment = appointment_view(conn, consultation.appointment_id)?;
    embed(consultation, vec![("appointment", appointment)])
}

/// A completed consultation completes its appointment
fn complete_appointment(conn: &Connection, consultation: &Consultation) -> rahati_core::Result<()> {
    if consultation.status == ConsultationStatus::Completed {
        appointments::set_status(conn, consultation.appointment_id, AppointmentStatus::Completed, model::now())?;
    }
    Ok(())
}

/// GET /api/consultations
pub async fn index(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    params: QueryParams,
) -> ApiResult<Json<Vec<Value>>> {
    let scope = policy::list_scope(Kind::Consultation, &auth.actor())?;
    let filter = consultations::ConsultationFilter {
        appointment_id: params.int("appointment_id")?,
        status: params.one_of("status", ConsultationStatus::parse)?,
    };

    let list = state.store.read(|conn| -> rahati_core::Result<_> {
        consultations::list(conn, scope, &filter)?
            .iter()
            .map(|c| view(conn, c))
            .collect()
    })?;
    Ok(Json(list))
}

/// POST /api/consultations
pub async fn store(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    request: Request,
) -> ApiResult<Response> {
    let actor = auth.actor();
    // Patients are turned away before the body is looked at
    authorize(Kind::Consultation, Action::Create, &actor, &[policy::Relation::AssignedProvider])?;
    let body = extract_body(request).await?;

    let (consultation, body) = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut v = Validator::new(&body);
        let appointment_id = v.integer("appointment_id", Presence::Required, None, None);
        let start_time = v.datetime("start_time", Presence::Required);
        let end_time = v.datetime("end_time", Presence::Nullable);
        let provider_notes = v.text("provider_notes", Presence::Nullable);
        let diagnosis = v.text("diagnosis", Presence::Nullable);
        let treatment_plan = v.text("treatment_plan", Presence::Nullable);
        let status = v.one_of("status", Presence::Sometimes, ConsultationStatus::parse);
        v.after("end_time", end_time.as_ref(), start_time.as_ref(), "start time");
        if let Some(id) = appointment_id {
            v.exists("appointment_id", appointments::get(conn, id)?.is_some());
        }
        v.finish()?;

        let appointment_id = appointment_id.unwrap_or_default();
        let appointment = found(appointments::get(conn, appointment_id)?, "Appointment", appointment_id)?;
        authorize_or(
            Kind::Consultation,
            Action::Create,
            &actor,
            &appointment_relations(&actor, &appointment),
            "Unauthorized to create consultation for this appointment",
        )?;
        if consultations::for_appointment(conn, appointment_id)?.is_some() {
            return Err(RahatiError::rejected("A consultation already exists for this appointment"));
        }

        let now = model::now();
        let consultation = consultations::insert(
            conn,
            &Consultation {
                id: 0,
                appointment_id,
                start_time: start_time.unwrap_or(now),
                end_time,
                provider_notes,
                diagnosis,
                treatment_plan,
                status: status.unwrap_or(ConsultationStatus::InProgress),
                created_at: now,
                updated_at: now,
            },
        )?;
        complete_appointment(conn, &consultation)?;
        let body = view(conn, &consultation)?;
        Ok((consultation, body))
    })?;

    tracing::info!(
        consultation_id = consultation.id,
        appointment_id = consultation.appointment_id,
        status = %consultation.status,
        "Consultation recorded"
    );
    created(consultation.id, &body)
}

/// GET /api/consultations/{id}
pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    let body = state.store.read(|conn| -> rahati_core::Result<_> {
        let consultation = found(consultations::get(conn, id)?, "Consultation", id)?;
        let appointment = found(
            appointments::get(conn, consultation.appointment_id)?,
            "Appointment",
            consultation.appointment_id,
        )?;
        authorize(
            Kind::Consultation,
            Action::View,
            &actor,
            &appointment_relations(&actor, &appointment),
        )?;
        view(conn, &consultation)
    })?;
    Ok(Json(body))
}

/// PUT|PATCH /api/consultations/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    request: Request,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    authorize(Kind::Consultation, Action::Update, &actor, &[policy::Relation::AssignedProvider])?;
    let body = extract_body(request).await?;

    let body = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut consultation = found(consultations::get(conn, id)?, "Consultation", id)?;
        let appointment = found(
            appointments::get(conn, consultation.appointment_id)?,
            "Appointment",
            consultation.appointment_id,
        )?;
        authorize_or(
            Kind::Consultation,
            Action::Update,
            &actor,
            &appointment_relations(&actor, &appointment),
            "Unauthorized to update this consultation",
        )?;

        let mut v = Validator::new(&body);
        let start_time = v.datetime("start_time", Presence::Sometimes);
        let end_time = v.datetime("end_time", Presence::Nullable);
        let provider_notes = v.text("provider_notes", Presence::Nullable);
        let diagnosis = v.text("diagnosis", Presence::Nullable);
        let treatment_plan = v.text("treatment_plan", Presence::Nullable);
        let status = v.one_of("status", Presence::Sometimes, ConsultationStatus::parse);
        let effective_start = start_time.unwrap_or(consultation.start_time);
        v.after("end_time", end_time.as_ref(), Some(&effective_start), "start time");
        v.finish()?;

        consultation.start_time = effective_start;
        if body.get("end_time").is_some() {
            consultation.end_time = end_time;
        }
        if body.get("provider_notes").is_some() {
            consultation.provider_notes = provider_notes;
        }
        if body.get("diagnosis").is_some() {
            consultation.diagnosis = diagnosis;
        }
        if body.get("treatment_plan").is_some() {
            consultation.treatment_plan = treatment_plan;
        }
        if let Some(status) = status {
            consultation.status = status;
        }
        consultation.updated_at = model::now();

        consultations::update(conn, &consultation)?;
        if status.is_some() {
            complete_appointment(conn, &consultation)?;
        }
        view(conn, &consultation)
    })?;

    Ok(Json(body))
}

/// DELETE /api/consultations/{id}
///
/// The appointment goes back to `scheduled`.
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    authorize(Kind::Consultation, Action::Delete, &auth.actor(), &[])?;

    state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let consultation = found(consultations::get(conn, id)?, "Consultation", id)?;
        appointments::set_status(conn, consultation.appointment_id, AppointmentStatus::Scheduled, model::now())?;
        consultations::delete(conn, id)?;
        Ok(())
    })?;

    tracing::info!(consultation_id = id, "Consultation deleted");
    Ok(message("Consultation deleted successfully"))
}
