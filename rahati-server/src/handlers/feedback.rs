//! Patient feedback on completed appointments.
//!
//! Anonymous feedback keeps its author on record, but the author is only
//! shown to themselves and to staff.

use axum::{
    extract::{Path, Request, State},
    response::{Json, Response},
    Extension,
};
use rahati_core::model::{self, AppointmentStatus, Feedback};
use rahati_core::policy::{self, authorize, authorize_or, Kind};
use rahati_core::{Action, Actor, Presence, RahatiError, Relation, Validator};
use rahati_store::repo::{appointments, centers, feedback, users};
use rusqlite::Connection;
use serde_json::Value;
use std::sync::Arc;

use super::{appointment_relations, created, embed, extract_body, found, message, related, QueryParams};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

fn reveals_author(actor: &Actor, entry: &Feedback) -> bool {
    !entry.is_anonymous || entry.user_id == actor.id || actor.is_staff()
}

fn view(conn: &Connection, actor: &Actor, entry: &Feedback) -> rahati_core::Result<Value> {
    let appointment = match appointments::get(conn, entry.appointment_id)? {
        Some(appt) => {
            let provider = match appt.provider_id {
                Some(id) => users::get(conn, id)?,
                None => None,
            };
            let center = centers::get(conn, appt.center_id)?;
            embed(
                &appt,
                vec![
                    ("provider", related(provider.as_ref())?),
                    ("center", related(center.as_ref())?),
                ],
            )?
        }
        None => Value::Null,
    };

    if reveals_author(actor, entry) {
        let author = users::get(conn, entry.user_id)?;
        embed(
            entry,
            vec![("user", related(author.as_ref())?), ("appointment", appointment)],
        )
    } else {
        embed(
            entry,
            vec![
                ("user_id", Value::Null),
                ("user", Value::Null),
                ("appointment", appointment),
            ],
        )
    }
}

/// Relations the caller holds towards a feedback entry
fn relations(conn: &Connection, actor: &Actor, entry: &Feedback) -> rahati_core::Result<Vec<Relation>> {
    let mut held = Vec::new();
    if entry.user_id == actor.id {
        held.push(Relation::Author);
    }
    if entry.is_public {
        held.push(Relation::Public);
    }
    if let Some(appt) = appointments::get(conn, entry.appointment_id)? {
        held.extend(appointment_relations(actor, &appt));
    }
    Ok(held)
}

/// GET /api/feedback
pub async fn index(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    params: QueryParams,
) -> ApiResult<Json<Vec<Value>>> {
    let actor = auth.actor();
    let scope = policy::list_scope(Kind::Feedback, &actor)?;
    let filter = feedback::FeedbackFilter {
        appointment_id: params.int("appointment_id")?,
        rating: params.int("rating")?,
        is_public: params.bool("is_public")?,
    };

    let list = state.store.read(|conn| -> rahati_core::Result<_> {
        feedback::list(conn, scope, &filter)?
            .iter()
            .map(|entry| view(conn, &actor, entry))
            .collect()
    })?;
    Ok(Json(list))
}

/// POST /api/feedback
pub async fn store(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    request: Request,
) -> ApiResult<Response> {
    let actor = auth.actor();
    let body = extract_body(request).await?;

    let (entry, body) = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut v = Validator::new(&body);
        let appointment_id = v.integer("appointment_id", Presence::Required, None, None);
        let rating = v.integer("rating", Presence::Required, Some(1), Some(5));
        let comments = v.text("comments", Presence::Nullable);
        let is_anonymous = v.boolean("is_anonymous", Presence::Sometimes);
        let is_public = v.boolean("is_public", Presence::Sometimes);
        if let Some(id) = appointment_id {
            v.exists("appointment_id", appointments::get(conn, id)?.is_some());
        }
        v.finish()?;

        let appointment_id = appointment_id.unwrap_or_default();
        let appointment = found(appointments::get(conn, appointment_id)?, "Appointment", appointment_id)?;
        // Only the patient of the appointment may review it, whatever their role
        let held: &[Relation] = if appointment.patient_id == actor.id {
            &[Relation::OwnsAppointment]
        } else {
            &[]
        };
        authorize_or(
            Kind::Feedback,
            Action::Create,
            &actor,
            held,
            "Unauthorized to provide feedback for this appointment",
        )?;
        if appointment.status != AppointmentStatus::Completed {
            return Err(RahatiError::rejected(
                "Cannot provide feedback for an appointment that is not completed",
            ));
        }
        if feedback::exists_for(conn, appointment_id, actor.id)? {
            return Err(RahatiError::rejected("Feedback already exists for this appointment"));
        }

        let now = model::now();
        let entry = feedback::insert(
            conn,
            &Feedback {
                id: 0,
                user_id: actor.id,
                appointment_id,
                rating: rating.unwrap_or(1),
                comments,
                is_anonymous: is_anonymous.unwrap_or(false),
                is_public: is_public.unwrap_or(true),
                created_at: now,
                updated_at: now,
            },
        )?;
        let body = view(conn, &actor, &entry)?;
        Ok((entry, body))
    })?;

    tracing::info!(
        feedback_id = entry.id,
        appointment_id = entry.appointment_id,
        rating = entry.rating,
        "Feedback submitted"
    );
    created(entry.id, &body)
}

/// GET /api/feedback/{id}
pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    let body = state.store.read(|conn| -> rahati_core::Result<_> {
        let entry = found(feedback::get(conn, id)?, "Feedback", id)?;
        authorize(Kind::Feedback, Action::View, &actor, &relations(conn, &actor, &entry)?)?;
        view(conn, &actor, &entry)
    })?;
    Ok(Json(body))
}

/// PUT|PATCH /api/feedback/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    request: Request,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    let body = extract_body(request).await?;

    let body = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut entry = found(feedback::get(conn, id)?, "Feedback", id)?;
        authorize(Kind::Feedback, Action::Update, &actor, &relations(conn, &actor, &entry)?)?;

        let mut v = Validator::new(&body);
        let rating = v.integer("rating", Presence::Sometimes, Some(1), Some(5));
        let comments = v.text("comments", Presence::Nullable);
        let is_anonymous = v.boolean("is_anonymous", Presence::Sometimes);
        let is_public = v.boolean("is_public", Presence::Sometimes);
        v.finish()?;

        entry.rating = rating.unwrap_or(entry.rating);
        if body.get("comments").is_some() {
            entry.comments = comments;
        }
        entry.is_anonymous = is_anonymous.unwrap_or(entry.is_anonymous);
        entry.is_public = is_public.unwrap_or(entry.is_public);
        entry.updated_at = model::now();

        feedback::update(conn, &entry)?;
        view(conn, &actor, &entry)
    })?;

    Ok(Json(body))
}

/// DELETE /api/feedback/{id}
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();

    state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let entry = found(feedback::get(conn, id)?, "Feedback", id)?;
        authorize(Kind::Feedback, Action::Delete, &actor, &relations(conn, &actor, &entry)?)?;
        feedback::delete(conn, id)?;
        Ok(())
    })?;

    tracing::info!(feedback_id = id, "Feedback deleted");
    Ok(message("Feedback deleted successfully"))
}
