//! Account management and the provider patient views.

use axum::{
    extract::{Path, Request, State},
    response::{Json, Response},
    Extension,
};
use chrono::NaiveDateTime;
use rahati_core::model::{self, Role, User};
use rahati_core::password::{hash_password, MIN_PASSWORD_LENGTH};
use rahati_core::policy::{self, authorize, authorize_or, Kind, PROVIDER_EDITABLE_PATIENT_FIELDS};
use rahati_core::{Action, Actor, Presence, RahatiError, Relation, Validator};
use rahati_store::repo::{appointments, centers, consultations, users};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{created, extract_body, found, message, to_json};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

const ONLY_PROVIDERS: &str = "Unauthorized. Only providers can access this endpoint";
const NOT_YOUR_PATIENT: &str = "Unauthorized. This patient is not assigned to you.";
const HAS_HISTORY: &str = "Cannot delete a user with appointment, transportation or feedback history";

fn check_password(v: &mut Validator<'_>, password: Option<&String>) {
    if let Some(password) = password {
        let msg = format!("The password must be at least {MIN_PASSWORD_LENGTH} characters.");
        v.check(password.chars().count() >= MIN_PASSWORD_LENGTH, "password", msg);
    }
}

/// Validate the body of a new account. Role defaults to Patient; the
/// requested center is kept for the caller to authorize.
pub(crate) fn validate_new_account(conn: &Connection, body: &Value, now: NaiveDateTime) -> rahati_core::Result<User> {
    let mut v = Validator::new(body);
    let name = v.string("name", Presence::Required, 255);
    let email = v.email("email", Presence::Required);
    let password = v.text("password", Presence::Required);
    let role = v.one_of("role", Presence::Sometimes, Role::parse);
    let phone = v.string("phone", Presence::Sometimes, 20);
    let address = v.text("address", Presence::Sometimes);
    let caregiver_name = v.string("caregiver_name", Presence::Sometimes, 255);
    let caregiver_phone = v.string("caregiver_phone", Presence::Sometimes, 20);
    let center_id = v.integer("center_id", Presence::Sometimes, None, None);

    check_password(&mut v, password.as_ref());
    if let Some(email) = &email {
        v.check(!users::email_taken(conn, email, None)?, "email", "The email has already been taken.");
    }
    if let Some(id) = center_id {
        v.exists("center_id", centers::get(conn, id)?.is_some());
    }
    v.finish()?;

    Ok(User {
        id: 0,
        name: name.unwrap_or_default(),
        email: email.unwrap_or_default(),
        password_hash: hash_password(&password.unwrap_or_default()),
        role: role.unwrap_or(Role::Patient),
        phone,
        address,
        caregiver_name,
        caregiver_phone,
        center_id,
        created_at: now,
        updated_at: now,
    })
}

/// Admins must name a center; nobody else keeps one.
pub(crate) fn require_admin_center(user: &mut User) -> rahati_core::Result<()> {
    match user.role {
        Role::Admin if user.center_id.is_none() => Err(RahatiError::invalid_field(
            "center_id",
            "Center ID is required for Admin users",
        )),
        Role::Admin => Ok(()),
        _ => {
            user.center_id = None;
            Ok(())
        }
    }
}

/// A center admin may only bind accounts to their own center
pub(crate) fn ensure_center_assignable(actor: &Actor, center_id: Option<i64>) -> rahati_core::Result<()> {
    let Some(center_id) = center_id else {
        return Ok(());
    };
    let held: &[Relation] = if actor.covers_center(center_id) {
        &[Relation::SameCenter]
    } else {
        &[]
    };
    authorize_or(
        Kind::User,
        Action::AssignCenter,
        actor,
        held,
        "Unauthorized to assign users to other centers",
    )
}

/// Relations the caller holds towards `target`
fn relations(conn: &Connection, actor: &Actor, target: &User) -> rahati_core::Result<Vec<Relation>> {
    let mut held = Vec::new();
    if actor.id == target.id {
        held.push(Relation::Itself);
    }
    if actor.role == Role::Provider && target.is_patient() && users::treats_patient(conn, actor.id, target.id)? {
        held.push(Relation::TreatsPatient);
    }
    Ok(held)
}

/// GET /api/users
pub async fn index(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<User>>> {
    let scope = policy::list_scope(Kind::User, &auth.actor())?;
    let list = state.store.read(|conn| users::list(conn, scope))?;
    Ok(Json(list))
}

/// POST /api/users
pub async fn store(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    request: Request,
) -> ApiResult<Response> {
    let actor = auth.actor();
    let body = extract_body(request).await?;
    let now = model::now();

    let user = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut user = validate_new_account(conn, &body, now)?;

        if user.role != Role::Patient {
            authorize(Kind::User, Action::CreatePrivileged, &actor, &[])?;
        }
        if user.role == Role::Superuser {
            authorize_or(
                Kind::User,
                Action::CreateSuperuser,
                &actor,
                &[],
                "Unauthorized to create superuser accounts",
            )?;
        }
        require_admin_center(&mut user)?;
        ensure_center_assignable(&actor, user.center_id)?;

        Ok(users::insert(conn, &user)?)
    })?;

    tracing::info!(user_id = user.id, role = %user.role, created_by = actor.id, "User created");
    created(user.id, &user)
}

/// GET /api/users/{id}
pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<User>> {
    let actor = auth.actor();
    let user = state.store.read(|conn| -> rahati_core::Result<_> {
        let user = found(users::get(conn, id)?, "User", id)?;
        let held = relations(conn, &actor, &user)?;
        authorize(Kind::User, Action::View, &actor, &held)?;
        Ok(user)
    })?;
    Ok(Json(user))
}

/// PUT|PATCH /api/users/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    request: Request,
) -> ApiResult<Json<User>> {
    let actor = auth.actor();
    let body = extract_body(request).await?;
    let now = model::now();

    let user = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut user = found(users::get(conn, id)?, "User", id)?;
        let held = relations(conn, &actor, &user)?;
        let denial = if actor.role == Role::Provider && user.is_patient() {
            NOT_YOUR_PATIENT
        } else {
            "Unauthorized"
        };
        authorize_or(Kind::User, Action::Update, &actor, &held, denial)?;

        // A provider editing a patient's record is limited to contact details
        if !held.contains(&Relation::Itself)
            && held.contains(&Relation::TreatsPatient)
            && let Some(fields) = body.as_object()
            && let Some(field) = fields
                .keys()
                .find(|k| !PROVIDER_EDITABLE_PATIENT_FIELDS.contains(&k.as_str()))
        {
            return Err(RahatiError::forbidden(format!(
                "Providers cannot update the '{field}' field for patients"
            )));
        }

        let mut v = Validator::new(&body);
        if v.has("role") {
            authorize_or(Kind::User, Action::ChangeRole, &actor, &[], "Unauthorized to change role")?;
        }
        let name = v.string("name", Presence::Sometimes, 255);
        let email = v.email("email", Presence::Sometimes);
        let password = v.text("password", Presence::Sometimes);
        let role = v.one_of("role", Presence::Sometimes, |s| {
            Role::parse(s).filter(|r| *r != Role::Superuser)
        });
        let phone = v.string("phone", Presence::Sometimes, 20);
        let address = v.text("address", Presence::Sometimes);
        let caregiver_name = v.string("caregiver_name", Presence::Sometimes, 255);
        let caregiver_phone = v.string("caregiver_phone", Presence::Sometimes, 20);
        let center_id = v.integer("center_id", Presence::Nullable, None, None);

        check_password(&mut v, password.as_ref());
        if let Some(email) = &email {
            v.check(!users::email_taken(conn, email, Some(id))?, "email", "The email has already been taken.");
        }
        if let Some(center) = center_id {
            v.exists("center_id", centers::get(conn, center)?.is_some());
        }
        let center_sent = v.has("center_id");
        v.finish()?;

        if center_sent {
            // Clearing the binding is as privileged as binding to another center
            let within = match center_id {
                Some(center) => actor.covers_center(center),
                None => actor.confined_center().is_none(),
            };
            let held: &[Relation] = if within { &[Relation::SameCenter] } else { &[] };
            authorize_or(
                Kind::User,
                Action::AssignCenter,
                &actor,
                held,
                "Unauthorized to assign users to other centers",
            )?;
            user.center_id = center_id;
        }
        if let Some(name) = name {
            user.name = name;
        }
        if let Some(email) = email {
            user.email = email;
        }
        if let Some(password) = password {
            user.password_hash = hash_password(&password);
        }
        if let Some(role) = role {
            user.role = role;
        }
        if body.get("phone").is_some() {
            user.phone = phone;
        }
        if body.get("address").is_some() {
            user.address = address;
        }
        if body.get("caregiver_name").is_some() {
            user.caregiver_name = caregiver_name;
        }
        if body.get("caregiver_phone").is_some() {
            user.caregiver_phone = caregiver_phone;
        }
        if user.role != Role::Admin {
            user.center_id = None;
        }
        user.updated_at = now;

        users::update(conn, &user)?;
        Ok(user)
    })?;

    tracing::info!(user_id = user.id, updated_by = actor.id, "User updated");
    Ok(Json(user))
}

/// DELETE /api/users/{id}
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    authorize(Kind::User, Action::Delete, &actor, &[])?;

    state.store.in_transaction(|conn| -> rahati_core::Result<()> {
        found(users::get(conn, id)?, "User", id)?;
        if users::has_history(conn, id)? {
            return Err(RahatiError::rejected(HAS_HISTORY));
        }
        users::delete(conn, id)?;
        Ok(())
    })?;

    tracing::info!(user_id = id, deleted_by = actor.id, "User deleted");
    Ok(message("User deleted successfully"))
}

fn require_provider(auth: &AuthUser) -> rahati_core::Result<()> {
    if auth.user.is_provider() {
        Ok(())
    } else {
        Err(RahatiError::forbidden(ONLY_PROVIDERS))
    }
}

/// GET /api/my-patients
pub async fn my_patients(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<User>>> {
    require_provider(&auth)?;
    let patients = state.store.read(|conn| users::patients_of_provider(conn, auth.id()))?;
    Ok(Json(patients))
}

/// GET /api/my-patients-detailed
///
/// The caller's patients, each with the appointments they have with the
/// caller.
pub async fn my_patients_detailed(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Value>>> {
    require_provider(&auth)?;

    let grouped = state.store.read(|conn| -> rahati_core::Result<_> {
        let mut grouped: Vec<(i64, Value, Vec<Value>)> = Vec::new();

        for appt in appointments::for_provider(conn, auth.id(), None)? {
            let center = centers::get(conn, appt.center_id)?
                .map(|c| json!({ "id": c.id, "name": c.name }))
                .unwrap_or(Value::Null);
            let summary = json!({
                "id": appt.id,
                "datetime": appt.appointment_datetime,
                "duration": appt.appointment_duration,
                "status": appt.status,
                "center": center,
                "has_consultation": consultations::for_appointment(conn, appt.id)?.is_some(),
            });

            match grouped.iter_mut().find(|(patient_id, _, _)| *patient_id == appt.patient_id) {
                Some((_, _, list)) => list.push(summary),
                None => {
                    let patient = users::get(conn, appt.patient_id)?;
                    grouped.push((appt.patient_id, to_json(&patient)?, vec![summary]));
                }
            }
        }
        Ok(grouped)
    })?;

    let body = grouped
        .into_iter()
        .map(|(_, patient, appointments)| json!({ "patient": patient, "appointments": appointments }))
        .collect();
    Ok(Json(body))
}

/// GET /api/patient-details/{id}
pub async fn patient_details(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let body = state.store.read(|conn| -> rahati_core::Result<_> {
        let patient = found(users::get(conn, id)?, "User", id)?;
        require_provider(&auth)?;
        if !patient.is_patient() {
            return Err(RahatiError::rejected("The specified user is not a patient"));
        }
        if !users::treats_patient(conn, auth.id(), patient.id)? {
            return Err(RahatiError::forbidden(NOT_YOUR_PATIENT));
        }

        let mut history = Vec::new();
        for appt in appointments::for_provider(conn, auth.id(), Some(patient.id))? {
            let center = centers::get(conn, appt.center_id)?
                .map(|c| json!({ "id": c.id, "name": c.name, "address": c.address }))
                .unwrap_or(Value::Null);
            let consultation = consultations::for_appointment(conn, appt.id)?
                .map(|c| {
                    json!({
                        "id": c.id,
                        "diagnosis": c.diagnosis,
                        "treatment_plan": c.treatment_plan,
                        "notes": c.provider_notes,
                        "created_at": c.created_at,
                    })
                })
                .unwrap_or(Value::Null);
            history.push(json!({
                "id": appt.id,
                "datetime": appt.appointment_datetime,
                "duration": appt.appointment_duration,
                "status": appt.status,
                "notes": appt.notes,
                "center": center,
                "consultation": consultation,
            }));
        }

        Ok(json!({
            "patient": {
                "id": patient.id,
                "name": patient.name,
                "email": patient.email,
                "phone": patient.phone,
                "address": patient.address,
                "caregiver_name": patient.caregiver_name,
                "caregiver_phone": patient.caregiver_phone,
            },
            "appointments": history,
        }))
    })?;

    Ok(Json(body))
}
