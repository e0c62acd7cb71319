use axum::{
    extract::{Path, Request, State},
    response::{Json, Response},
    Extension,
};
use rahati_core::model::{self, Center};
use rahati_core::policy::{self, authorize, authorize_or, Kind};
use rahati_core::{Action, Presence, Relation, Validator};
use rahati_store::repo::{centers, rooms};
use serde_json::Value;
use std::sync::Arc;

use super::{created, embed, extract_body, found, jurisdiction, message, to_json};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

struct CenterInput {
    name: Option<String>,
    description: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    website: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    is_active: Option<bool>,
}

/// On create, name, address and phone are mandatory
fn validate(body: &Value, required: bool) -> rahati_core::Result<CenterInput> {
    let core = if required { Presence::Required } else { Presence::Sometimes };
    let mut v = Validator::new(body);
    let input = CenterInput {
        name: v.string("name", core, 255),
        description: v.text("description", Presence::Nullable),
        address: v.text("address", core),
        phone: v.string("phone", core, 20),
        email: v.email("email", Presence::Nullable),
        website: v.url("website", Presence::Nullable),
        latitude: v.number("latitude", Presence::Nullable, Some(-90.0), Some(90.0)),
        longitude: v.number("longitude", Presence::Nullable, Some(-180.0), Some(180.0)),
        is_active: v.boolean("is_active", Presence::Nullable),
    };
    v.finish()?;
    Ok(input)
}

/// GET /api/centers
pub async fn index(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Center>>> {
    let scope = policy::list_scope(Kind::Center, &auth.actor())?;
    let list = state.store.read(|conn| centers::list(conn, scope))?;
    Ok(Json(list))
}

/// POST /api/centers
pub async fn store(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    request: Request,
) -> ApiResult<Response> {
    authorize(Kind::Center, Action::Create, &auth.actor(), &[])?;
    let body = extract_body(request).await?;
    let input = validate(&body, true)?;

    let now = model::now();
    let center = Center {
        id: 0,
        name: input.name.unwrap_or_default(),
        description: input.description,
        address: input.address.unwrap_or_default(),
        phone: input.phone.unwrap_or_default(),
        email: input.email,
        website: input.website,
        latitude: input.latitude,
        longitude: input.longitude,
        is_active: input.is_active.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };
    let center = state.store.read(|conn| centers::insert(conn, &center))?;

    tracing::info!(center_id = center.id, "Center created");
    created(center.id, &center)
}

/// GET /api/centers/{id}, with its rooms
pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    let body = state.store.read(|conn| -> rahati_core::Result<_> {
        let center = found(centers::get(conn, id)?, "Center", id)?;
        authorize_or(
            Kind::Center,
            Action::View,
            &actor,
            jurisdiction(&actor, center.id),
            "Unauthorized to view this center",
        )?;
        let filter = rooms::RoomFilter {
            center_id: Some(center.id),
            ..Default::default()
        };
        let center_rooms = rooms::list(conn, &filter)?;
        embed(&center, vec![("rooms", to_json(&center_rooms)?)])
    })?;
    Ok(Json(body))
}

/// PUT|PATCH /api/centers/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    request: Request,
) -> ApiResult<Json<Center>> {
    let actor = auth.actor();
    authorize(Kind::Center, Action::Update, &actor, &[Relation::SameCenter])?;
    let body = extract_body(request).await?;

    let center = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut center = found(centers::get(conn, id)?, "Center", id)?;
        authorize_or(
            Kind::Center,
            Action::Update,
            &actor,
            jurisdiction(&actor, center.id),
            "Unauthorized to update this center",
        )?;
        let input = validate(&body, false)?;

        if let Some(name) = input.name {
            center.name = name;
        }
        if let Some(address) = input.address {
            center.address = address;
        }
        if let Some(phone) = input.phone {
            center.phone = phone;
        }
        if body.get("description").is_some() {
            center.description = input.description;
        }
        if body.get("email").is_some() {
            center.email = input.email;
        }
        if body.get("website").is_some() {
            center.website = input.website;
        }
        if body.get("latitude").is_some() {
            center.latitude = input.latitude;
        }
        if body.get("longitude").is_some() {
            center.longitude = input.longitude;
        }
        if let Some(active) = input.is_active {
            center.is_active = active;
        }
        center.updated_at = model::now();

        centers::update(conn, &center)?;
        Ok(center)
    })?;

    Ok(Json(center))
}

/// DELETE /api/centers/{id}
///
/// A center still referenced by appointments or rooms is deactivated
/// instead of removed.
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    authorize(Kind::Center, Action::Delete, &actor, &[Relation::SameCenter])?;

    let deactivated = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut center = found(centers::get(conn, id)?, "Center", id)?;
        authorize_or(
            Kind::Center,
            Action::Delete,
            &actor,
            jurisdiction(&actor, center.id),
            "Unauthorized to delete this center",
        )?;

        if centers::has_dependents(conn, id)? {
            center.is_active = false;
            center.updated_at = model::now();
            centers::update(conn, &center)?;
            Ok(true)
        } else {
            centers::delete(conn, id)?;
            Ok(false)
        }
    })?;

    if deactivated {
        tracing::info!(center_id = id, "Center deactivated");
        Ok(message("Center deactivated successfully"))
    } else {
        tracing::info!(center_id = id, "Center deleted");
        Ok(message("Center deleted successfully"))
    }
}
