use axum::{
    extract::{Path, Request, State},
    response::{Json, Response},
    Extension,
};
use rahati_core::model::{self, money, Room};
use rahati_core::policy::{authorize, Kind};
use rahati_core::{Action, Actor, Presence, RahatiError, Validator};
use rahati_store::repo::{accommodations, centers, rooms};
use rust_decimal::Decimal;
use rusqlite::Connection;
use serde_json::Value;
use std::sync::Arc;

use super::{created, embed, extract_body, found, message, related, to_json, QueryParams};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

const NUMBER_TAKEN: &str = "Room number already exists in this center";

/// A center admin only manages the rooms of their own center
fn ensure_manages(actor: &Actor, center_id: i64) -> rahati_core::Result<()> {
    if actor.covers_center(center_id) {
        Ok(())
    } else {
        Err(RahatiError::forbidden("Unauthorized to manage rooms for this center"))
    }
}

fn with_center(conn: &Connection, room: &Room) -> rahati_core::Result<Value> {
    let center = centers::get(conn, room.center_id)?;
    embed(room, vec![("center", related(center.as_ref())?)])
}

/// GET /api/rooms
pub async fn index(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    params: QueryParams,
) -> ApiResult<Json<Vec<Value>>> {
    authorize(Kind::Room, Action::List, &auth.actor(), &[])?;
    let filter = rooms::RoomFilter {
        center_id: params.int("center_id")?,
        room_type: params.text("type"),
        is_available: params.bool("is_available")?,
        is_accessible: params.bool("is_accessible")?,
        min_capacity: params.int("min_capacity")?,
        max_price: params.decimal("max_price")?,
    };

    let list = state.store.read(|conn| -> rahati_core::Result<_> {
        rooms::list(conn, &filter)?
            .iter()
            .map(|room| with_center(conn, room))
            .collect()
    })?;
    Ok(Json(list))
}

/// POST /api/rooms
pub async fn store(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    request: Request,
) -> ApiResult<Response> {
    let actor = auth.actor();
    authorize(Kind::Room, Action::Create, &actor, &[])?;
    let body = extract_body(request).await?;

    let (room, body) = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut v = Validator::new(&body);
        let center_id = v.integer("center_id", Presence::Required, None, None);
        let room_number = v.string("room_number", Presence::Required, 20);
        let room_type = v.string("type", Presence::Required, 50);
        let description = v.text("description", Presence::Nullable);
        let price = v.decimal("price_per_night", Presence::Required, Some(Decimal::ZERO));
        let capacity = v.integer("capacity", Presence::Required, Some(1), None);
        let is_accessible = v.boolean("is_accessible", Presence::Sometimes);
        let is_available = v.boolean("is_available", Presence::Sometimes);
        if let Some(id) = center_id {
            v.exists("center_id", centers::get(conn, id)?.is_some());
        }
        v.finish()?;

        let center_id = center_id.unwrap_or_default();
        let room_number = room_number.unwrap_or_default();
        ensure_manages(&actor, center_id)?;
        if rooms::number_taken(conn, center_id, &room_number, None)? {
            return Err(RahatiError::rejected(NUMBER_TAKEN));
        }

        let now = model::now();
        let room = rooms::insert(
            conn,
            &Room {
                id: 0,
                center_id,
                room_number,
                room_type: room_type.unwrap_or_default(),
                description,
                price_per_night: money(price.unwrap_or_default()),
                capacity: capacity.unwrap_or(1),
                is_accessible: is_accessible.unwrap_or(false),
                is_available: is_available.unwrap_or(true),
                created_at: now,
                updated_at: now,
            },
        )?;
        let body = with_center(conn, &room)?;
        Ok((room, body))
    })?;

    tracing::info!(room_id = room.id, center_id = room.center_id, "Room created");
    created(room.id, &body)
}

/// GET /api/rooms/{id}, with the center and bookings from today on
pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    authorize(Kind::Room, Action::View, &auth.actor(), &[])?;
    let today = model::now().date();

    let body = state.store.read(|conn| -> rahati_core::Result<_> {
        let room = found(rooms::get(conn, id)?, "Room", id)?;
        let center = centers::get(conn, room.center_id)?;
        let upcoming = accommodations::upcoming_for_room(conn, id, today)?;
        embed(
            &room,
            vec![
                ("center", related(center.as_ref())?),
                ("accommodations", to_json(&upcoming)?),
            ],
        )
    })?;
    Ok(Json(body))
}

/// PUT|PATCH /api/rooms/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    request: Request,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    authorize(Kind::Room, Action::Update, &actor, &[])?;
    let body = extract_body(request).await?;

    let body = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut room = found(rooms::get(conn, id)?, "Room", id)?;
        ensure_manages(&actor, room.center_id)?;

        let mut v = Validator::new(&body);
        let room_number = v.string("room_number", Presence::Sometimes, 20);
        let room_type = v.string("type", Presence::Sometimes, 50);
        let description = v.text("description", Presence::Nullable);
        let price = v.decimal("price_per_night", Presence::Sometimes, Some(Decimal::ZERO));
        let capacity = v.integer("capacity", Presence::Sometimes, Some(1), None);
        let is_accessible = v.boolean("is_accessible", Presence::Sometimes);
        let is_available = v.boolean("is_available", Presence::Sometimes);
        v.finish()?;

        if let Some(number) = room_number {
            if number != room.room_number && rooms::number_taken(conn, room.center_id, &number, Some(room.id))? {
                return Err(RahatiError::rejected(NUMBER_TAKEN));
            }
            room.room_number = number;
        }
        if let Some(room_type) = room_type {
            room.room_type = room_type;
        }
        if body.get("description").is_some() {
            room.description = description;
        }
        if let Some(price) = price {
            room.price_per_night = money(price);
        }
        room.capacity = capacity.unwrap_or(room.capacity);
        room.is_accessible = is_accessible.unwrap_or(room.is_accessible);
        room.is_available = is_available.unwrap_or(room.is_available);
        room.updated_at = model::now();

        rooms::update(conn, &room)?;
        with_center(conn, &room)
    })?;

    Ok(Json(body))
}

/// DELETE /api/rooms/{id}
///
/// A room with booking history is marked unavailable instead.
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    authorize(Kind::Room, Action::Delete, &actor, &[])?;

    let retired = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut room = found(rooms::get(conn, id)?, "Room", id)?;
        ensure_manages(&actor, room.center_id)?;
        if rooms::has_accommodations(conn, id)? {
            room.is_available = false;
            room.updated_at = model::now();
            rooms::update(conn, &room)?;
            Ok(true)
        } else {
            rooms::delete(conn, id)?;
            Ok(false)
        }
    })?;

    if retired {
        tracing::info!(room_id = id, "Room marked unavailable");
        Ok(message("Room marked as unavailable successfully"))
    } else {
        tracing::info!(room_id = id, "Room deleted");
        Ok(message("Room deleted successfully"))
    }
}
