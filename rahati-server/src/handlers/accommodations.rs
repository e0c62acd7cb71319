//! Room bookings attached to appointments.
//!
//! A stay is priced from the room rate and the optional meal plan, and is
//! only written once no other live booking on the room overlaps it. Both the
//! overlap check and the write run in one store transaction.

use axum::{
    extract::{Path, Request, State},
    response::{Json, Response},
    Extension,
};
use rahati_core::booking::{self, StayRange};
use rahati_core::model::{self, Accommodation, AccommodationStatus, Room};
use rahati_core::policy::{self, authorize, authorize_or, Kind};
use rahati_core::{Action, Presence, RahatiError, Validator};
use rahati_store::repo::{accommodations, appointments, centers, meal_options, rooms, users};
use rusqlite::Connection;
use serde_json::Value;
use std::sync::Arc;

use super::{appointment_relations, created, embed, extract_body, found, message, related, QueryParams};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

const OVER_CAPACITY: &str = "The number of guests exceeds the room capacity";

fn view(conn: &Connection, stay: &Accommodation) -> rahati_core::Result<Value> {
    let appointment = match appointments::get(conn, stay.appointment_id)? {
        Some(appt) => {
            let patient = users::get(conn, appt.patient_id)?;
            let provider = match appt.provider_id {
                Some(id) => users::get(conn, id)?,
                None => None,
            };
            embed(
                &appt,
                vec![
                    ("patient", related(patient.as_ref())?),
                    ("provider", related(provider.as_ref())?),
                ],
            )?
        }
        None => Value::Null,
    };
    let room = match rooms::get(conn, stay.room_id)? {
        Some(room) => {
            let center = centers::get(conn, room.center_id)?;
            embed(&room, vec![("center", related(center.as_ref())?)])?
        }
        None => Value::Null,
    };
    let meal = match stay.meal_option_id {
        Some(id) => meal_options::get(conn, id)?,
        None => None,
    };
    embed(
        stay,
        vec![
            ("appointment", appointment),
            ("room", room),
            ("meal_option", related(meal.as_ref())?),
        ],
    )
}

/// Reject the stay if it overlaps a live booking on the same room
fn ensure_free(conn: &Connection, room_id: i64, stay: &StayRange, exclude_id: Option<i64>) -> rahati_core::Result<()> {
    let existing = accommodations::live_for_room(conn, room_id, stay.check_in)?;
    booking::ensure_room_free(stay, &existing, exclude_id)
}

fn price(conn: &Connection, room: &Room, stay: &StayRange, meal_option_id: Option<i64>, guests: i64) -> rahati_core::Result<rust_decimal::Decimal> {
    let meal_price = match meal_option_id {
        Some(id) => Some(found(meal_options::get(conn, id)?, "Meal option", id)?.price),
        None => None,
    };
    Ok(booking::stay_price(room.price_per_night, stay, meal_price, guests))
}

/// GET /api/accommodations
pub async fn index(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    params: QueryParams,
) -> ApiResult<Json<Vec<Value>>> {
    let scope = policy::list_scope(Kind::Accommodation, &auth.actor())?;
    let filter = accommodations::AccommodationFilter {
        appointment_id: params.int("appointment_id")?,
        room_id: params.int("room_id")?,
        status: params.one_of("status", AccommodationStatus::parse)?,
        between: params.date_range()?,
    };

    let list = state.store.read(|conn| -> rahati_core::Result<_> {
        accommodations::list(conn, scope, &filter)?
            .iter()
            .map(|stay| view(conn, stay))
            .collect()
    })?;
    Ok(Json(list))
}

/// POST /api/accommodations
pub async fn store(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    request: Request,
) -> ApiResult<Response> {
    let actor = auth.actor();
    let body = extract_body(request).await?;
    let now = model::now();
    let today = now.date();

    let (stay, body) = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut v = Validator::new(&body);
        let appointment_id = v.integer("appointment_id", Presence::Required, None, None);
        let room_id = v.integer("room_id", Presence::Required, None, None);
        let meal_option_id = v.integer("meal_option_id", Presence::Nullable, None, None);
        let check_in = v.date("check_in_date", Presence::Required);
        let check_out = v.date("check_out_date", Presence::Required);
        let guests = v.integer("number_of_guests", Presence::Required, Some(1), None);
        let special_requests = v.text("special_requests", Presence::Nullable);
        v.after_or_equal("check_in_date", check_in.as_ref(), Some(&today), "today");
        v.after("check_out_date", check_out.as_ref(), check_in.as_ref(), "check in date");
        if let Some(id) = appointment_id {
            v.exists("appointment_id", appointments::get(conn, id)?.is_some());
        }
        if let Some(id) = room_id {
            v.exists("room_id", rooms::get(conn, id)?.is_some());
        }
        if let Some(id) = meal_option_id {
            v.exists("meal_option_id", meal_options::get(conn, id)?.is_some());
        }
        v.finish()?;

        let appointment_id = appointment_id.unwrap_or_default();
        let room_id = room_id.unwrap_or_default();
        let guests = guests.unwrap_or(1);
        let appointment = found(appointments::get(conn, appointment_id)?, "Appointment", appointment_id)?;
        authorize_or(
            Kind::Accommodation,
            Action::Create,
            &actor,
            &appointment_relations(&actor, &appointment),
            "Unauthorized to book accommodation for this appointment",
        )?;
        if accommodations::for_appointment(conn, appointment_id)?.is_some() {
            return Err(RahatiError::rejected("An accommodation already exists for this appointment"));
        }

        let room = found(rooms::get(conn, room_id)?, "Room", room_id)?;
        if !room.is_available {
            return Err(RahatiError::rejected("The selected room is not available"));
        }
        let stay = StayRange::new(check_in.unwrap_or(today), check_out.unwrap_or(today))?;
        ensure_free(conn, room_id, &stay, None)?;
        if guests > room.capacity {
            return Err(RahatiError::rejected(OVER_CAPACITY));
        }

        let total_price = price(conn, &room, &stay, meal_option_id, guests)?;
        let accommodation = accommodations::insert(
            conn,
            &Accommodation {
                id: 0,
                appointment_id,
                room_id,
                meal_option_id,
                check_in_date: stay.check_in,
                check_out_date: stay.check_out,
                number_of_guests: guests,
                total_price,
                status: AccommodationStatus::Reserved,
                special_requests,
                created_at: now,
                updated_at: now,
            },
        )?;
        let body = view(conn, &accommodation)?;
        Ok((accommodation, body))
    })?;

    tracing::info!(
        accommodation_id = stay.id,
        room_id = stay.room_id,
        nights = stay.stay().nights(),
        total_price = %stay.total_price,
        "Accommodation reserved"
    );
    created(stay.id, &body)
}

/// GET /api/accommodations/{id}
pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    let body = state.store.read(|conn| -> rahati_core::Result<_> {
        let stay = found(accommodations::get(conn, id)?, "Accommodation", id)?;
        let appointment = found(appointments::get(conn, stay.appointment_id)?, "Appointment", stay.appointment_id)?;
        authorize(Kind::Accommodation, Action::View, &actor, &appointment_relations(&actor, &appointment))?;
        view(conn, &stay)
    })?;
    Ok(Json(body))
}

/// PUT|PATCH /api/accommodations/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    request: Request,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    let body = extract_body(request).await?;
    let now = model::now();
    let today = now.date();

    let body = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut stay = found(accommodations::get(conn, id)?, "Accommodation", id)?;
        let appointment = found(appointments::get(conn, stay.appointment_id)?, "Appointment", stay.appointment_id)?;
        authorize(Kind::Accommodation, Action::Update, &actor, &appointment_relations(&actor, &appointment))?;

        let mut v = Validator::new(&body);
        let meal_option_id = v.integer("meal_option_id", Presence::Nullable, None, None);
        let check_in = v.date("check_in_date", Presence::Sometimes);
        let check_out = v.date("check_out_date", Presence::Sometimes);
        let guests = v.integer("number_of_guests", Presence::Sometimes, Some(1), None);
        let status = v.one_of("status", Presence::Sometimes, AccommodationStatus::parse);
        let special_requests = v.text("special_requests", Presence::Nullable);
        v.after_or_equal("check_in_date", check_in.as_ref(), Some(&today), "today");
        let effective_in = check_in.unwrap_or(stay.check_in_date);
        v.after("check_out_date", check_out.as_ref(), Some(&effective_in), "check in date");
        if let Some(meal) = meal_option_id {
            v.exists("meal_option_id", meal_options::get(conn, meal)?.is_some());
        }
        let meal_sent = v.has("meal_option_id");
        v.finish()?;

        let room = found(rooms::get(conn, stay.room_id)?, "Room", stay.room_id)?;
        let range = StayRange::new(effective_in, check_out.unwrap_or(stay.check_out_date))?;

        let dates_changed = check_in.is_some() || check_out.is_some();
        let reactivated = stay.status == AccommodationStatus::Cancelled
            && status.is_some_and(|s| s != AccommodationStatus::Cancelled);
        let will_be_live = status.unwrap_or(stay.status) != AccommodationStatus::Cancelled;
        if (dates_changed || reactivated) && will_be_live {
            ensure_free(conn, stay.room_id, &range, Some(stay.id))?;
        }
        if let Some(guests) = guests
            && guests > room.capacity
        {
            return Err(RahatiError::rejected(OVER_CAPACITY));
        }

        if meal_sent {
            stay.meal_option_id = meal_option_id;
        }
        if dates_changed || meal_sent || guests.is_some() {
            stay.check_in_date = range.check_in;
            stay.check_out_date = range.check_out;
            stay.number_of_guests = guests.unwrap_or(stay.number_of_guests);
            stay.total_price = price(conn, &room, &range, stay.meal_option_id, stay.number_of_guests)?;
        }
        if let Some(status) = status {
            stay.status = status;
        }
        if body.get("special_requests").is_some() {
            stay.special_requests = special_requests;
        }
        stay.updated_at = now;

        accommodations::update(conn, &stay)?;
        view(conn, &stay)
    })?;

    Ok(Json(body))
}

/// DELETE /api/accommodations/{id}
///
/// Stays are never removed, only cancelled.
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();

    state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut stay = found(accommodations::get(conn, id)?, "Accommodation", id)?;
        let appointment = found(appointments::get(conn, stay.appointment_id)?, "Appointment", stay.appointment_id)?;
        authorize(Kind::Accommodation, Action::Delete, &actor, &appointment_relations(&actor, &appointment))?;

        if stay.status == AccommodationStatus::CheckedIn {
            return Err(RahatiError::rejected("Cannot cancel an accommodation that is already checked-in"));
        }
        stay.status = AccommodationStatus::Cancelled;
        stay.updated_at = model::now();
        accommodations::update(conn, &stay)?;
        Ok(())
    })?;

    tracing::info!(accommodation_id = id, "Accommodation cancelled");
    Ok(message("Accommodation cancelled successfully"))
}
