use axum::{
    extract::{Path, Request, State},
    response::{Json, Response},
    Extension,
};
use rahati_core::model::{self, money, MealOption};
use rahati_core::policy::{authorize, Kind};
use rahati_core::{Action, Presence, Validator};
use rahati_store::repo::meal_options;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;

use super::{created, extract_body, found, message, QueryParams};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

/// GET /api/meal-options
pub async fn index(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    params: QueryParams,
) -> ApiResult<Json<Vec<MealOption>>> {
    authorize(Kind::MealOption, Action::List, &auth.actor(), &[])?;
    let filter = meal_options::MealOptionFilter {
        is_active: params.bool("is_active")?,
        is_vegetarian: params.bool("is_vegetarian")?,
        is_vegan: params.bool("is_vegan")?,
        is_gluten_free: params.bool("is_gluten_free")?,
    };
    let list = state.store.read(|conn| meal_options::list(conn, &filter))?;
    Ok(Json(list))
}

/// POST /api/meal-options
pub async fn store(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    request: Request,
) -> ApiResult<Response> {
    authorize(Kind::MealOption, Action::Create, &auth.actor(), &[])?;
    let body = extract_body(request).await?;

    let mut v = Validator::new(&body);
    let name = v.string("name", Presence::Required, 255);
    let description = v.text("description", Presence::Nullable);
    let price = v.decimal("price", Presence::Required, Some(Decimal::ZERO));
    let is_vegetarian = v.boolean("is_vegetarian", Presence::Sometimes);
    let is_vegan = v.boolean("is_vegan", Presence::Sometimes);
    let is_gluten_free = v.boolean("is_gluten_free", Presence::Sometimes);
    let is_active = v.boolean("is_active", Presence::Sometimes);
    v.finish()?;

    let now = model::now();
    let meal = MealOption {
        id: 0,
        name: name.unwrap_or_default(),
        description,
        price: money(price.unwrap_or_default()),
        is_vegetarian: is_vegetarian.unwrap_or(false),
        is_vegan: is_vegan.unwrap_or(false),
        is_gluten_free: is_gluten_free.unwrap_or(false),
        is_active: is_active.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };
    let meal = state.store.read(|conn| meal_options::insert(conn, &meal))?;

    tracing::info!(meal_option_id = meal.id, "Meal option created");
    created(meal.id, &meal)
}

/// GET /api/meal-options/{id}
pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<MealOption>> {
    authorize(Kind::MealOption, Action::View, &auth.actor(), &[])?;
    let meal = state
        .store
        .read(|conn| -> rahati_core::Result<_> { found(meal_options::get(conn, id)?, "Meal option", id) })?;
    Ok(Json(meal))
}

/// PUT|PATCH /api/meal-options/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    request: Request,
) -> ApiResult<Json<MealOption>> {
    authorize(Kind::MealOption, Action::Update, &auth.actor(), &[])?;
    let body = extract_body(request).await?;

    let meal = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut meal = found(meal_options::get(conn, id)?, "Meal option", id)?;

        let mut v = Validator::new(&body);
        let name = v.string("name", Presence::Sometimes, 255);
        let description = v.text("description", Presence::Nullable);
        let price = v.decimal("price", Presence::Sometimes, Some(Decimal::ZERO));
        let is_vegetarian = v.boolean("is_vegetarian", Presence::Sometimes);
        let is_vegan = v.boolean("is_vegan", Presence::Sometimes);
        let is_gluten_free = v.boolean("is_gluten_free", Presence::Sometimes);
        let is_active = v.boolean("is_active", Presence::Sometimes);
        v.finish()?;

        if let Some(name) = name {
            meal.name = name;
        }
        if body.get("description").is_some() {
            meal.description = description;
        }
        if let Some(price) = price {
            meal.price = money(price);
        }
        meal.is_vegetarian = is_vegetarian.unwrap_or(meal.is_vegetarian);
        meal.is_vegan = is_vegan.unwrap_or(meal.is_vegan);
        meal.is_gluten_free = is_gluten_free.unwrap_or(meal.is_gluten_free);
        meal.is_active = is_active.unwrap_or(meal.is_active);
        meal.updated_at = model::now();

        meal_options::update(conn, &meal)?;
        Ok(meal)
    })?;

    Ok(Json(meal))
}

/// DELETE /api/meal-options/{id}
///
/// A meal option already chosen for a stay is deactivated instead.
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    authorize(Kind::MealOption, Action::Delete, &auth.actor(), &[])?;

    let deactivated = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut meal = found(meal_options::get(conn, id)?, "Meal option", id)?;
        if meal_options::is_referenced(conn, id)? {
            meal.is_active = false;
            meal.updated_at = model::now();
            meal_options::update(conn, &meal)?;
            Ok(true)
        } else {
            meal_options::delete(conn, id)?;
            Ok(false)
        }
    })?;

    if deactivated {
        tracing::info!(meal_option_id = id, "Meal option deactivated");
        Ok(message("Meal option deactivated successfully"))
    } else {
        tracing::info!(meal_option_id = id, "Meal option deleted");
        Ok(message("Meal option deleted successfully"))
    }
}
