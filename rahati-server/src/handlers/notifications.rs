use axum::{
    extract::{Path, Request, State},
    response::{Json, Response},
    Extension,
};
use rahati_core::model::{self, Notification};
use rahati_core::policy::{self, authorize, Kind, Rule};
use rahati_core::{Action, Actor, Presence, Relation, Validator};
use rahati_store::repo::{notifications, users};
use serde_json::Value;
use std::sync::Arc;

use super::{created, extract_body, found, message, QueryParams};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

fn relations(actor: &Actor, notification: &Notification) -> &'static [Relation] {
    if notification.user_id == actor.id {
        &[Relation::Recipient]
    } else {
        &[]
    }
}

/// GET /api/notifications, always the caller's own
pub async fn index(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    params: QueryParams,
) -> ApiResult<Json<Vec<Notification>>> {
    let scope = policy::list_scope(Kind::Notification, &auth.actor())?;
    let filter = notifications::NotificationFilter {
        is_read: params.bool("is_read")?,
        kind: params.text("type"),
    };
    let list = state.store.read(|conn| notifications::list(conn, scope, &filter))?;
    Ok(Json(list))
}

/// POST /api/notifications
pub async fn store(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    request: Request,
) -> ApiResult<Response> {
    authorize(Kind::Notification, Action::Create, &auth.actor(), &[])?;
    let body = extract_body(request).await?;

    let notification = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut v = Validator::new(&body);
        let user_id = v.integer("user_id", Presence::Required, None, None);
        let kind = v.string("type", Presence::Required, 50);
        let title = v.string("title", Presence::Required, 255);
        let text = v.text("message", Presence::Required);
        let data = v.object("data", Presence::Nullable);
        if let Some(id) = user_id {
            v.exists("user_id", users::get(conn, id)?.is_some());
        }
        v.finish()?;

        let now = model::now();
        let notification = notifications::insert(
            conn,
            &Notification {
                id: 0,
                user_id: user_id.unwrap_or_default(),
                kind: kind.unwrap_or_default(),
                title: title.unwrap_or_default(),
                message: text.unwrap_or_default(),
                data,
                is_read: false,
                read_at: None,
                created_at: now,
                updated_at: now,
            },
        )?;
        Ok(notification)
    })?;

    tracing::info!(
        notification_id = notification.id,
        recipient_id = notification.user_id,
        kind = %notification.kind,
        "Notification sent"
    );
    created(notification.id, &notification)
}

/// GET /api/notifications/{id}
pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Notification>> {
    let actor = auth.actor();
    let notification = state.store.read(|conn| -> rahati_core::Result<_> {
        let notification = found(notifications::get(conn, id)?, "Notification", id)?;
        authorize(Kind::Notification, Action::View, &actor, relations(&actor, &notification))?;
        Ok(notification)
    })?;
    Ok(Json(notification))
}

/// PUT|PATCH /api/notifications/{id}
///
/// Recipients may only flip the read flag. Staff may also rewrite the
/// content; `read_at` survives a repeated mark-as-read.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    request: Request,
) -> ApiResult<Json<Notification>> {
    let actor = auth.actor();
    let body = extract_body(request).await?;
    let edits_content = policy::rule(Kind::Notification, Action::EditContent, actor.role) == Rule::Allow;

    let notification = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut notification = found(notifications::get(conn, id)?, "Notification", id)?;
        authorize(Kind::Notification, Action::Update, &actor, relations(&actor, &notification))?;
        let now = model::now();

        if edits_content {
            let mut v = Validator::new(&body);
            let kind = v.string("type", Presence::Sometimes, 50);
            let title = v.string("title", Presence::Sometimes, 255);
            let text = v.text("message", Presence::Sometimes);
            let data = v.object("data", Presence::Nullable);
            let is_read = v.boolean("is_read", Presence::Sometimes);
            v.finish()?;

            if let Some(kind) = kind {
                notification.kind = kind;
            }
            if let Some(title) = title {
                notification.title = title;
            }
            if let Some(text) = text {
                notification.message = text;
            }
            if body.get("data").is_some() {
                notification.data = data;
            }
            match is_read {
                Some(true) => {
                    let at = notification.read_at.unwrap_or(now);
                    notification.mark_read(at);
                }
                Some(false) => notification.mark_unread(),
                None => {}
            }
        } else {
            let mut v = Validator::new(&body);
            let is_read = v.boolean("is_read", Presence::Required);
            v.finish()?;

            if is_read.unwrap_or(false) {
                notification.mark_read(now);
            } else {
                notification.mark_unread();
            }
        }

        notification.updated_at = now;
        notifications::update(conn, &notification)?;
        Ok(notification)
    })?;

    Ok(Json(notification))
}

/// DELETE /api/notifications/{id}
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();

    state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let notification = found(notifications::get(conn, id)?, "Notification", id)?;
        authorize(Kind::Notification, Action::Delete, &actor, relations(&actor, &notification))?;
        notifications::delete(conn, id)?;
        Ok(())
    })?;

    Ok(message("Notification deleted successfully"))
}

/// PATCH /api/notifications/{id}/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Notification>> {
    let actor = auth.actor();

    let notification = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut notification = found(notifications::get(conn, id)?, "Notification", id)?;
        authorize(Kind::Notification, Action::Update, &actor, relations(&actor, &notification))?;
        let now = model::now();
        notification.mark_read(now);
        notification.updated_at = now;
        notifications::update(conn, &notification)?;
        Ok(notification)
    })?;

    Ok(Json(notification))
}
