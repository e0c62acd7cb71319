//! Login, registration, logout and the current-user endpoint.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use rahati_core::model::{self, Role};
use rahati_core::policy::{authorize_or, Kind};
use rahati_core::{Action, Presence, RahatiError, Validator};
use rahati_store::repo::{tokens, users as user_repo};
use serde_json::json;
use std::sync::Arc;

use super::users::{ensure_center_assignable, require_admin_center, validate_new_account};
use super::{extract_body, message};
use crate::audit::AuditEntityId;
use crate::auth::{check_credentials, AuthUser};
use crate::error::ApiResult;
use crate::AppState;

fn token_response(status: StatusCode, token: String, user_id: i64, role: Role) -> Response {
    let body = json!({
        "token": token,
        "userId": user_id,
        "role": role,
    });
    let mut response = (status, Json(body)).into_response();
    response.extensions_mut().insert(AuditEntityId(user_id));
    response
}

/// POST /api/auth/login
pub async fn login(State(state): State<Arc<AppState>>, request: Request) -> ApiResult<Response> {
    let body = extract_body(request).await?;

    let mut v = Validator::new(&body);
    let email = v.email("email", Presence::Required);
    let password = v.text("password", Presence::Required);
    v.finish()?;
    let (email, password) = (email.unwrap_or_default(), password.unwrap_or_default());

    let now = model::now();
    let (user, token) = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        tokens::purge_expired(conn, now)?;
        let user = check_credentials(conn, &email, &password)?
            .ok_or_else(|| RahatiError::Unauthenticated("Invalid credentials".into()))?;
        let token = state.tokens.issue(conn, &user, now)?;
        Ok((user, token))
    })?;

    tracing::info!(user_id = user.id, role = %user.role, "User logged in");
    Ok(token_response(StatusCode::OK, token, user.id, user.role))
}

/// POST /api/auth/register
///
/// Anyone may register a Patient or Provider account. Admin and Superuser
/// accounts need an authenticated staff caller.
pub async fn register(State(state): State<Arc<AppState>>, request: Request) -> ApiResult<Response> {
    let caller = request.extensions().get::<AuthUser>().map(AuthUser::actor);
    let body = extract_body(request).await?;

    let now = model::now();
    let (user, token) = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut user = validate_new_account(conn, &body, now)?;

        if matches!(user.role, Role::Admin | Role::Superuser) {
            let denial = "Unauthorized to create admin or superuser accounts";
            let Some(caller) = caller.as_ref() else {
                return Err(RahatiError::forbidden(denial));
            };
            authorize_or(Kind::User, Action::CreatePrivileged, caller, &[], denial)?;
            if user.role == Role::Superuser {
                authorize_or(
                    Kind::User,
                    Action::CreateSuperuser,
                    caller,
                    &[],
                    "Unauthorized to create superuser accounts",
                )?;
            }
            ensure_center_assignable(caller, user.center_id)?;
        }
        require_admin_center(&mut user)?;

        let user = user_repo::insert(conn, &user)?;
        let token = state.tokens.issue(conn, &user, now)?;
        Ok((user, token))
    })?;

    tracing::info!(user_id = user.id, role = %user.role, "Account registered");
    Ok(token_response(StatusCode::CREATED, token, user.id, user.role))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(jti) = auth.jti.as_deref() {
        state.store.read(|conn| tokens::revoke(conn, jti))?;
    }
    Ok(message("Successfully logged out"))
}

/// GET /api/auth/user
pub async fn current_user(Extension(auth): Extension<AuthUser>) -> Json<model::User> {
    Json(auth.user)
}
