use axum::{
    extract::State,
    response::{IntoResponse, Json},
    Extension,
};
use rahati_core::policy::{self, Kind};
use rahati_core::RahatiError;
use rahati_store::AuditEntry;
use serde_json::json;
use std::sync::Arc;

use super::QueryParams;
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1000;

/// Health check (GET /health)
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Most recent audit trail entries (GET /api/audit?limit=n)
pub async fn audit_trail(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    params: QueryParams,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    policy::list_scope(Kind::AuditLog, &auth.actor())?;

    let limit = match params.int("limit")? {
        Some(n) if n < 1 => {
            return Err(RahatiError::invalid_field("limit", "The limit must be at least 1.").into());
        }
        Some(n) => usize::try_from(n).unwrap_or(MAX_AUDIT_LIMIT).min(MAX_AUDIT_LIMIT),
        None => DEFAULT_AUDIT_LIMIT,
    };

    let audit = state.audit.lock().await;
    let entries = audit.recent_entries(limit)?;
    Ok(Json(entries))
}
