use axum::{
    extract::{ConnectInfo, Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use rahati_store::{AuditLog, AuditRecord, Operation};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::auth::AuthUser;
use crate::error::FailureNote;
use crate::AppState;

/// Audit context extracted from HTTP request
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub user_id: Option<i64>,
    pub client_ip: String,
}

/// Id of the record a handler created or acted on, when the path does not carry it
#[derive(Debug, Clone, Copy)]
pub struct AuditEntityId(pub i64);

impl AuditContext {
    pub fn new(user_id: Option<i64>, client_ip: String) -> Self {
        Self { user_id, client_ip }
    }

    /// Extract audit context from an Axum request
    pub fn from_request(request: &Request) -> Self {
        let user_id = request.extensions().get::<AuthUser>().map(AuthUser::id);
        Self {
            user_id,
            client_ip: client_ip(request),
        }
    }
}

pub fn client_ip(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// What an API request does, derived from its method and path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditTarget {
    pub operation: Operation,
    pub entity: String,
    pub entity_id: Option<i64>,
}

impl AuditTarget {
    pub fn from_request(method: &Method, path: &str) -> Option<Self> {
        let rest = path.strip_prefix("/api/")?;
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        let (&entity, tail) = segments.split_first()?;
        let entity_id = tail.first().and_then(|s| s.parse::<i64>().ok());

        let (operation, entity) = match (entity, tail.first().copied()) {
            ("auth", Some("login")) => (Operation::Login, "auth"),
            ("auth", Some("logout")) => (Operation::Logout, "auth"),
            ("auth", Some("register")) => (Operation::Create, "users"),
            ("auth", _) => (Operation::Read, "users"),
            _ => {
                let operation = match *method {
                    Method::GET if entity_id.is_some() => Operation::Read,
                    Method::GET => Operation::List,
                    Method::POST => Operation::Create,
                    Method::PUT | Method::PATCH => Operation::Update,
                    Method::DELETE => Operation::Delete,
                    _ => return None,
                };
                (operation, entity)
            }
        };

        Some(Self {
            operation,
            entity: entity.to_string(),
            entity_id,
        })
    }
}

/// Record every API call once the handler has answered.
pub async fn audit_middleware(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let Some(target) = AuditTarget::from_request(request.method(), request.uri().path()) else {
        return next.run(request).await;
    };
    let context = AuditContext::from_request(&request);

    let response = next.run(request).await;

    let entity_id = target
        .entity_id
        .or_else(|| response.extensions().get::<AuditEntityId>().map(|id| id.0));
    if response.status().is_success() {
        log_operation_success(&context, target.operation, &target.entity, entity_id, &state.audit);
    } else {
        let error = response
            .extensions()
            .get::<FailureNote>()
            .map(|note| note.0.clone())
            .unwrap_or_else(|| response.status().to_string());
        log_operation_error(&context, target.operation, &target.entity, entity_id, &error, &state.audit);
    }

    response
}

/// Log a successful operation
pub fn log_operation_success(
    context: &AuditContext,
    operation: Operation,
    entity: &str,
    entity_id: Option<i64>,
    audit_log: &Arc<Mutex<AuditLog>>,
) {
    tracing::info!(
        user_id = ?context.user_id,
        client_ip = %context.client_ip,
        operation = operation.as_str(),
        entity = entity,
        entity_id = ?entity_id,
        status = "success",
        "Audit: {} {}",
        operation.as_str(),
        entity
    );

    write(context, operation, entity, entity_id, None, audit_log);
}

/// Log a failed operation
pub fn log_operation_error(
    context: &AuditContext,
    operation: Operation,
    entity: &str,
    entity_id: Option<i64>,
    error: &str,
    audit_log: &Arc<Mutex<AuditLog>>,
) {
    tracing::warn!(
        user_id = ?context.user_id,
        client_ip = %context.client_ip,
        operation = operation.as_str(),
        entity = entity,
        entity_id = ?entity_id,
        status = "error",
        error = error,
        "Audit: {} {} failed: {}",
        operation.as_str(),
        entity,
        error
    );

    write(context, operation, entity, entity_id, Some(error), audit_log);
}

// Write to database asynchronously in a spawned task
fn write(
    context: &AuditContext,
    operation: Operation,
    entity: &str,
    entity_id: Option<i64>,
    error: Option<&str>,
    audit_log: &Arc<Mutex<AuditLog>>,
) {
    let context = context.clone();
    let entity = entity.to_string();
    let error = error.map(str::to_string);
    let audit_log = Arc::clone(audit_log);

    tokio::spawn(async move {
        let audit = audit_log.lock().await;
        let record = AuditRecord {
            operation,
            entity: Some(&entity),
            entity_id,
            user_id: context.user_id,
            client_ip: Some(&context.client_ip),
            error: error.as_deref(),
        };
        if let Err(e) = audit.log(&record) {
            tracing::error!("Failed to write audit log to database: {}", e);
        }
    });
}

/// Log an authentication attempt
pub fn log_auth_attempt(client_ip: &str, user_id: Option<i64>, success: bool) {
    if success {
        tracing::debug!(
            user_id = ?user_id,
            client_ip = %client_ip,
            status = "success",
            "Audit: Authentication successful"
        );
    } else {
        tracing::warn!(
            client_ip = %client_ip,
            status = "failed",
            "Audit: Authentication failed"
        );
    }
}
