use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, Method},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, NaiveDateTime};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rahati_core::model::{self, User};
use rahati_core::password::verify_password;
use rahati_core::{Actor, RahatiError};
use rahati_store::repo::{tokens, users};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AuthSettings;
use crate::error::{ApiError, ApiResult};
use crate::{audit, AppState};

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REGISTER_PATH: &str = "/api/auth/register";

/// Authenticated user information
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub auth_type: AuthType,
    /// Token id when authenticated with a bearer token
    pub jti: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    BasicAuth,
    Jwt,
}

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn actor(&self) -> Actor {
        Actor::from(&self.user)
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies HS256 access tokens.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Use the configured secret, or a random one valid for this process only
    pub fn from_settings(settings: &AuthSettings) -> Self {
        match settings.jwt_secret.as_deref() {
            Some(secret) => Self::new(secret.as_bytes(), settings.token_ttl_hours),
            None => {
                tracing::warn!("No JWT secret configured; issued tokens will not survive a restart");
                let secret = format!(
                    "{}{}",
                    uuid::Uuid::new_v4().simple(),
                    uuid::Uuid::new_v4().simple()
                );
                Self::new(secret.as_bytes(), settings.token_ttl_hours)
            }
        }
    }

    /// Sign a token for `user` and record its id so it can be revoked.
    pub fn issue(&self, conn: &Connection, user: &User, now: NaiveDateTime) -> rahati_core::Result<String> {
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now.and_utc().timestamp(),
            exp: expires_at.and_utc().timestamp(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| RahatiError::Storage(format!("Failed to sign token: {e}")))?;
        tokens::record(conn, &claims.jti, user.id, expires_at, now)?;
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> rahati_core::Result<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| RahatiError::Unauthenticated(format!("Invalid token: {e}")))
    }
}

/// Look up an account by email and check its password.
pub fn check_credentials(conn: &Connection, email: &str, password: &str) -> rahati_core::Result<Option<User>> {
    let user = users::find_by_email(conn, email)?;
    Ok(user.filter(|u| verify_password(password, &u.password_hash)))
}

fn unauthenticated(message: impl Into<String>) -> ApiError {
    ApiError(RahatiError::Unauthenticated(message.into()))
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path();
    if request.method() == Method::OPTIONS || path == "/health" || path == LOGIN_PATH {
        return Ok(next.run(request).await);
    }

    // Registration is public, but an authenticated caller may create staff accounts
    let optional = path == REGISTER_PATH;
    let client_ip = audit::client_ip(&request);

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let Some(auth_header) = auth_header else {
        if optional {
            return Ok(next.run(request).await);
        }
        audit::log_auth_attempt(&client_ip, None, false);
        return Err(unauthenticated("Missing Authorization header"));
    };

    let result = if let Some(token) = auth_header.strip_prefix("Bearer ") {
        authenticate_bearer(&state, token.trim())
    } else if let Some(credentials) = auth_header.strip_prefix("Basic ") {
        authenticate_basic(&state, credentials.trim())
    } else {
        Err(unauthenticated(
            "Invalid Authorization header format. Use 'Bearer <token>' or 'Basic <credentials>'",
        ))
    };

    match result {
        Ok(auth_user) => {
            audit::log_auth_attempt(&client_ip, Some(auth_user.id()), true);
            request.extensions_mut().insert(auth_user);
        }
        Err(e) if optional => {
            tracing::debug!(error = %e.0, "Ignoring invalid credentials on registration");
        }
        Err(e) => {
            audit::log_auth_attempt(&client_ip, None, false);
            return Err(e);
        }
    }

    Ok(next.run(request).await)
}

/// Authenticate using a bearer JWT whose id has not been revoked
fn authenticate_bearer(state: &AppState, token: &str) -> ApiResult<AuthUser> {
    let claims = state.tokens.verify(token)?;
    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| unauthenticated("Invalid token subject"))?;

    let now = model::now();
    let (active, user) = state.store.read(|conn| -> rahati_core::Result<_> {
        Ok((tokens::is_active(conn, &claims.jti, now)?, users::get(conn, user_id)?))
    })?;

    if !active {
        return Err(unauthenticated("Token has been revoked or has expired"));
    }
    let user = user.ok_or_else(|| unauthenticated("User no longer exists"))?;

    Ok(AuthUser {
        user,
        auth_type: AuthType::Jwt,
        jti: Some(claims.jti),
    })
}

/// Authenticate using Basic authentication with email and password
fn authenticate_basic(state: &AppState, credentials: &str) -> ApiResult<AuthUser> {
    if !state.config.auth.allow_basic {
        return Err(unauthenticated("Basic authentication is disabled"));
    }

    let decoded = STANDARD
        .decode(credentials)
        .map_err(|_| unauthenticated("Invalid Base64 encoding in Basic auth"))?;
    let decoded =
        String::from_utf8(decoded).map_err(|_| unauthenticated("Invalid UTF-8 in Basic auth credentials"))?;
    let (email, password) = decoded
        .split_once(':')
        .ok_or_else(|| unauthenticated("Invalid Basic auth format. Expected 'email:password'"))?;

    let user = state
        .store
        .read(|conn| check_credentials(conn, email, password))?
        .ok_or_else(|| unauthenticated("Invalid email or password"))?;

    Ok(AuthUser {
        user,
        auth_type: AuthType::BasicAuth,
        jti: None,
    })
}
