//! HTTP rendering of domain errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use rahati_core::RahatiError;
use rahati_store::StoreError;
use serde_json::json;

/// Message carried on an error response so the audit layer can record it
#[derive(Debug, Clone)]
pub struct FailureNote(pub String);

#[derive(Debug)]
pub struct ApiError(pub RahatiError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RahatiError::NotFound { .. } => StatusCode::NOT_FOUND,
            RahatiError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            RahatiError::Forbidden(_) => StatusCode::FORBIDDEN,
            RahatiError::Rejected(_) => StatusCode::BAD_REQUEST,
            RahatiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            RahatiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RahatiError> for ApiError {
    fn from(err: RahatiError) -> Self {
        Self(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let note = FailureNote(self.0.to_string());

        let body = match self.0 {
            RahatiError::Validation { message, errors } => json!({
                "message": message,
                "errors": errors,
            }),
            RahatiError::Unauthenticated(message) => json!({
                "error": "Unauthorized",
                "message": message,
            }),
            RahatiError::Storage(_) => json!({ "error": "Internal server error" }),
            other => json!({ "error": other.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(note);
        response
    }
}
