use std::collections::BTreeMap;
use thiserror::Error;

/// Field name → validation messages, in field order.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Error, Debug)]
pub enum RahatiError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{message}")]
    Validation {
        message: String,
        errors: FieldErrors,
    },

    #[error("{0}")]
    Forbidden(String),

    /// Business-rule rejection (booking conflict, duplicate, inactive center ...)
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl RahatiError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Single-field validation failure
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.clone()]);
        Self::Validation { message, errors }
    }
}

pub type Result<T> = std::result::Result<T, RahatiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = RahatiError::not_found("Appointment", 7);
        assert_eq!(err.to_string(), "Appointment not found");
    }

    #[test]
    fn test_invalid_field() {
        let err = RahatiError::invalid_field("email", "The email has already been taken.");
        match err {
            RahatiError::Validation { message, errors } => {
                assert_eq!(message, "The email has already been taken.");
                assert_eq!(errors["email"].len(), 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
