use rahati_core::RahatiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value that no longer parses (unknown status, bad decimal ...)
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for RahatiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Store failure");
        RahatiError::Storage(err.to_string())
    }
}
