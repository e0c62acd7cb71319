pub mod error;
pub mod repo;
pub mod schema;
pub mod seed;
pub mod sqlite_audit;
pub mod sqlite_store;

pub use error::{Result, StoreError};
pub use sqlite_audit::{AuditEntry, AuditLog, AuditRecord, Operation};
pub use sqlite_store::SqliteStore;
