//! SQLite-based audit log
//!
//! Kept in its own database file so it can be rotated independently of the
//! booking data.

use crate::error::Result;
use rusqlite::{Connection, params};
use serde::Serialize;
use std::path::Path;

/// Operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    List,
    Login,
    Logout,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::List => "list",
            Operation::Login => "login",
            Operation::Logout => "logout",
        }
    }
}

/// One row of the trail, as returned to operators
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub operation: String,
    pub entity: Option<String>,
    pub entity_id: Option<i64>,
    pub user_id: Option<i64>,
    pub client_ip: Option<String>,
    pub result: String,
    pub error_message: Option<String>,
}

/// A single event to record
#[derive(Debug, Clone)]
pub struct AuditRecord<'a> {
    pub operation: Operation,
    pub entity: Option<&'a str>,
    pub entity_id: Option<i64>,
    pub user_id: Option<i64>,
    pub client_ip: Option<&'a str>,
    pub error: Option<&'a str>,
}

pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open the audit log (create if not exists)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let audit = Self { conn };
        audit.initialize()?;
        Ok(audit)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL DEFAULT (datetime('now')),
                operation TEXT NOT NULL,
                entity TEXT,
                entity_id INTEGER,
                user_id INTEGER,
                client_ip TEXT,
                result TEXT NOT NULL,
                error_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity, entity_id);
            CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_log(user_id);
            "#,
        )?;
        Ok(())
    }

    /// Record an audit log entry. A record carrying `error` is a failure.
    pub fn log(&self, record: &AuditRecord<'_>) -> Result<()> {
        let result = if record.error.is_some() { "error" } else { "success" };

        self.conn.execute(
            r#"
            INSERT INTO audit_log
            (operation, entity, entity_id, user_id, client_ip, result, error_message)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.operation.as_str(),
                record.entity,
                record.entity_id,
                record.user_id,
                record.client_ip,
                result,
                record.error,
            ],
        )?;

        Ok(())
    }

    /// Most recent entries first
    pub fn recent_entries(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, timestamp, operation, entity, entity_id, user_id, client_ip, result,
                   error_message
            FROM audit_log
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(AuditEntry {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                operation: row.get(2)?,
                entity: row.get(3)?,
                entity_id: row.get(4)?,
                user_id: row.get(5)?,
                client_ip: row.get(6)?,
                result: row.get(7)?,
                error_message: row.get(8)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(operation: Operation, entity_id: i64, error: Option<&'static str>) -> AuditRecord<'static> {
        AuditRecord {
            operation,
            entity: Some("appointment"),
            entity_id: Some(entity_id),
            user_id: Some(1),
            client_ip: Some("127.0.0.1"),
            error,
        }
    }

    #[test]
    fn test_audit_log() {
        let audit = AuditLog::open(":memory:").unwrap();

        audit.log(&record(Operation::Create, 1, None)).unwrap();
        audit
            .log(&record(Operation::Read, 999, Some("Appointment not found")))
            .unwrap();

        let count: i32 = audit
            .conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .unwrap();

        assert_eq!(count, 2);
    }

    #[test]
    fn test_recent_entries() {
        let audit = AuditLog::open(":memory:").unwrap();

        audit.log(&record(Operation::Create, 1, None)).unwrap();
        audit.log(&record(Operation::Read, 1, None)).unwrap();
        audit.log(&record(Operation::Update, 2, Some("forbidden"))).unwrap();

        let entries = audit.recent_entries(2).unwrap();
        assert_eq!(entries.len(), 2);
        // Most recent first
        assert_eq!(entries[0].operation, "update");
        assert_eq!(entries[0].result, "error");
        assert_eq!(entries[0].error_message.as_deref(), Some("forbidden"));
        assert_eq!(entries[1].entity_id, Some(1));
    }
}
