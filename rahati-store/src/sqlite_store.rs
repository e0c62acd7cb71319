//! SQLite-backed store handle.
//!
//! One connection behind a mutex. Repositories in [`crate::repo`] are free
//! functions over `&Connection`, so the same function runs inside or outside
//! a transaction.

use crate::error::{Result, StoreError};
use crate::schema;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the store (create if not exists)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL for concurrent readers; foreign keys guard deletes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        schema::migrate(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Other("store connection mutex poisoned".into()))
    }

    /// Run read-only or single-statement work on the connection
    pub fn read<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Execute multiple operations atomically within an SQLite transaction.
    ///
    /// The transaction commits only when `f` succeeds; any error rolls it
    /// back and is returned unchanged.
    pub fn in_transaction<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StoreError::from)?;
        let result = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{centers, tests::sample_center};

    #[test]
    fn test_in_transaction_commit() {
        let store = SqliteStore::open_in_memory().unwrap();

        store
            .in_transaction(|conn| -> Result<()> {
                centers::insert(conn, &sample_center("North"))?;
                centers::insert(conn, &sample_center("South"))?;
                Ok(())
            })
            .unwrap();

        let all = store.read(|conn| centers::list(conn, rahati_core::Scope::All)).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_in_transaction_rollback() {
        let store = SqliteStore::open_in_memory().unwrap();

        let result: Result<()> = store.in_transaction(|conn| {
            centers::insert(conn, &sample_center("North"))?;
            // Force an error after the insert
            Err(StoreError::Other("forced error".into()))
        });

        assert!(result.is_err());
        // Nothing should be saved due to rollback
        let all = store.read(|conn| centers::list(conn, rahati_core::Scope::All)).unwrap();
        assert!(all.is_empty());
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.read(|conn| -> Result<usize> {
            Ok(conn.execute(
                "INSERT INTO rooms (center_id, room_number, type, price_per_night, created_at, updated_at)
                 VALUES (999, '1', 'Standard', '10.00', '2030-01-01 00:00:00', '2030-01-01 00:00:00')",
                [],
            )?)
        });
        assert!(err.is_err());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rahati.sqlite");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.read(|conn| centers::insert(conn, &sample_center("North"))).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let all = store.read(|conn| centers::list(conn, rahati_core::Scope::All)).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "North");
    }
}
