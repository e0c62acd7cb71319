//! Issued access-token ids. A token is honoured only while its `jti` row exists.

use crate::error::Result;
use crate::repo::exists;
use chrono::NaiveDateTime;
use rusqlite::{Connection, params};

pub fn record(
    conn: &Connection,
    jti: &str,
    user_id: i64,
    expires_at: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<()> {
    conn.execute(
        "INSERT INTO access_tokens (jti, user_id, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![jti, user_id, expires_at, now],
    )?;
    Ok(())
}

pub fn is_active(conn: &Connection, jti: &str, now: NaiveDateTime) -> Result<bool> {
    exists(
        conn,
        "SELECT 1 FROM access_tokens WHERE jti = ?1 AND expires_at > ?2",
        params![jti, now],
    )
}

pub fn revoke(conn: &Connection, jti: &str) -> Result<bool> {
    Ok(conn.execute("DELETE FROM access_tokens WHERE jti = ?1", params![jti])? > 0)
}

/// Drop expired rows; returns how many were removed
pub fn purge_expired(conn: &Connection, now: NaiveDateTime) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM access_tokens WHERE expires_at <= ?1",
        params![now],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::tests::{memory, sample_user, ts};
    use crate::repo::users;
    use rahati_core::model::Role;

    #[test]
    fn test_revocation_and_expiry() {
        let conn = memory();
        let user = users::insert(&conn, &sample_user("a@example.com", Role::Patient)).unwrap();
        let now = ts("2030-06-01 12:00:00");

        record(&conn, "live", user.id, ts("2030-06-02 12:00:00"), now).unwrap();
        record(&conn, "stale", user.id, ts("2030-06-01 11:00:00"), now).unwrap();

        assert!(is_active(&conn, "live", now).unwrap());
        assert!(!is_active(&conn, "stale", now).unwrap());
        assert!(!is_active(&conn, "unknown", now).unwrap());

        assert!(revoke(&conn, "live").unwrap());
        assert!(!is_active(&conn, "live", now).unwrap());
        assert_eq!(purge_expired(&conn, now).unwrap(), 1);
    }
}
