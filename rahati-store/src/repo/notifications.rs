use crate::error::{Result, StoreError};
use crate::repo::{Select, fetch_one, require_row};
use rahati_core::Scope;
use rahati_core::model::Notification;
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};

const COLUMNS: &str = "id, user_id, type, title, message, data, is_read, read_at, created_at, updated_at";

#[derive(Debug, Default, Clone)]
pub struct NotificationFilter {
    pub is_read: Option<bool>,
    pub kind: Option<String>,
}

fn decode(row: &Row) -> rusqlite::Result<Notification> {
    let data = match row.get::<_, Option<String>>(5)? {
        Some(raw) => Some(
            serde_json::from_str(&raw)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        ),
        None => None,
    };
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        data,
        is_read: row.get(6)?,
        read_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn encode_data(n: &Notification) -> Result<Option<String>> {
    Ok(n.data.as_ref().map(serde_json::to_string).transpose()?)
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Notification>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM notifications WHERE id = ?1"),
        params![id],
        decode,
    )
}

pub fn insert(conn: &Connection, n: &Notification) -> Result<Notification> {
    conn.execute(
        "INSERT INTO notifications (user_id, type, title, message, data, is_read, read_at,
                                    created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            n.user_id,
            n.kind,
            n.title,
            n.message,
            encode_data(n)?,
            n.is_read,
            n.read_at,
            n.created_at,
            n.updated_at,
        ],
    )?;
    Ok(Notification {
        id: conn.last_insert_rowid(),
        ..n.clone()
    })
}

pub fn update(conn: &Connection, n: &Notification) -> Result<()> {
    let updated = conn.execute(
        "UPDATE notifications SET type = ?2, title = ?3, message = ?4, data = ?5, is_read = ?6,
                read_at = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            n.id,
            n.kind,
            n.title,
            n.message,
            encode_data(n)?,
            n.is_read,
            n.read_at,
            n.updated_at,
        ],
    )?;
    require_row(updated, "notification", n.id)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.execute("DELETE FROM notifications WHERE id = ?1", params![id])? > 0)
}

pub fn list(conn: &Connection, scope: Scope, filter: &NotificationFilter) -> Result<Vec<Notification>> {
    let mut select = Select::new(&format!("SELECT {COLUMNS} FROM notifications"));
    match scope {
        Scope::Recipient(id) => {
            select.eq("user_id", Some(id));
        }
        Scope::All => {}
        other => return Err(StoreError::Other(format!("unsupported notification scope {other:?}"))),
    }
    select
        .eq("is_read", filter.is_read)
        .eq("type", filter.kind.clone());
    select.fetch(conn, "created_at DESC, id DESC", decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::tests::{memory, sample_user, ts};
    use crate::repo::users;
    use rahati_core::model::Role;
    use serde_json::json;

    fn note(user_id: i64, kind: &str) -> Notification {
        Notification {
            id: 0,
            user_id,
            kind: kind.into(),
            title: "Reminder".into(),
            message: "Your appointment is tomorrow".into(),
            data: Some(json!({"appointment_id": 7})),
            is_read: false,
            read_at: None,
            created_at: ts("2030-06-01 08:00:00"),
            updated_at: ts("2030-06-01 08:00:00"),
        }
    }

    #[test]
    fn test_data_round_trips_and_recipient_scope() {
        let conn = memory();
        let a = users::insert(&conn, &sample_user("a@example.com", Role::Patient)).unwrap();
        let b = users::insert(&conn, &sample_user("b@example.com", Role::Patient)).unwrap();
        let mut n = insert(&conn, &note(a.id, "reminder")).unwrap();
        insert(&conn, &note(b.id, "reminder")).unwrap();

        let stored = get(&conn, n.id).unwrap().unwrap();
        assert_eq!(stored.data, Some(json!({"appointment_id": 7})));

        n.mark_read(ts("2030-06-01 09:00:00"));
        update(&conn, &n).unwrap();

        let unread = NotificationFilter {
            is_read: Some(false),
            ..Default::default()
        };
        assert!(list(&conn, Scope::Recipient(a.id), &unread).unwrap().is_empty());
        assert_eq!(list(&conn, Scope::Recipient(b.id), &unread).unwrap().len(), 1);
    }
}
