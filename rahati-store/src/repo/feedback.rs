use crate::error::{Result, StoreError};
use crate::repo::{Select, exists, fetch_one, require_row};
use rahati_core::Scope;
use rahati_core::model::Feedback;
use rusqlite::{Connection, Row, params};

const COLUMNS: &str = "id, user_id, appointment_id, rating, comments, is_anonymous, is_public, \
                       created_at, updated_at";

#[derive(Debug, Default, Clone)]
pub struct FeedbackFilter {
    pub appointment_id: Option<i64>,
    pub rating: Option<i64>,
    pub is_public: Option<bool>,
}

fn decode(row: &Row) -> rusqlite::Result<Feedback> {
    Ok(Feedback {
        id: row.get(0)?,
        user_id: row.get(1)?,
        appointment_id: row.get(2)?,
        rating: row.get(3)?,
        comments: row.get(4)?,
        is_anonymous: row.get(5)?,
        is_public: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Feedback>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM feedback WHERE id = ?1"),
        params![id],
        decode,
    )
}

pub fn exists_for(conn: &Connection, appointment_id: i64, user_id: i64) -> Result<bool> {
    exists(
        conn,
        "SELECT 1 FROM feedback WHERE appointment_id = ?1 AND user_id = ?2",
        params![appointment_id, user_id],
    )
}

pub fn insert(conn: &Connection, f: &Feedback) -> Result<Feedback> {
    conn.execute(
        "INSERT INTO feedback (user_id, appointment_id, rating, comments, is_anonymous, is_public,
                               created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            f.user_id,
            f.appointment_id,
            f.rating,
            f.comments,
            f.is_anonymous,
            f.is_public,
            f.created_at,
            f.updated_at,
        ],
    )?;
    Ok(Feedback {
        id: conn.last_insert_rowid(),
        ..f.clone()
    })
}

pub fn update(conn: &Connection, f: &Feedback) -> Result<()> {
    let updated = conn.execute(
        "UPDATE feedback SET rating = ?2, comments = ?3, is_anonymous = ?4, is_public = ?5,
                updated_at = ?6
         WHERE id = ?1",
        params![f.id, f.rating, f.comments, f.is_anonymous, f.is_public, f.updated_at],
    )?;
    require_row(updated, "feedback", f.id)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.execute("DELETE FROM feedback WHERE id = ?1", params![id])? > 0)
}

pub fn list(conn: &Connection, scope: Scope, filter: &FeedbackFilter) -> Result<Vec<Feedback>> {
    let mut select = Select::new(&format!("SELECT {COLUMNS} FROM feedback"));
    match scope {
        Scope::All => {}
        Scope::AuthorOrPublic(id) => {
            select.and("(user_id = ? OR is_public = 1)", vec![Box::new(id)]);
        }
        Scope::ProviderOrPublic(id) => {
            select.and(
                "(appointment_id IN (SELECT id FROM appointments WHERE provider_id = ?) OR is_public = 1)",
                vec![Box::new(id)],
            );
        }
        other => return Err(StoreError::Other(format!("unsupported feedback scope {other:?}"))),
    }
    select
        .eq("appointment_id", filter.appointment_id)
        .eq("rating", filter.rating)
        .eq("is_public", filter.is_public);
    select.fetch(conn, "created_at DESC, id DESC", decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::tests::{memory, sample_appointment, sample_center, sample_user, ts};
    use crate::repo::{appointments, centers, users};
    use rahati_core::model::Role;

    fn review(user_id: i64, appointment_id: i64, is_public: bool) -> Feedback {
        Feedback {
            id: 0,
            user_id,
            appointment_id,
            rating: 5,
            comments: Some("Great care".into()),
            is_anonymous: false,
            is_public,
            created_at: ts("2030-06-02 00:00:00"),
            updated_at: ts("2030-06-02 00:00:00"),
        }
    }

    #[test]
    fn test_visibility_scopes() {
        let conn = memory();
        let center = centers::insert(&conn, &sample_center("North")).unwrap();
        let provider = users::insert(&conn, &sample_user("doc@example.com", Role::Provider)).unwrap();
        let p1 = users::insert(&conn, &sample_user("p1@example.com", Role::Patient)).unwrap();
        let p2 = users::insert(&conn, &sample_user("p2@example.com", Role::Patient)).unwrap();

        let mut treated = sample_appointment(p1.id, center.id, "2030-06-01 09:00:00");
        treated.provider_id = Some(provider.id);
        let a1 = appointments::insert(&conn, &treated).unwrap();
        let a2 = appointments::insert(&conn, &sample_appointment(p2.id, center.id, "2030-06-01 10:00:00")).unwrap();

        insert(&conn, &review(p1.id, a1.id, false)).unwrap();
        insert(&conn, &review(p2.id, a2.id, false)).unwrap();

        assert_eq!(list(&conn, Scope::AuthorOrPublic(p1.id), &FeedbackFilter::default()).unwrap().len(), 1);
        assert_eq!(list(&conn, Scope::ProviderOrPublic(provider.id), &FeedbackFilter::default()).unwrap().len(), 1);
        assert_eq!(list(&conn, Scope::All, &FeedbackFilter::default()).unwrap().len(), 2);

        assert!(exists_for(&conn, a1.id, p1.id).unwrap());
        assert!(!exists_for(&conn, a1.id, p2.id).unwrap());
    }
}
