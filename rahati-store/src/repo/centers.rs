use crate::error::{Result, StoreError};
use crate::repo::{Select, exists, fetch_one, require_row};
use rahati_core::Scope;
use rahati_core::model::Center;
use rusqlite::{Connection, Row, params};

const COLUMNS: &str = "id, name, description, address, phone, email, website, latitude, longitude, \
                       is_active, created_at, updated_at";

fn decode(row: &Row) -> rusqlite::Result<Center> {
    Ok(Center {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        address: row.get(3)?,
        phone: row.get(4)?,
        email: row.get(5)?,
        website: row.get(6)?,
        latitude: row.get(7)?,
        longitude: row.get(8)?,
        is_active: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Center>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM centers WHERE id = ?1"),
        params![id],
        decode,
    )
}

pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Center>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM centers WHERE name = ?1 ORDER BY id LIMIT 1"),
        params![name],
        decode,
    )
}

pub fn first(conn: &Connection) -> Result<Option<Center>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM centers ORDER BY id LIMIT 1"),
        [],
        decode,
    )
}

pub fn insert(conn: &Connection, center: &Center) -> Result<Center> {
    conn.execute(
        "INSERT INTO centers (name, description, address, phone, email, website, latitude,
                              longitude, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            center.name,
            center.description,
            center.address,
            center.phone,
            center.email,
            center.website,
            center.latitude,
            center.longitude,
            center.is_active,
            center.created_at,
            center.updated_at,
        ],
    )?;
    Ok(Center {
        id: conn.last_insert_rowid(),
        ..center.clone()
    })
}

pub fn update(conn: &Connection, center: &Center) -> Result<()> {
    let updated = conn.execute(
        "UPDATE centers SET name = ?2, description = ?3, address = ?4, phone = ?5, email = ?6,
                website = ?7, latitude = ?8, longitude = ?9, is_active = ?10, updated_at = ?11
         WHERE id = ?1",
        params![
            center.id,
            center.name,
            center.description,
            center.address,
            center.phone,
            center.email,
            center.website,
            center.latitude,
            center.longitude,
            center.is_active,
            center.updated_at,
        ],
    )?;
    require_row(updated, "center", center.id)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.execute("DELETE FROM centers WHERE id = ?1", params![id])? > 0)
}

pub fn list(conn: &Connection, scope: Scope) -> Result<Vec<Center>> {
    let mut select = Select::new(&format!("SELECT {COLUMNS} FROM centers"));
    match scope {
        Scope::All => {}
        Scope::Center(center_id) => {
            select.eq("id", Some(center_id));
        }
        other => return Err(StoreError::Other(format!("unsupported center scope {other:?}"))),
    }
    select.fetch(conn, "name, id", decode)
}

/// Whether appointments, rooms or bound admins still reference the center
pub fn has_dependents(conn: &Connection, id: i64) -> Result<bool> {
    exists(
        conn,
        "SELECT 1 WHERE EXISTS (SELECT 1 FROM appointments WHERE center_id = ?1)
                     OR EXISTS (SELECT 1 FROM rooms WHERE center_id = ?1)
                     OR EXISTS (SELECT 1 FROM users WHERE center_id = ?1)",
        params![id],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{rooms, users};
    use crate::repo::tests::{memory, sample_center, sample_room, sample_user};
    use rahati_core::model::Role;

    #[test]
    fn test_update_and_scope() {
        let conn = memory();
        let mut north = insert(&conn, &sample_center("North")).unwrap();
        insert(&conn, &sample_center("South")).unwrap();

        north.is_active = false;
        update(&conn, &north).unwrap();
        assert!(!get(&conn, north.id).unwrap().unwrap().is_active);

        let scoped = list(&conn, Scope::Center(north.id)).unwrap();
        assert_eq!(scoped.len(), 1);
        assert!(list(&conn, Scope::Patient(1)).is_err());
    }

    #[test]
    fn test_dependents() {
        let conn = memory();
        let center = insert(&conn, &sample_center("North")).unwrap();
        assert!(!has_dependents(&conn, center.id).unwrap());

        rooms::insert(&conn, &sample_room(center.id, "101")).unwrap();
        assert!(has_dependents(&conn, center.id).unwrap());
    }

    #[test]
    fn test_bound_admin_keeps_center() {
        let conn = memory();
        let center = insert(&conn, &sample_center("North")).unwrap();
        let mut admin = sample_user("admin@example.com", Role::Admin);
        admin.center_id = Some(center.id);
        users::insert(&conn, &admin).unwrap();

        assert!(has_dependents(&conn, center.id).unwrap());
        // The row cannot be dropped from under its admin either
        assert!(delete(&conn, center.id).is_err());
    }
}
