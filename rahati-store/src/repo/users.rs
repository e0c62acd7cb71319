use crate::error::Result;
use crate::repo::{Select, exists, fetch_one, require_row, text_enum};
use rahati_core::Scope;
use rahati_core::model::{Role, User};
use rusqlite::{Connection, Row, params};

const COLUMNS: &str = "id, name, email, password_hash, role, phone, address, caregiver_name, \
                       caregiver_phone, center_id, created_at, updated_at";

fn decode(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: text_enum(row, 4, Role::parse)?,
        phone: row.get(5)?,
        address: row.get(6)?,
        caregiver_name: row.get(7)?,
        caregiver_phone: row.get(8)?,
        center_id: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<User>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        decode,
    )
}

pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM users WHERE email = ?1"),
        params![email],
        decode,
    )
}

/// Whether another account (not `except_id`) already uses `email`
pub fn email_taken(conn: &Connection, email: &str, except_id: Option<i64>) -> Result<bool> {
    exists(
        conn,
        "SELECT 1 FROM users WHERE email = ?1 AND id != ?2",
        params![email, except_id.unwrap_or(0)],
    )
}

pub fn insert(conn: &Connection, user: &User) -> Result<User> {
    conn.execute(
        "INSERT INTO users (name, email, password_hash, role, phone, address, caregiver_name,
                            caregiver_phone, center_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            user.name,
            user.email,
            user.password_hash,
            user.role.as_str(),
            user.phone,
            user.address,
            user.caregiver_name,
            user.caregiver_phone,
            user.center_id,
            user.created_at,
            user.updated_at,
        ],
    )?;
    Ok(User {
        id: conn.last_insert_rowid(),
        ..user.clone()
    })
}

pub fn update(conn: &Connection, user: &User) -> Result<()> {
    let updated = conn.execute(
        "UPDATE users SET name = ?2, email = ?3, password_hash = ?4, role = ?5, phone = ?6,
                address = ?7, caregiver_name = ?8, caregiver_phone = ?9, center_id = ?10,
                updated_at = ?11
         WHERE id = ?1",
        params![
            user.id,
            user.name,
            user.email,
            user.password_hash,
            user.role.as_str(),
            user.phone,
            user.address,
            user.caregiver_name,
            user.caregiver_phone,
            user.center_id,
            user.updated_at,
        ],
    )?;
    require_row(updated, "user", user.id)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.execute("DELETE FROM users WHERE id = ?1", params![id])? > 0)
}

pub fn list(conn: &Connection, scope: Scope) -> Result<Vec<User>> {
    let mut select = Select::new(&format!("SELECT {COLUMNS} FROM users"));
    if let Scope::CenterDirectory(center_id) = scope {
        select.and(
            "(role IN ('Patient', 'Provider') OR (role = 'Admin' AND center_id = ?))",
            vec![Box::new(center_id)],
        );
    }
    select.fetch(conn, "id", decode)
}

/// Distinct patients with at least one appointment assigned to `provider_id`
pub fn patients_of_provider(conn: &Connection, provider_id: i64) -> Result<Vec<User>> {
    let mut select = Select::new(&format!("SELECT {COLUMNS} FROM users"));
    select.and(
        "role = 'Patient' AND id IN (SELECT patient_id FROM appointments WHERE provider_id = ?)",
        vec![Box::new(provider_id)],
    );
    select.fetch(conn, "name, id", decode)
}

pub fn treats_patient(conn: &Connection, provider_id: i64, patient_id: i64) -> Result<bool> {
    exists(
        conn,
        "SELECT 1 FROM appointments WHERE provider_id = ?1 AND patient_id = ?2 LIMIT 1",
        params![provider_id, patient_id],
    )
}

/// Whether the user appears on appointments, transportation requests or
/// feedback. Such accounts are kept for the record.
pub fn has_history(conn: &Connection, id: i64) -> Result<bool> {
    exists(
        conn,
        "SELECT 1 WHERE EXISTS (SELECT 1 FROM appointments WHERE patient_id = ?1 OR provider_id = ?1)
                     OR EXISTS (SELECT 1 FROM transportation_requests WHERE user_id = ?1)
                     OR EXISTS (SELECT 1 FROM feedback WHERE user_id = ?1)",
        params![id],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::tests::{memory, sample_appointment, sample_center, sample_user};
    use crate::repo::{appointments, centers};

    #[test]
    fn test_insert_and_lookup() {
        let conn = memory();
        let user = insert(&conn, &sample_user("amina@example.com", Role::Patient)).unwrap();
        assert!(user.id > 0);

        let found = find_by_email(&conn, "amina@example.com").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.role, Role::Patient);

        assert!(email_taken(&conn, "amina@example.com", None).unwrap());
        assert!(!email_taken(&conn, "amina@example.com", Some(user.id)).unwrap());
    }

    #[test]
    fn test_center_directory_scope() {
        let conn = memory();
        let north = centers::insert(&conn, &sample_center("North")).unwrap();
        let south = centers::insert(&conn, &sample_center("South")).unwrap();

        insert(&conn, &sample_user("p@example.com", Role::Patient)).unwrap();
        insert(&conn, &sample_user("s@example.com", Role::Superuser)).unwrap();
        let mut own = sample_user("a1@example.com", Role::Admin);
        own.center_id = Some(north.id);
        insert(&conn, &own).unwrap();
        let mut other = sample_user("a2@example.com", Role::Admin);
        other.center_id = Some(south.id);
        insert(&conn, &other).unwrap();

        let visible = list(&conn, Scope::CenterDirectory(north.id)).unwrap();
        let emails: Vec<_> = visible.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["p@example.com", "a1@example.com"]);
        assert_eq!(list(&conn, Scope::All).unwrap().len(), 4);
    }

    #[test]
    fn test_patients_of_provider() {
        let conn = memory();
        let center = centers::insert(&conn, &sample_center("North")).unwrap();
        let provider = insert(&conn, &sample_user("doc@example.com", Role::Provider)).unwrap();
        let treated = insert(&conn, &sample_user("t@example.com", Role::Patient)).unwrap();
        let other = insert(&conn, &sample_user("o@example.com", Role::Patient)).unwrap();

        for at in ["2030-06-01 09:00:00", "2030-06-02 09:00:00"] {
            let mut appt = sample_appointment(treated.id, center.id, at);
            appt.provider_id = Some(provider.id);
            appointments::insert(&conn, &appt).unwrap();
        }
        appointments::insert(&conn, &sample_appointment(other.id, center.id, "2030-06-01 10:00:00")).unwrap();

        let patients = patients_of_provider(&conn, provider.id).unwrap();
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].id, treated.id);
        assert!(treats_patient(&conn, provider.id, treated.id).unwrap());
        assert!(!treats_patient(&conn, provider.id, other.id).unwrap());
    }

    #[test]
    fn test_history_blocks_deletion() {
        let conn = memory();
        let center = centers::insert(&conn, &sample_center("North")).unwrap();
        let patient = insert(&conn, &sample_user("p@example.com", Role::Patient)).unwrap();
        let fresh = insert(&conn, &sample_user("f@example.com", Role::Patient)).unwrap();
        appointments::insert(&conn, &sample_appointment(patient.id, center.id, "2030-06-01 09:00:00")).unwrap();

        assert!(has_history(&conn, patient.id).unwrap());
        assert!(!has_history(&conn, fresh.id).unwrap());
        assert!(delete(&conn, patient.id).is_err());
        assert_eq!(appointments::list(&conn, Scope::All, &Default::default()).unwrap().len(), 1);
        assert!(delete(&conn, fresh.id).unwrap());
    }
}
