use crate::error::{Result, StoreError};
use crate::repo::{Select, fetch_one, require_row, text_enum};
use rahati_core::Scope;
use rahati_core::model::{Consultation, ConsultationStatus};
use rusqlite::{Connection, Row, params};

const COLUMNS: &str = "id, appointment_id, start_time, end_time, provider_notes, diagnosis, \
                       treatment_plan, status, created_at, updated_at";

#[derive(Debug, Default, Clone)]
pub struct ConsultationFilter {
    pub appointment_id: Option<i64>,
    pub status: Option<ConsultationStatus>,
}

fn decode(row: &Row) -> rusqlite::Result<Consultation> {
    Ok(Consultation {
        id: row.get(0)?,
        appointment_id: row.get(1)?,
        start_time: row.get(2)?,
        end_time: row.get(3)?,
        provider_notes: row.get(4)?,
        diagnosis: row.get(5)?,
        treatment_plan: row.get(6)?,
        status: text_enum(row, 7, ConsultationStatus::parse)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Consultation>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM consultations WHERE id = ?1"),
        params![id],
        decode,
    )
}

pub fn for_appointment(conn: &Connection, appointment_id: i64) -> Result<Option<Consultation>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM consultations WHERE appointment_id = ?1"),
        params![appointment_id],
        decode,
    )
}

pub fn insert(conn: &Connection, c: &Consultation) -> Result<Consultation> {
    conn.execute(
        "INSERT INTO consultations (appointment_id, start_time, end_time, provider_notes,
                                    diagnosis, treatment_plan, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            c.appointment_id,
            c.start_time,
            c.end_time,
            c.provider_notes,
            c.diagnosis,
            c.treatment_plan,
            c.status.as_str(),
            c.created_at,
            c.updated_at,
        ],
    )?;
    Ok(Consultation {
        id: conn.last_insert_rowid(),
        ..c.clone()
    })
}

pub fn update(conn: &Connection, c: &Consultation) -> Result<()> {
    let updated = conn.execute(
        "UPDATE consultations SET start_time = ?2, end_time = ?3, provider_notes = ?4,
                diagnosis = ?5, treatment_plan = ?6, status = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            c.id,
            c.start_time,
            c.end_time,
            c.provider_notes,
            c.diagnosis,
            c.treatment_plan,
            c.status.as_str(),
            c.updated_at,
        ],
    )?;
    require_row(updated, "consultation", c.id)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.execute("DELETE FROM consultations WHERE id = ?1", params![id])? > 0)
}

pub fn list(conn: &Connection, scope: Scope, filter: &ConsultationFilter) -> Result<Vec<Consultation>> {
    let mut select = Select::new(&format!("SELECT {COLUMNS} FROM consultations"));
    match scope {
        Scope::All => {}
        Scope::Patient(id) => {
            select.and(
                "appointment_id IN (SELECT id FROM appointments WHERE patient_id = ?)",
                vec![Box::new(id)],
            );
        }
        Scope::Provider(id) => {
            select.and(
                "appointment_id IN (SELECT id FROM appointments WHERE provider_id = ?)",
                vec![Box::new(id)],
            );
        }
        other => return Err(StoreError::Other(format!("unsupported consultation scope {other:?}"))),
    }
    select
        .eq("appointment_id", filter.appointment_id)
        .eq("status", filter.status.map(|s| s.as_str()));
    select.fetch(conn, "start_time DESC, id DESC", decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::tests::{memory, sample_appointment, sample_center, sample_user, ts};
    use crate::repo::{appointments, centers, users};
    use rahati_core::model::Role;

    fn consultation(appointment_id: i64, start: &str) -> Consultation {
        Consultation {
            id: 0,
            appointment_id,
            start_time: ts(start),
            end_time: None,
            provider_notes: None,
            diagnosis: Some("Routine check".into()),
            treatment_plan: None,
            status: ConsultationStatus::InProgress,
            created_at: ts(start),
            updated_at: ts(start),
        }
    }

    #[test]
    fn test_one_per_appointment_and_patient_scope() {
        let conn = memory();
        let center = centers::insert(&conn, &sample_center("North")).unwrap();
        let p1 = users::insert(&conn, &sample_user("p1@example.com", Role::Patient)).unwrap();
        let p2 = users::insert(&conn, &sample_user("p2@example.com", Role::Patient)).unwrap();
        let a1 = appointments::insert(&conn, &sample_appointment(p1.id, center.id, "2030-06-01 09:00:00")).unwrap();
        let a2 = appointments::insert(&conn, &sample_appointment(p2.id, center.id, "2030-06-01 10:00:00")).unwrap();

        let c1 = insert(&conn, &consultation(a1.id, "2030-06-01 09:05:00")).unwrap();
        insert(&conn, &consultation(a2.id, "2030-06-01 10:05:00")).unwrap();
        // Unique index on appointment_id
        assert!(insert(&conn, &consultation(a1.id, "2030-06-01 09:30:00")).is_err());

        assert_eq!(for_appointment(&conn, a1.id).unwrap().unwrap().id, c1.id);
        let own = list(&conn, Scope::Patient(p1.id), &ConsultationFilter::default()).unwrap();
        assert_eq!(own.len(), 1);
        let all = list(&conn, Scope::All, &ConsultationFilter::default()).unwrap();
        // Newest start first
        assert_eq!(all[0].appointment_id, a2.id);
    }
}
