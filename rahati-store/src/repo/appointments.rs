use crate::error::{Result, StoreError};
use crate::repo::{Select, exists, fetch_one, require_row, text_enum};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rahati_core::Scope;
use rahati_core::model::{Appointment, AppointmentStatus};
use rusqlite::{Connection, Row, params};

const COLUMNS: &str = "id, patient_id, center_id, provider_id, appointment_datetime, \
                       appointment_duration, status, notes, created_at, updated_at";

#[derive(Debug, Default, Clone)]
pub struct AppointmentFilter {
    pub center_id: Option<i64>,
    /// Inclusive datetime range
    pub between: Option<(NaiveDateTime, NaiveDateTime)>,
    pub status: Option<AppointmentStatus>,
}

fn decode(row: &Row) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        center_id: row.get(2)?,
        provider_id: row.get(3)?,
        appointment_datetime: row.get(4)?,
        appointment_duration: row.get(5)?,
        status: text_enum(row, 6, AppointmentStatus::parse)?,
        notes: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Appointment>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM appointments WHERE id = ?1"),
        params![id],
        decode,
    )
}

pub fn insert(conn: &Connection, appt: &Appointment) -> Result<Appointment> {
    conn.execute(
        "INSERT INTO appointments (patient_id, center_id, provider_id, appointment_datetime,
                                   appointment_duration, status, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            appt.patient_id,
            appt.center_id,
            appt.provider_id,
            appt.appointment_datetime,
            appt.appointment_duration,
            appt.status.as_str(),
            appt.notes,
            appt.created_at,
            appt.updated_at,
        ],
    )?;
    Ok(Appointment {
        id: conn.last_insert_rowid(),
        ..appt.clone()
    })
}

pub fn update(conn: &Connection, appt: &Appointment) -> Result<()> {
    let updated = conn.execute(
        "UPDATE appointments SET provider_id = ?2, appointment_datetime = ?3,
                appointment_duration = ?4, status = ?5, notes = ?6, updated_at = ?7
         WHERE id = ?1",
        params![
            appt.id,
            appt.provider_id,
            appt.appointment_datetime,
            appt.appointment_duration,
            appt.status.as_str(),
            appt.notes,
            appt.updated_at,
        ],
    )?;
    require_row(updated, "appointment", appt.id)
}

pub fn set_status(
    conn: &Connection,
    id: i64,
    status: AppointmentStatus,
    at: NaiveDateTime,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE appointments SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, status.as_str(), at],
    )?;
    require_row(updated, "appointment", id)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.execute("DELETE FROM appointments WHERE id = ?1", params![id])? > 0)
}

pub fn list(conn: &Connection, scope: Scope, filter: &AppointmentFilter) -> Result<Vec<Appointment>> {
    let mut select = Select::new(&format!("SELECT {COLUMNS} FROM appointments"));
    match scope {
        Scope::All => {}
        Scope::Patient(id) => {
            select.eq("patient_id", Some(id));
        }
        Scope::Provider(id) => {
            select.eq("provider_id", Some(id));
        }
        Scope::Center(id) => {
            select.eq("center_id", Some(id));
        }
        other => return Err(StoreError::Other(format!("unsupported appointment scope {other:?}"))),
    }

    select
        .eq("center_id", filter.center_id)
        .eq("status", filter.status.map(|s| s.as_str()));
    if let Some((start, end)) = filter.between {
        select.and(
            "appointment_datetime BETWEEN ? AND ?",
            vec![Box::new(start), Box::new(end)],
        );
    }
    select.fetch(conn, "appointment_datetime, id", decode)
}

/// Non-cancelled appointments at `center_id` on `date`, restricted to the
/// inclusive time-of-day `window` when one is given.
pub fn count_active(
    conn: &Connection,
    center_id: i64,
    date: NaiveDate,
    window: Option<(NaiveTime, NaiveTime)>,
    exclude_id: Option<i64>,
) -> Result<i64> {
    let mut sql = String::from(
        "SELECT COUNT(*) FROM appointments
         WHERE center_id = ?1 AND date(appointment_datetime) = ?2
           AND status != 'cancelled' AND id != ?3",
    );
    let exclude = exclude_id.unwrap_or(0);

    let count = match window {
        Some((start, end)) => {
            sql.push_str(" AND time(appointment_datetime) BETWEEN ?4 AND ?5");
            conn.query_row(&sql, params![center_id, date, exclude, start, end], |row| row.get(0))?
        }
        None => conn.query_row(&sql, params![center_id, date, exclude], |row| row.get(0))?,
    };
    Ok(count)
}

/// Whether a consultation, payment, accommodation or feedback references the
/// appointment
pub fn has_dependents(conn: &Connection, id: i64) -> Result<bool> {
    exists(
        conn,
        "SELECT 1 WHERE EXISTS (SELECT 1 FROM consultations WHERE appointment_id = ?1)
                     OR EXISTS (SELECT 1 FROM payments WHERE appointment_id = ?1)
                     OR EXISTS (SELECT 1 FROM accommodations WHERE appointment_id = ?1)
                     OR EXISTS (SELECT 1 FROM feedback WHERE appointment_id = ?1)",
        params![id],
    )
}

/// A provider's appointments, newest first, optionally for one patient
pub fn for_provider(conn: &Connection, provider_id: i64, patient_id: Option<i64>) -> Result<Vec<Appointment>> {
    let mut select = Select::new(&format!("SELECT {COLUMNS} FROM appointments"));
    select
        .eq("provider_id", Some(provider_id))
        .eq("patient_id", patient_id);
    select.fetch(conn, "appointment_datetime DESC, id DESC", decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::tests::{day, memory, sample_appointment, sample_center, sample_user, ts};
    use crate::repo::{centers, users};
    use rahati_core::model::Role;

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M:%S").unwrap()
    }

    #[test]
    fn test_count_active_by_day_and_window() {
        let conn = memory();
        let center = centers::insert(&conn, &sample_center("North")).unwrap();
        let patient = users::insert(&conn, &sample_user("p@example.com", Role::Patient)).unwrap();

        for at in ["2030-06-01 09:00:00", "2030-06-01 11:00:00", "2030-06-01 15:00:00"] {
            insert(&conn, &sample_appointment(patient.id, center.id, at)).unwrap();
        }
        let mut cancelled = sample_appointment(patient.id, center.id, "2030-06-01 10:00:00");
        cancelled.status = AppointmentStatus::Cancelled;
        insert(&conn, &cancelled).unwrap();
        insert(&conn, &sample_appointment(patient.id, center.id, "2030-06-02 09:00:00")).unwrap();

        let date = day("2030-06-01");
        assert_eq!(count_active(&conn, center.id, date, None, None).unwrap(), 3);
        let morning = Some((t("09:00:00"), t("12:00:00")));
        assert_eq!(count_active(&conn, center.id, date, morning, None).unwrap(), 2);
        assert_eq!(count_active(&conn, center.id, date, morning, Some(1)).unwrap(), 1);
    }

    #[test]
    fn test_list_scope_and_filters() {
        let conn = memory();
        let north = centers::insert(&conn, &sample_center("North")).unwrap();
        let south = centers::insert(&conn, &sample_center("South")).unwrap();
        let patient = users::insert(&conn, &sample_user("p@example.com", Role::Patient)).unwrap();

        insert(&conn, &sample_appointment(patient.id, north.id, "2030-06-03 09:00:00")).unwrap();
        insert(&conn, &sample_appointment(patient.id, north.id, "2030-06-01 09:00:00")).unwrap();
        insert(&conn, &sample_appointment(patient.id, south.id, "2030-06-02 09:00:00")).unwrap();

        let north_only = list(&conn, Scope::Center(north.id), &AppointmentFilter::default()).unwrap();
        assert_eq!(north_only.len(), 2);
        assert!(north_only[0].appointment_datetime < north_only[1].appointment_datetime);

        let filter = AppointmentFilter {
            between: Some((ts("2030-06-02 00:00:00"), ts("2030-06-03 23:59:59"))),
            ..Default::default()
        };
        assert_eq!(list(&conn, Scope::Patient(patient.id), &filter).unwrap().len(), 2);
        assert!(list(&conn, Scope::Provider(99), &filter).unwrap().is_empty());
    }

    #[test]
    fn test_set_status_and_dependents() {
        let conn = memory();
        let center = centers::insert(&conn, &sample_center("North")).unwrap();
        let patient = users::insert(&conn, &sample_user("p@example.com", Role::Patient)).unwrap();
        let appt = insert(&conn, &sample_appointment(patient.id, center.id, "2030-06-01 09:00:00")).unwrap();

        assert!(!has_dependents(&conn, appt.id).unwrap());
        set_status(&conn, appt.id, AppointmentStatus::Completed, ts("2030-06-01 10:00:00")).unwrap();
        assert_eq!(get(&conn, appt.id).unwrap().unwrap().status, AppointmentStatus::Completed);
    }
}
