use crate::error::{Result, StoreError};
use crate::repo::{Select, decimal, fetch_one, require_row, text_enum};
use chrono::NaiveDate;
use rahati_core::Scope;
use rahati_core::model::{Accommodation, AccommodationStatus};
use rusqlite::{Connection, Row, params};

const COLUMNS: &str = "id, appointment_id, room_id, meal_option_id, check_in_date, check_out_date, \
                       number_of_guests, total_price, status, special_requests, created_at, updated_at";

#[derive(Debug, Default, Clone)]
pub struct AccommodationFilter {
    pub appointment_id: Option<i64>,
    pub room_id: Option<i64>,
    pub status: Option<AccommodationStatus>,
    /// Stays whose check-in or check-out falls in this inclusive range
    pub between: Option<(NaiveDate, NaiveDate)>,
}

fn decode(row: &Row) -> rusqlite::Result<Accommodation> {
    Ok(Accommodation {
        id: row.get(0)?,
        appointment_id: row.get(1)?,
        room_id: row.get(2)?,
        meal_option_id: row.get(3)?,
        check_in_date: row.get(4)?,
        check_out_date: row.get(5)?,
        number_of_guests: row.get(6)?,
        total_price: decimal(row, 7)?,
        status: text_enum(row, 8, AccommodationStatus::parse)?,
        special_requests: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Accommodation>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM accommodations WHERE id = ?1"),
        params![id],
        decode,
    )
}

pub fn for_appointment(conn: &Connection, appointment_id: i64) -> Result<Option<Accommodation>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM accommodations WHERE appointment_id = ?1"),
        params![appointment_id],
        decode,
    )
}

pub fn insert(conn: &Connection, a: &Accommodation) -> Result<Accommodation> {
    conn.execute(
        "INSERT INTO accommodations (appointment_id, room_id, meal_option_id, check_in_date,
                                     check_out_date, number_of_guests, total_price, status,
                                     special_requests, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            a.appointment_id,
            a.room_id,
            a.meal_option_id,
            a.check_in_date,
            a.check_out_date,
            a.number_of_guests,
            a.total_price.to_string(),
            a.status.as_str(),
            a.special_requests,
            a.created_at,
            a.updated_at,
        ],
    )?;
    Ok(Accommodation {
        id: conn.last_insert_rowid(),
        ..a.clone()
    })
}

pub fn update(conn: &Connection, a: &Accommodation) -> Result<()> {
    let updated = conn.execute(
        "UPDATE accommodations SET room_id = ?2, meal_option_id = ?3, check_in_date = ?4,
                check_out_date = ?5, number_of_guests = ?6, total_price = ?7, status = ?8,
                special_requests = ?9, updated_at = ?10
         WHERE id = ?1",
        params![
            a.id,
            a.room_id,
            a.meal_option_id,
            a.check_in_date,
            a.check_out_date,
            a.number_of_guests,
            a.total_price.to_string(),
            a.status.as_str(),
            a.special_requests,
            a.updated_at,
        ],
    )?;
    require_row(updated, "accommodation", a.id)
}

pub fn list(conn: &Connection, scope: Scope, filter: &AccommodationFilter) -> Result<Vec<Accommodation>> {
    let mut select = Select::new(&format!("SELECT {COLUMNS} FROM accommodations"));
    match scope {
        Scope::All => {}
        Scope::Patient(id) => {
            select.and(
                "appointment_id IN (SELECT id FROM appointments WHERE patient_id = ?)",
                vec![Box::new(id)],
            );
        }
        other => return Err(StoreError::Other(format!("unsupported accommodation scope {other:?}"))),
    }
    select
        .eq("appointment_id", filter.appointment_id)
        .eq("room_id", filter.room_id)
        .eq("status", filter.status.map(|s| s.as_str()));
    if let Some((start, end)) = filter.between {
        select.and(
            "(check_in_date BETWEEN ? AND ? OR check_out_date BETWEEN ? AND ?)",
            vec![Box::new(start), Box::new(end), Box::new(start), Box::new(end)],
        );
    }
    select.fetch(conn, "check_in_date, id", decode)
}

/// Every non-cancelled booking on the room that ends after `from`
pub fn live_for_room(conn: &Connection, room_id: i64, from: NaiveDate) -> Result<Vec<Accommodation>> {
    let mut select = Select::new(&format!("SELECT {COLUMNS} FROM accommodations"));
    select
        .eq("room_id", Some(room_id))
        .and("status != 'cancelled'", vec![])
        .and("check_out_date > ?", vec![Box::new(from)]);
    select.fetch(conn, "check_in_date, id", decode)
}

/// Bookings on the room checking in on or after `today`
pub fn upcoming_for_room(conn: &Connection, room_id: i64, today: NaiveDate) -> Result<Vec<Accommodation>> {
    let mut select = Select::new(&format!("SELECT {COLUMNS} FROM accommodations"));
    select
        .eq("room_id", Some(room_id))
        .and("check_in_date >= ?", vec![Box::new(today)]);
    select.fetch(conn, "check_in_date, id", decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::tests::{day, memory, sample_appointment, sample_center, sample_room, sample_user, ts};
    use crate::repo::{appointments, centers, rooms, users};
    use rahati_core::model::Role;
    use rust_decimal::Decimal;

    fn stay(appointment_id: i64, room_id: i64, check_in: &str, check_out: &str) -> Accommodation {
        Accommodation {
            id: 0,
            appointment_id,
            room_id,
            meal_option_id: None,
            check_in_date: day(check_in),
            check_out_date: day(check_out),
            number_of_guests: 1,
            total_price: Decimal::from(100),
            status: AccommodationStatus::Reserved,
            special_requests: None,
            created_at: ts("2030-01-01 00:00:00"),
            updated_at: ts("2030-01-01 00:00:00"),
        }
    }

    #[test]
    fn test_live_and_upcoming_for_room() {
        let conn = memory();
        let center = centers::insert(&conn, &sample_center("North")).unwrap();
        let room = rooms::insert(&conn, &sample_room(center.id, "101")).unwrap();
        let patient = users::insert(&conn, &sample_user("p@example.com", Role::Patient)).unwrap();
        let mut appts = Vec::new();
        for at in ["2030-06-01 09:00:00", "2030-06-10 09:00:00", "2030-05-01 09:00:00"] {
            appts.push(appointments::insert(&conn, &sample_appointment(patient.id, center.id, at)).unwrap());
        }

        insert(&conn, &stay(appts[0].id, room.id, "2030-06-01", "2030-06-04")).unwrap();
        let mut cancelled = stay(appts[1].id, room.id, "2030-06-10", "2030-06-12");
        cancelled.status = AccommodationStatus::Cancelled;
        insert(&conn, &cancelled).unwrap();
        insert(&conn, &stay(appts[2].id, room.id, "2030-05-01", "2030-05-03")).unwrap();

        let live = live_for_room(&conn, room.id, day("2030-05-20")).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].check_in_date, day("2030-06-01"));

        let upcoming = upcoming_for_room(&conn, room.id, day("2030-06-01")).unwrap();
        assert_eq!(upcoming.len(), 2);

        let filter = AccommodationFilter {
            between: Some((day("2030-06-03"), day("2030-06-05"))),
            ..Default::default()
        };
        assert_eq!(list(&conn, Scope::Patient(patient.id), &filter).unwrap().len(), 1);
        assert_eq!(for_appointment(&conn, appts[0].id).unwrap().unwrap().room_id, room.id);
    }
}
