use crate::error::{Result, StoreError};
use crate::repo::{Select, fetch_one, require_row, text_enum};
use chrono::NaiveDate;
use rahati_core::Scope;
use rahati_core::model::{TransportationRequest, TransportationStatus};
use rusqlite::{Connection, Row, params};

const COLUMNS: &str = "id, user_id, appointment_id, pickup_location, dropoff_location, pickup_time, \
                       transportation_type, number_of_passengers, status, special_instructions, \
                       created_at, updated_at";

#[derive(Debug, Default, Clone)]
pub struct TransportationFilter {
    pub appointment_id: Option<i64>,
    pub status: Option<TransportationStatus>,
    /// Pickup calendar day
    pub date: Option<NaiveDate>,
}

fn decode(row: &Row) -> rusqlite::Result<TransportationRequest> {
    Ok(TransportationRequest {
        id: row.get(0)?,
        user_id: row.get(1)?,
        appointment_id: row.get(2)?,
        pickup_location: row.get(3)?,
        dropoff_location: row.get(4)?,
        pickup_time: row.get(5)?,
        transportation_type: row.get(6)?,
        number_of_passengers: row.get(7)?,
        status: text_enum(row, 8, TransportationStatus::parse)?,
        special_instructions: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<TransportationRequest>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM transportation_requests WHERE id = ?1"),
        params![id],
        decode,
    )
}

pub fn insert(conn: &Connection, t: &TransportationRequest) -> Result<TransportationRequest> {
    conn.execute(
        "INSERT INTO transportation_requests (user_id, appointment_id, pickup_location,
                dropoff_location, pickup_time, transportation_type, number_of_passengers, status,
                special_instructions, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            t.user_id,
            t.appointment_id,
            t.pickup_location,
            t.dropoff_location,
            t.pickup_time,
            t.transportation_type,
            t.number_of_passengers,
            t.status.as_str(),
            t.special_instructions,
            t.created_at,
            t.updated_at,
        ],
    )?;
    Ok(TransportationRequest {
        id: conn.last_insert_rowid(),
        ..t.clone()
    })
}

pub fn update(conn: &Connection, t: &TransportationRequest) -> Result<()> {
    let updated = conn.execute(
        "UPDATE transportation_requests SET appointment_id = ?2, pickup_location = ?3,
                dropoff_location = ?4, pickup_time = ?5, transportation_type = ?6,
                number_of_passengers = ?7, status = ?8, special_instructions = ?9, updated_at = ?10
         WHERE id = ?1",
        params![
            t.id,
            t.appointment_id,
            t.pickup_location,
            t.dropoff_location,
            t.pickup_time,
            t.transportation_type,
            t.number_of_passengers,
            t.status.as_str(),
            t.special_instructions,
            t.updated_at,
        ],
    )?;
    require_row(updated, "transportation request", t.id)
}

pub fn list(
    conn: &Connection,
    scope: Scope,
    filter: &TransportationFilter,
) -> Result<Vec<TransportationRequest>> {
    let mut select = Select::new(&format!("SELECT {COLUMNS} FROM transportation_requests"));
    match scope {
        Scope::All => {}
        Scope::Author(id) => {
            select.eq("user_id", Some(id));
        }
        other => return Err(StoreError::Other(format!("unsupported transportation scope {other:?}"))),
    }
    select
        .eq("appointment_id", filter.appointment_id)
        .eq("status", filter.status.map(|s| s.as_str()))
        .eq("date(pickup_time)", filter.date);
    select.fetch(conn, "pickup_time, id", decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::tests::{day, memory, sample_user, ts};
    use crate::repo::users;
    use rahati_core::model::Role;
    use rahati_core::model::transportation::DEFAULT_TRANSPORTATION_TYPE;

    fn request(user_id: i64, pickup: &str) -> TransportationRequest {
        TransportationRequest {
            id: 0,
            user_id,
            appointment_id: None,
            pickup_location: "Home".into(),
            dropoff_location: "Clinic".into(),
            pickup_time: ts(pickup),
            transportation_type: DEFAULT_TRANSPORTATION_TYPE.into(),
            number_of_passengers: 1,
            status: TransportationStatus::Pending,
            special_instructions: None,
            created_at: ts("2030-01-01 00:00:00"),
            updated_at: ts("2030-01-01 00:00:00"),
        }
    }

    #[test]
    fn test_author_scope_and_pickup_date() {
        let conn = memory();
        let a = users::insert(&conn, &sample_user("a@example.com", Role::Patient)).unwrap();
        let b = users::insert(&conn, &sample_user("b@example.com", Role::Patient)).unwrap();
        insert(&conn, &request(a.id, "2030-06-02 08:00:00")).unwrap();
        insert(&conn, &request(a.id, "2030-06-01 08:00:00")).unwrap();
        insert(&conn, &request(b.id, "2030-06-01 09:00:00")).unwrap();

        let mine = list(&conn, Scope::Author(a.id), &TransportationFilter::default()).unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine[0].pickup_time < mine[1].pickup_time);

        let filter = TransportationFilter {
            date: Some(day("2030-06-01")),
            ..Default::default()
        };
        assert_eq!(list(&conn, Scope::All, &filter).unwrap().len(), 2);
    }

    #[test]
    fn test_update_status() {
        let conn = memory();
        let a = users::insert(&conn, &sample_user("a@example.com", Role::Patient)).unwrap();
        let mut req = insert(&conn, &request(a.id, "2030-06-02 08:00:00")).unwrap();
        req.status = TransportationStatus::Cancelled;
        update(&conn, &req).unwrap();
        assert_eq!(get(&conn, req.id).unwrap().unwrap().status, TransportationStatus::Cancelled);
    }
}
