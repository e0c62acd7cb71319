use crate::error::Result;
use crate::repo::{Select, exists, fetch_one, require_row};
use chrono::{NaiveDate, NaiveTime};
use rahati_core::model::ServiceCapacity;
use rusqlite::{Connection, Row, params};

const COLUMNS: &str = "id, center_id, service_type, max_capacity, date, start_time, end_time, \
                       is_active, notes, created_at, updated_at";

#[derive(Debug, Default, Clone)]
pub struct CapacityFilter {
    pub center_id: Option<i64>,
    pub service_type: Option<String>,
    pub date: Option<NaiveDate>,
    pub between: Option<(NaiveDate, NaiveDate)>,
    pub is_active: Option<bool>,
}

fn decode(row: &Row) -> rusqlite::Result<ServiceCapacity> {
    Ok(ServiceCapacity {
        id: row.get(0)?,
        center_id: row.get(1)?,
        service_type: row.get(2)?,
        max_capacity: row.get(3)?,
        date: row.get(4)?,
        start_time: row.get(5)?,
        end_time: row.get(6)?,
        is_active: row.get(7)?,
        notes: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<ServiceCapacity>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM service_capacities WHERE id = ?1"),
        params![id],
        decode,
    )
}

pub fn insert(conn: &Connection, c: &ServiceCapacity) -> Result<ServiceCapacity> {
    conn.execute(
        "INSERT INTO service_capacities (center_id, service_type, max_capacity, date, start_time,
                                         end_time, is_active, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            c.center_id,
            c.service_type,
            c.max_capacity,
            c.date,
            c.start_time,
            c.end_time,
            c.is_active,
            c.notes,
            c.created_at,
            c.updated_at,
        ],
    )?;
    Ok(ServiceCapacity {
        id: conn.last_insert_rowid(),
        ..c.clone()
    })
}

pub fn update(conn: &Connection, c: &ServiceCapacity) -> Result<()> {
    let updated = conn.execute(
        "UPDATE service_capacities SET center_id = ?2, service_type = ?3, max_capacity = ?4,
                date = ?5, start_time = ?6, end_time = ?7, is_active = ?8, notes = ?9,
                updated_at = ?10
         WHERE id = ?1",
        params![
            c.id,
            c.center_id,
            c.service_type,
            c.max_capacity,
            c.date,
            c.start_time,
            c.end_time,
            c.is_active,
            c.notes,
            c.updated_at,
        ],
    )?;
    require_row(updated, "service capacity", c.id)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.execute("DELETE FROM service_capacities WHERE id = ?1", params![id])? > 0)
}

pub fn list(conn: &Connection, filter: &CapacityFilter) -> Result<Vec<ServiceCapacity>> {
    let mut select = Select::new(&format!("SELECT {COLUMNS} FROM service_capacities"));
    select
        .eq("center_id", filter.center_id)
        .eq("service_type", filter.service_type.clone())
        .eq("date", filter.date)
        .eq("is_active", filter.is_active);
    if let Some((start, end)) = filter.between {
        select.and("date BETWEEN ? AND ?", vec![Box::new(start), Box::new(end)]);
    }
    select.fetch(conn, "date, start_time, id", decode)
}

/// Every rule for one center, service and day
pub fn for_day(
    conn: &Connection,
    center_id: i64,
    service_type: &str,
    date: NaiveDate,
) -> Result<Vec<ServiceCapacity>> {
    list(
        conn,
        &CapacityFilter {
            center_id: Some(center_id),
            service_type: Some(service_type.to_string()),
            date: Some(date),
            ..Default::default()
        },
    )
}

/// Whether another rule (not `except_id`) covers the identical window.
/// Two absent bounds count as the same window.
pub fn window_taken(
    conn: &Connection,
    center_id: i64,
    service_type: &str,
    date: NaiveDate,
    window: (Option<NaiveTime>, Option<NaiveTime>),
    except_id: Option<i64>,
) -> Result<bool> {
    exists(
        conn,
        "SELECT 1 FROM service_capacities
         WHERE center_id = ?1 AND service_type = ?2 AND date = ?3
           AND start_time IS ?4 AND end_time IS ?5 AND id != ?6",
        params![center_id, service_type, date, window.0, window.1, except_id.unwrap_or(0)],
    )
}
