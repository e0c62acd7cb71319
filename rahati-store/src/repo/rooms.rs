use crate::error::Result;
use crate::repo::{Select, decimal, exists, fetch_one, require_row};
use rahati_core::model::Room;
use rusqlite::{Connection, Row, params};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

const COLUMNS: &str = "id, center_id, room_number, type, description, price_per_night, capacity, \
                       is_accessible, is_available, created_at, updated_at";

#[derive(Debug, Default, Clone)]
pub struct RoomFilter {
    pub center_id: Option<i64>,
    pub room_type: Option<String>,
    pub is_available: Option<bool>,
    pub is_accessible: Option<bool>,
    pub min_capacity: Option<i64>,
    pub max_price: Option<Decimal>,
}

fn decode(row: &Row) -> rusqlite::Result<Room> {
    Ok(Room {
        id: row.get(0)?,
        center_id: row.get(1)?,
        room_number: row.get(2)?,
        room_type: row.get(3)?,
        description: row.get(4)?,
        price_per_night: decimal(row, 5)?,
        capacity: row.get(6)?,
        is_accessible: row.get(7)?,
        is_available: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Room>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM rooms WHERE id = ?1"),
        params![id],
        decode,
    )
}

pub fn find_by_number(conn: &Connection, center_id: i64, room_number: &str) -> Result<Option<Room>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM rooms WHERE center_id = ?1 AND room_number = ?2"),
        params![center_id, room_number],
        decode,
    )
}

/// Whether another room (not `except_id`) in the center already uses the number
pub fn number_taken(
    conn: &Connection,
    center_id: i64,
    room_number: &str,
    except_id: Option<i64>,
) -> Result<bool> {
    exists(
        conn,
        "SELECT 1 FROM rooms WHERE center_id = ?1 AND room_number = ?2 AND id != ?3",
        params![center_id, room_number, except_id.unwrap_or(0)],
    )
}

pub fn insert(conn: &Connection, room: &Room) -> Result<Room> {
    conn.execute(
        "INSERT INTO rooms (center_id, room_number, type, description, price_per_night, capacity,
                            is_accessible, is_available, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            room.center_id,
            room.room_number,
            room.room_type,
            room.description,
            room.price_per_night.to_string(),
            room.capacity,
            room.is_accessible,
            room.is_available,
            room.created_at,
            room.updated_at,
        ],
    )?;
    Ok(Room {
        id: conn.last_insert_rowid(),
        ..room.clone()
    })
}

pub fn update(conn: &Connection, room: &Room) -> Result<()> {
    let updated = conn.execute(
        "UPDATE rooms SET center_id = ?2, room_number = ?3, type = ?4, description = ?5,
                price_per_night = ?6, capacity = ?7, is_accessible = ?8, is_available = ?9,
                updated_at = ?10
         WHERE id = ?1",
        params![
            room.id,
            room.center_id,
            room.room_number,
            room.room_type,
            room.description,
            room.price_per_night.to_string(),
            room.capacity,
            room.is_accessible,
            room.is_available,
            room.updated_at,
        ],
    )?;
    require_row(updated, "room", room.id)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.execute("DELETE FROM rooms WHERE id = ?1", params![id])? > 0)
}

pub fn list(conn: &Connection, filter: &RoomFilter) -> Result<Vec<Room>> {
    let mut select = Select::new(&format!("SELECT {COLUMNS} FROM rooms"));
    select
        .eq("center_id", filter.center_id)
        .eq("type", filter.room_type.clone())
        .eq("is_available", filter.is_available)
        .eq("is_accessible", filter.is_accessible);
    if let Some(min) = filter.min_capacity {
        select.and("capacity >= ?", vec![Box::new(min)]);
    }
    if let Some(max) = filter.max_price.and_then(|m| m.to_f64()) {
        select.and("CAST(price_per_night AS REAL) <= ?", vec![Box::new(max)]);
    }
    select.fetch(conn, "center_id, room_number", decode)
}

pub fn has_accommodations(conn: &Connection, id: i64) -> Result<bool> {
    exists(
        conn,
        "SELECT 1 FROM accommodations WHERE room_id = ?1 LIMIT 1",
        params![id],
    )
}
