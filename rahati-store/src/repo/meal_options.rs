use crate::error::Result;
use crate::repo::{Select, decimal, exists, fetch_one, require_row};
use rahati_core::model::MealOption;
use rusqlite::{Connection, Row, params};

const COLUMNS: &str = "id, name, description, price, is_vegetarian, is_vegan, is_gluten_free, \
                       is_active, created_at, updated_at";

#[derive(Debug, Default, Clone)]
pub struct MealOptionFilter {
    pub is_active: Option<bool>,
    pub is_vegetarian: Option<bool>,
    pub is_vegan: Option<bool>,
    pub is_gluten_free: Option<bool>,
}

fn decode(row: &Row) -> rusqlite::Result<MealOption> {
    Ok(MealOption {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: decimal(row, 3)?,
        is_vegetarian: row.get(4)?,
        is_vegan: row.get(5)?,
        is_gluten_free: row.get(6)?,
        is_active: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<MealOption>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM meal_options WHERE id = ?1"),
        params![id],
        decode,
    )
}

pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<MealOption>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM meal_options WHERE name = ?1 ORDER BY id LIMIT 1"),
        params![name],
        decode,
    )
}

pub fn insert(conn: &Connection, m: &MealOption) -> Result<MealOption> {
    conn.execute(
        "INSERT INTO meal_options (name, description, price, is_vegetarian, is_vegan,
                                   is_gluten_free, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            m.name,
            m.description,
            m.price.to_string(),
            m.is_vegetarian,
            m.is_vegan,
            m.is_gluten_free,
            m.is_active,
            m.created_at,
            m.updated_at,
        ],
    )?;
    Ok(MealOption {
        id: conn.last_insert_rowid(),
        ..m.clone()
    })
}

pub fn update(conn: &Connection, m: &MealOption) -> Result<()> {
    let updated = conn.execute(
        "UPDATE meal_options SET name = ?2, description = ?3, price = ?4, is_vegetarian = ?5,
                is_vegan = ?6, is_gluten_free = ?7, is_active = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            m.id,
            m.name,
            m.description,
            m.price.to_string(),
            m.is_vegetarian,
            m.is_vegan,
            m.is_gluten_free,
            m.is_active,
            m.updated_at,
        ],
    )?;
    require_row(updated, "meal option", m.id)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.execute("DELETE FROM meal_options WHERE id = ?1", params![id])? > 0)
}

pub fn list(conn: &Connection, filter: &MealOptionFilter) -> Result<Vec<MealOption>> {
    let mut select = Select::new(&format!("SELECT {COLUMNS} FROM meal_options"));
    select
        .eq("is_active", filter.is_active)
        .eq("is_vegetarian", filter.is_vegetarian)
        .eq("is_vegan", filter.is_vegan)
        .eq("is_gluten_free", filter.is_gluten_free);
    select.fetch(conn, "name, id", decode)
}

pub fn is_referenced(conn: &Connection, id: i64) -> Result<bool> {
    exists(
        conn,
        "SELECT 1 FROM accommodations WHERE meal_option_id = ?1 LIMIT 1",
        params![id],
    )
}
