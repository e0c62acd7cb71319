//! Per-entity repositories.
//!
//! Each submodule exposes free functions over `&Connection` (a plain
//! connection or an open transaction). Row decoding lives next to the
//! queries; the helpers below cover the columns that need parsing.

pub mod accommodations;
pub mod appointments;
pub mod centers;
pub mod consultations;
pub mod feedback;
pub mod meal_options;
pub mod notifications;
pub mod payments;
pub mod rooms;
pub mod service_capacities;
pub mod tokens;
pub mod transportation;
pub mod users;

use crate::error::{Result, StoreError};
use rusqlite::types::{ToSql, Type};
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Incrementally built `SELECT ... WHERE ... ORDER BY` with positional
/// parameters.
pub(crate) struct Select {
    sql: String,
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl Select {
    pub(crate) fn new(base: &str) -> Self {
        Self {
            sql: base.to_string(),
            clauses: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Add a clause; each `?` in it consumes one of `values`
    pub(crate) fn and(&mut self, clause: &str, values: Vec<Box<dyn ToSql>>) -> &mut Self {
        self.clauses.push(clause.to_string());
        self.params.extend(values);
        self
    }

    /// `column = value` when a value is given
    pub(crate) fn eq<T: ToSql + 'static>(&mut self, column: &str, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.and(&format!("{column} = ?"), vec![Box::new(value)]);
        }
        self
    }

    pub(crate) fn fetch<T>(
        &self,
        conn: &Connection,
        order_by: &str,
        decode: fn(&Row) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let mut sql = self.sql.clone();
        if !self.clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.clauses.join(" AND "));
        }
        if !order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(self.params.iter()), decode)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

pub(crate) fn fetch_one<T, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    decode: fn(&Row) -> rusqlite::Result<T>,
) -> Result<Option<T>> {
    Ok(conn.query_row(sql, params, decode).optional()?)
}

pub(crate) fn exists<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<bool> {
    let found: Option<i64> = conn.query_row(sql, params, |row| row.get(0)).optional()?;
    Ok(found.is_some())
}

/// Money column stored as TEXT
pub(crate) fn decimal(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Status-like TEXT column decoded through the enum's parser
pub(crate) fn text_enum<T>(row: &Row, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(StoreError::Corrupt(format!("unexpected value '{raw}'"))),
        )
    })
}

pub(crate) fn require_row(updated: usize, entity: &str, id: i64) -> Result<()> {
    if updated == 0 {
        return Err(StoreError::Other(format!("{entity} {id} vanished during update")));
    }
    Ok(())
}
