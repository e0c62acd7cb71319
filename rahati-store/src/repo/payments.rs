use crate::error::{Result, StoreError};
use crate::repo::{Select, decimal, fetch_one, require_row, text_enum};
use rahati_core::Scope;
use rahati_core::model::{Payment, PaymentStatus};
use rusqlite::{Connection, Row, params};

const COLUMNS: &str = "id, appointment_id, amount, payment_method, transaction_id, status, \
                       payment_date, notes, created_at, updated_at";

#[derive(Debug, Default, Clone)]
pub struct PaymentFilter {
    pub appointment_id: Option<i64>,
    pub status: Option<PaymentStatus>,
    pub payment_method: Option<String>,
}

fn decode(row: &Row) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        appointment_id: row.get(1)?,
        amount: decimal(row, 2)?,
        payment_method: row.get(3)?,
        transaction_id: row.get(4)?,
        status: text_enum(row, 5, PaymentStatus::parse)?,
        payment_date: row.get(6)?,
        notes: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Payment>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM payments WHERE id = ?1"),
        params![id],
        decode,
    )
}

pub fn for_appointment(conn: &Connection, appointment_id: i64) -> Result<Option<Payment>> {
    fetch_one(
        conn,
        &format!("SELECT {COLUMNS} FROM payments WHERE appointment_id = ?1"),
        params![appointment_id],
        decode,
    )
}

pub fn insert(conn: &Connection, p: &Payment) -> Result<Payment> {
    conn.execute(
        "INSERT INTO payments (appointment_id, amount, payment_method, transaction_id, status,
                               payment_date, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            p.appointment_id,
            p.amount.to_string(),
            p.payment_method,
            p.transaction_id,
            p.status.as_str(),
            p.payment_date,
            p.notes,
            p.created_at,
            p.updated_at,
        ],
    )?;
    Ok(Payment {
        id: conn.last_insert_rowid(),
        ..p.clone()
    })
}

pub fn update(conn: &Connection, p: &Payment) -> Result<()> {
    let updated = conn.execute(
        "UPDATE payments SET amount = ?2, payment_method = ?3, transaction_id = ?4, status = ?5,
                payment_date = ?6, notes = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            p.id,
            p.amount.to_string(),
            p.payment_method,
            p.transaction_id,
            p.status.as_str(),
            p.payment_date,
            p.notes,
            p.updated_at,
        ],
    )?;
    require_row(updated, "payment", p.id)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.execute("DELETE FROM payments WHERE id = ?1", params![id])? > 0)
}

pub fn list(conn: &Connection, scope: Scope, filter: &PaymentFilter) -> Result<Vec<Payment>> {
    let mut select = Select::new(&format!("SELECT {COLUMNS} FROM payments"));
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
        other => return Err(StoreError::Other(format!("unsupported payment scope {other:?}"))),
    }
    select
        .eq("appointment_id", filter.appointment_id)
        .eq("status", filter.status.map(|s| s.as_str()))
        .eq("payment_method", filter.payment_method.clone());
    select.fetch(conn, "created_at DESC, id DESC", decode)
}
