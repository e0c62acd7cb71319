use axum::{
    extract::{Path, Request, State},
    response::{Json, Response},
    Extension,
};
use rahati_core::model::{self, money, Payment, PaymentStatus};
use rahati_core::policy::{self, authorize, authorize_or, Kind};
use rahati_core::{Action, Presence, RahatiError, Validator};
use rahati_store::repo::{appointments, payments};
use rust_decimal::Decimal;
use rusqlite::Connection;
use serde_json::Value;
use std::sync::Arc;

use super::appointments::appointment_view;
use super::{appointment_relations, created, embed, extract_body, found, message, QueryParams};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

fn view(conn: &Connection, payment: &Payment) -> rahati_core::Result<Value> {
    let appointment = appointment_view(conn, payment.appointment_id)?;
    embed(payment, vec![("appointment", appointment)])
}

/// GET /api/payments
pub async fn index(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    params: QueryParams,
) -> ApiResult<Json<Vec<Value>>> {
    let scope = policy::list_scope(Kind::Payment, &auth.actor())?;
    let filter = payments::PaymentFilter {
        appointment_id: params.int("appointment_id")?,
        status: params.one_of("status", PaymentStatus::parse)?,
        payment_method: params.text("payment_method"),
    };

    let list = state.store.read(|conn| -> rahati_core::Result<_> {
        payments::list(conn, scope, &filter)?
            .iter()
            .map(|p| view(conn, p))
            .collect()
    })?;
    Ok(Json(list))
}

/// POST /api/payments
pub async fn store(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    request: Request,
) -> ApiResult<Response> {
    let actor = auth.actor();
    let body = extract_body(request).await?;

    let (payment, body) = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut v = Validator::new(&body);
        let appointment_id = v.integer("appointment_id", Presence::Required, None, None);
        let amount = v.decimal("amount", Presence::Required, Some(Decimal::ZERO));
        let payment_method = v.string("payment_method", Presence::Required, 255);
        let transaction_id = v.string("transaction_id", Presence::Nullable, 255);
        let status = v.one_of("status", Presence::Sometimes, PaymentStatus::parse);
        let payment_date = v.datetime("payment_date", Presence::Nullable);
        let notes = v.text("notes", Presence::Nullable);
        if let Some(id) = appointment_id {
            v.exists("appointment_id", appointments::get(conn, id)?.is_some());
        }
        v.finish()?;

        let appointment_id = appointment_id.unwrap_or_default();
        let appointment = found(appointments::get(conn, appointment_id)?, "Appointment", appointment_id)?;
        authorize_or(
            Kind::Payment,
            Action::Create,
            &actor,
            &appointment_relations(&actor, &appointment),
            "Unauthorized to make payment for this appointment",
        )?;
        if payments::for_appointment(conn, appointment_id)?.is_some() {
            return Err(RahatiError::rejected("A payment already exists for this appointment"));
        }

        let now = model::now();
        let payment = payments::insert(
            conn,
            &Payment {
                id: 0,
                appointment_id,
                amount: money(amount.unwrap_or_default()),
                payment_method: payment_method.unwrap_or_default(),
                transaction_id,
                status: status.unwrap_or(PaymentStatus::Pending),
                payment_date: Some(payment_date.unwrap_or(now)),
                notes,
                created_at: now,
                updated_at: now,
            },
        )?;
        let body = view(conn, &payment)?;
        Ok((payment, body))
    })?;

    tracing::info!(
        payment_id = payment.id,
        appointment_id = payment.appointment_id,
        amount = %payment.amount,
        "Payment recorded"
    );
    created(payment.id, &body)
}

/// GET /api/payments/{id}
pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let actor = auth.actor();
    let body = state.store.read(|conn| -> rahati_core::Result<_> {
        let payment = found(payments::get(conn, id)?, "Payment", id)?;
        let appointment = found(
            appointments::get(conn, payment.appointment_id)?,
            "Appointment",
            payment.appointment_id,
        )?;
        authorize(Kind::Payment, Action::View, &actor, &appointment_relations(&actor, &appointment))?;
        view(conn, &payment)
    })?;
    Ok(Json(body))
}

/// PUT|PATCH /api/payments/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    request: Request,
) -> ApiResult<Json<Value>> {
    authorize(Kind::Payment, Action::Update, &auth.actor(), &[])?;
    let body = extract_body(request).await?;

    let body = state.store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut payment = found(payments::get(conn, id)?, "Payment", id)?;

        let mut v = Validator::new(&body);
        let amount = v.decimal("amount", Presence::Sometimes, Some(Decimal::ZERO));
        let payment_method = v.string("payment_method", Presence::Sometimes, 255);
        let transaction_id = v.string("transaction_id", Presence::Nullable, 255);
        let status = v.one_of("status", Presence::Sometimes, PaymentStatus::parse);
        let payment_date = v.datetime("payment_date", Presence::Nullable);
        let notes = v.text("notes", Presence::Nullable);
        v.finish()?;

        if let Some(amount) = amount {
            payment.amount = money(amount);
        }
        if let Some(method) = payment_method {
            payment.payment_method = method;
        }
        if body.get("transaction_id").is_some() {
            payment.transaction_id = transaction_id;
        }
        if let Some(status) = status {
            payment.status = status;
        }
        if body.get("payment_date").is_some() {
            payment.payment_date = payment_date;
        }
        if body.get("notes").is_some() {
            payment.notes = notes;
        }
        payment.updated_at = model::now();

        payments::update(conn, &payment)?;
        view(conn, &payment)
    })?;

    Ok(Json(body))
}

/// DELETE /api/payments/{id}
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    authorize(Kind::Payment, Action::Delete, &auth.actor(), &[])?;

    state.store.read(|conn| -> rahati_core::Result<_> {
        found(payments::get(conn, id)?, "Payment", id)?;
        payments::delete(conn, id)?;
        Ok(())
    })?;

    tracing::info!(payment_id = id, "Payment deleted");
    Ok(message("Payment deleted successfully"))
}
