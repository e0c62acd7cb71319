//! rahati - healthcare facility booking server
//!
//! JSON REST API over the booking store: accounts, centers, appointments
//! and everything hanging off them.

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;

use axum::{
    http::Method,
    routing::{get, patch, post},
    Router,
};
use rahati_store::{AuditLog, SqliteStore};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use handlers::{
    accommodations, appointments, centers, consultations, feedback, meal_options, metadata, notifications,
    payments, rooms, service_capacity, transportation, users,
};

/// Application state
pub struct AppState {
    pub store: SqliteStore,
    pub audit: Arc<Mutex<AuditLog>>,
    pub config: config::ServerConfig,
    pub tokens: auth::TokenService,
}

/// Build the application router with all routes and middleware
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let api = Router::new()
        // Auth
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/user", get(handlers::auth::current_user))
        // Users
        .route("/users", get(users::index).post(users::store))
        .route(
            "/users/{id}",
            get(users::show).put(users::update).patch(users::update).delete(users::destroy),
        )
        .route("/my-patients", get(users::my_patients))
        .route("/my-patients-detailed", get(users::my_patients_detailed))
        .route("/patient-details/{id}", get(users::patient_details))
        // Centers
        .route("/centers", get(centers::index).post(centers::store))
        .route(
            "/centers/{id}",
            get(centers::show).put(centers::update).patch(centers::update).delete(centers::destroy),
        )
        // Appointments
        .route("/appointments", get(appointments::index).post(appointments::store))
        .route(
            "/appointments/{id}",
            get(appointments::show)
                .put(appointments::update)
                .patch(appointments::update)
                .delete(appointments::destroy),
        )
        // Consultations
        .route("/consultations", get(consultations::index).post(consultations::store))
        .route(
            "/consultations/{id}",
            get(consultations::show)
                .put(consultations::update)
                .patch(consultations::update)
                .delete(consultations::destroy),
        )
        // Payments
        .route("/payments", get(payments::index).post(payments::store))
        .route(
            "/payments/{id}",
            get(payments::show).put(payments::update).patch(payments::update).delete(payments::destroy),
        )
        // Meal options
        .route("/meal-options", get(meal_options::index).post(meal_options::store))
        .route(
            "/meal-options/{id}",
            get(meal_options::show)
                .put(meal_options::update)
                .patch(meal_options::update)
                .delete(meal_options::destroy),
        )
        // Rooms
        .route("/rooms", get(rooms::index).post(rooms::store))
        .route(
            "/rooms/{id}",
            get(rooms::show).put(rooms::update).patch(rooms::update).delete(rooms::destroy),
        )
        // Accommodations
        .route("/accommodations", get(accommodations::index).post(accommodations::store))
        .route(
            "/accommodations/{id}",
            get(accommodations::show)
                .put(accommodations::update)
                .patch(accommodations::update)
                .delete(accommodations::destroy),
        )
        // Transportation
        .route(
            "/transportation-requests",
            get(transportation::index).post(transportation::store),
        )
        .route(
            "/transportation-requests/{id}",
            get(transportation::show)
                .put(transportation::update)
                .patch(transportation::update)
                .delete(transportation::destroy),
        )
        // Feedback
        .route("/feedback", get(feedback::index).post(feedback::store))
        .route(
            "/feedback/{id}",
            get(feedback::show).put(feedback::update).patch(feedback::update).delete(feedback::destroy),
        )
        // Notifications
        .route("/notifications", get(notifications::index).post(notifications::store))
        .route(
            "/notifications/{id}",
            get(notifications::show)
                .put(notifications::update)
                .patch(notifications::update)
                .delete(notifications::destroy),
        )
        .route("/notifications/{id}/read", patch(notifications::mark_read))
        // Service capacities
        .route(
            "/service-capacities",
            get(service_capacity::index).post(service_capacity::store),
        )
        .route(
            "/service-capacities/{id}",
            get(service_capacity::show)
                .put(service_capacity::update)
                .patch(service_capacity::update)
                .delete(service_capacity::destroy),
        )
        // Operations
        .route("/audit", get(metadata::audit_trail));

    Router::new()
        .route("/health", get(metadata::health_check))
        .nest("/api", api)
        // Middleware; audit runs inside auth so it sees the caller
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            audit::audit_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(state.config.server.body_limit_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
