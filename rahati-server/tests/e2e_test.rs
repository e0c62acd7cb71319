//! End-to-end integration test
//!
//! Boots the full router on a random port over a seeded temporary store and
//! drives it through reqwest. Covers login, capacity and stay conflicts on
//! create and update, status gates, record retention on delete and role
//! confinement.

use chrono::{Days, Utc};
use rahati_server::{auth::TokenService, build_router, config::ServerConfig, AppState};
use rahati_store::seed::{seed_demo_data, DEMO_PASSWORD};
use rahati_store::{AuditLog, SqliteStore};
use reqwest::Method;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

/// Start a seeded test server on a random port, returns (base_url, _temp_dir)
async fn start_test_server() -> (String, TempDir) {
    let temp_dir = TempDir::new().unwrap();

    let store = SqliteStore::open(temp_dir.path().join("rahati.sqlite")).unwrap();
    store
        .in_transaction(|conn| seed_demo_data(conn, rahati_core::model::now()))
        .unwrap();
    let audit = AuditLog::open(temp_dir.path().join("audit.sqlite")).unwrap();

    let mut config = ServerConfig::default();
    config.auth.jwt_secret = Some("e2e-test-secret".to_string());

    let state = Arc::new(AppState {
        store,
        audit: Arc::new(Mutex::new(audit)),
        tokens: TokenService::from_settings(&config.auth),
        config,
    });

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (format!("http://{}", addr), temp_dir)
}

async fn login(client: &reqwest::Client, base_url: &str, email: &str) -> String {
    login_with(client, base_url, email, DEMO_PASSWORD).await
}

async fn login_with(client: &reqwest::Client, base_url: &str, email: &str, password: &str) -> String {
    let resp = client
        .post(format!("{}/api/auth/login", base_url))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200, "login as {email} should succeed");
    let body: Value = resp.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

async fn get_json(client: &reqwest::Client, url: String, token: &str) -> Value {
    let resp = client.get(url).bearer_auth(token).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

/// Id of the seeded center with `name`
async fn center_id(client: &reqwest::Client, base_url: &str, token: &str, name: &str) -> i64 {
    let centers = get_json(client, format!("{}/api/centers", base_url), token).await;
    centers
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == name)
        .and_then(|c| c["id"].as_i64())
        .unwrap()
}

async fn user_id(client: &reqwest::Client, base_url: &str, token: &str) -> i64 {
    let me = get_json(client, format!("{}/api/auth/user", base_url), token).await;
    me["id"].as_i64().unwrap()
}

/// Send `body` with `method` and return the status with the decoded reply
async fn send(
    client: &reqwest::Client,
    method: Method,
    url: String,
    token: &str,
    body: Option<Value>,
) -> (u16, Value) {
    let mut request = client.request(method, url).bearer_auth(token);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let resp = request.send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

/// Book an appointment for the seeded patient at `hour` o'clock, `offset` days out
async fn book(
    client: &reqwest::Client,
    base_url: &str,
    patient: &str,
    center: i64,
    offset: u64,
    hour: u32,
) -> (u16, Value) {
    let patient_id = user_id(client, base_url, patient).await;
    send(
        client,
        Method::POST,
        format!("{}/api/appointments", base_url),
        patient,
        Some(json!({
            "patient_id": patient_id,
            "center_id": center,
            "appointment_datetime": format!("{} {hour:02}:00:00", days_ahead(offset)),
            "appointment_duration": 30
        })),
    )
    .await
}

/// Money fields travel as decimal strings
fn amount(value: &Value) -> f64 {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.as_f64().unwrap(),
    }
}

fn days_ahead(days: u64) -> chrono::NaiveDate {
    Utc::now().date_naive().checked_add_days(Days::new(days)).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_login_and_logout() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    // Wrong password
    let resp = client
        .post(format!("{}/api/auth/login", base_url))
        .json(&json!({ "email": "patient@rahati.com", "password": "not-the-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // No token
    let resp = client
        .get(format!("{}/api/auth/user", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let token = login(&client, &base_url, "patient@rahati.com").await;
    let me = get_json(&client, format!("{}/api/auth/user", base_url), &token).await;
    assert_eq!(me["email"], "patient@rahati.com");
    assert_eq!(me["role"], "Patient");
    assert!(me.get("password_hash").is_none(), "hash must never leave the server");

    let resp = client
        .post(format!("{}/api/auth/logout", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Revoked token no longer authenticates
    let resp = client
        .get(format!("{}/api/auth/user", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_register() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({
            "name": "New Patient",
            "email": "new.patient@example.com",
            "password": "secret-pass"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["role"], "Patient");
    assert!(body["token"].is_string());

    // Same email again
    let resp = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({
            "name": "Duplicate",
            "email": "new.patient@example.com",
            "password": "secret-pass"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert!(body["errors"]["email"].is_array());

    // Privileged roles need a staff caller
    let resp = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({
            "name": "Sneaky Admin",
            "email": "sneaky@example.com",
            "password": "secret-pass",
            "role": "Admin",
            "center_id": 1
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_appointment_capacity() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let superuser = login(&client, &base_url, "superuser@rahati.com").await;
    let patient = login(&client, &base_url, "patient@rahati.com").await;
    let patient_id = user_id(&client, &base_url, &patient).await;
    let center = center_id(&client, &base_url, &superuser, "Rahati Wellness Center").await;
    let day = days_ahead(5);

    // One slot that day
    let resp = client
        .post(format!("{}/api/service-capacities", base_url))
        .bearer_auth(&superuser)
        .json(&json!({
            "center_id": center,
            "service_type": "appointment",
            "max_capacity": 1,
            "date": day.to_string()
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let booking = json!({
        "patient_id": patient_id,
        "center_id": center,
        "appointment_datetime": format!("{day} 10:00:00"),
        "appointment_duration": 30
    });

    let resp = client
        .post(format!("{}/api/appointments", base_url))
        .bearer_auth(&patient)
        .json(&booking)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let appt: Value = resp.json().await.unwrap();
    assert_eq!(appt["status"], "scheduled");
    assert_eq!(appt["patient"]["email"], "patient@rahati.com");

    let resp = client
        .post(format!("{}/api/appointments", base_url))
        .bearer_auth(&patient)
        .json(&booking)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "No available slots for the selected date and time");

    // Patients book only for themselves
    let other = json!({
        "patient_id": patient_id + 1000,
        "center_id": center,
        "appointment_datetime": format!("{} 10:00:00", days_ahead(6)),
        "appointment_duration": 30
    });
    let resp = client
        .post(format!("{}/api/appointments", base_url))
        .bearer_auth(&patient)
        .json(&other)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422, "unknown patient fails validation first");
}

#[tokio::test]
async fn test_accommodation_conflict() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let superuser = login(&client, &base_url, "superuser@rahati.com").await;
    let patient = login(&client, &base_url, "patient@rahati.com").await;
    let patient_id = user_id(&client, &base_url, &patient).await;
    let center = center_id(&client, &base_url, &superuser, "Rahati Wellness Center").await;

    let rooms = get_json(&client, format!("{}/api/rooms", base_url), &superuser).await;
    let room_id = rooms
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["room_number"] == "101" && r["center_id"] == center)
        .and_then(|r| r["id"].as_i64())
        .unwrap();

    let mut appointment_ids = Vec::new();
    for offset in [10, 11, 12] {
        let resp = client
            .post(format!("{}/api/appointments", base_url))
            .bearer_auth(&patient)
            .json(&json!({
                "patient_id": patient_id,
                "center_id": center,
                "appointment_datetime": format!("{} 09:00:00", days_ahead(offset)),
                "appointment_duration": 60
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let appt: Value = resp.json().await.unwrap();
        appointment_ids.push(appt["id"].as_i64().unwrap());
    }

    let stay = |appointment_id: i64, check_in: u64, check_out: u64| {
        json!({
            "appointment_id": appointment_id,
            "room_id": room_id,
            "check_in_date": days_ahead(check_in).to_string(),
            "check_out_date": days_ahead(check_out).to_string(),
            "number_of_guests": 1
        })
    };

    let resp = client
        .post(format!("{}/api/accommodations", base_url))
        .bearer_auth(&patient)
        .json(&stay(appointment_ids[0], 10, 12))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let first: Value = resp.json().await.unwrap();
    assert_eq!(first["status"], "reserved");

    // Overlaps the first stay by one night
    let resp = client
        .post(format!("{}/api/accommodations", base_url))
        .bearer_auth(&patient)
        .json(&stay(appointment_ids[1], 11, 13))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "The room is not available for the selected dates");

    // Checking in on the previous check-out day is fine
    let resp = client
        .post(format!("{}/api/accommodations", base_url))
        .bearer_auth(&patient)
        .json(&stay(appointment_ids[2], 12, 14))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // Too many guests for a single room
    let mut crowded = stay(appointment_ids[1], 20, 21);
    crowded["number_of_guests"] = json!(3);
    let resp = client
        .post(format!("{}/api/accommodations", base_url))
        .bearer_auth(&patient)
        .json(&crowded)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_center_admin_confinement() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let superuser = login(&client, &base_url, "superuser@rahati.com").await;
    let admin2 = login(&client, &base_url, "admin2@rahati.com").await;
    let wellness = center_id(&client, &base_url, &superuser, "Rahati Wellness Center").await;
    let rehab = center_id(&client, &base_url, &superuser, "Rahati Rehabilitation Center").await;

    let room = |center: i64, number: &str| {
        json!({
            "center_id": center,
            "room_number": number,
            "type": "single",
            "price_per_night": 80,
            "capacity": 1
        })
    };

    // admin2 manages the rehabilitation center only
    let resp = client
        .post(format!("{}/api/rooms", base_url))
        .bearer_auth(&admin2)
        .json(&room(wellness, "901"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .post(format!("{}/api/rooms", base_url))
        .bearer_auth(&admin2)
        .json(&room(rehab, "901"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // Same number in the same center is taken
    let resp = client
        .post(format!("{}/api/rooms", base_url))
        .bearer_auth(&superuser)
        .json(&room(rehab, "901"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_role_gates() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let patient = login(&client, &base_url, "patient@rahati.com").await;
    let superuser = login(&client, &base_url, "superuser@rahati.com").await;

    let resp = client
        .get(format!("{}/api/users", base_url))
        .bearer_auth(&patient)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .get(format!("{}/api/audit", base_url))
        .bearer_auth(&patient)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let entries = get_json(&client, format!("{}/api/audit?limit=50", base_url), &superuser).await;
    assert!(
        !entries.as_array().unwrap().is_empty(),
        "logins and the denied calls above are audited"
    );

    let resp = client
        .get(format!("{}/api/audit?limit=0", base_url))
        .bearer_auth(&superuser)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
}

#[tokio::test]
async fn test_appointment_rebooking_respects_capacity() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let superuser = login(&client, &base_url, "superuser@rahati.com").await;
    let patient = login(&client, &base_url, "patient@rahati.com").await;
    let center = center_id(&client, &base_url, &superuser, "Rahati Wellness Center").await;

    let (status, _) = send(
        &client,
        Method::POST,
        format!("{}/api/service-capacities", base_url),
        &superuser,
        Some(json!({
            "center_id": center,
            "service_type": "appointment",
            "max_capacity": 1,
            "date": days_ahead(20).to_string()
        })),
    )
    .await;
    assert_eq!(status, 201);

    let (status, first) = book(&client, &base_url, &patient, center, 20, 10).await;
    assert_eq!(status, 201);
    let first_id = first["id"].as_i64().unwrap();
    let (status, second) = book(&client, &base_url, &patient, center, 21, 10).await;
    assert_eq!(status, 201);
    let second_id = second["id"].as_i64().unwrap();

    // Moving onto the full day is refused
    let moved = json!({ "appointment_datetime": format!("{} 11:00:00", days_ahead(20)) });
    let (status, body) = send(
        &client,
        Method::PUT,
        format!("{}/api/appointments/{}", base_url, second_id),
        &patient,
        Some(moved.clone()),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "No available slots for the selected date and time");

    // Cancelling the first frees the slot
    let (status, body) = send(
        &client,
        Method::PUT,
        format!("{}/api/appointments/{}", base_url, first_id),
        &patient,
        Some(json!({ "status": "cancelled" })),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "cancelled");

    let (status, _) = send(
        &client,
        Method::PUT,
        format!("{}/api/appointments/{}", base_url, second_id),
        &patient,
        Some(moved),
    )
    .await;
    assert_eq!(status, 200);

    // Reactivating the cancelled one would overbook the day
    let (status, _) = send(
        &client,
        Method::PUT,
        format!("{}/api/appointments/{}", base_url, first_id),
        &patient,
        Some(json!({ "status": "scheduled" })),
    )
    .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_appointment_delete_or_cancel() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let superuser = login(&client, &base_url, "superuser@rahati.com").await;
    let patient = login(&client, &base_url, "patient@rahati.com").await;
    let center = center_id(&client, &base_url, &superuser, "Rahati Wellness Center").await;

    // Nothing hangs off this one, so it goes away
    let (_, bare) = book(&client, &base_url, &patient, center, 22, 9).await;
    let bare_url = format!("{}/api/appointments/{}", base_url, bare["id"]);
    let (status, body) = send(&client, Method::DELETE, bare_url.clone(), &patient, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Appointment deleted successfully");
    let (status, _) = send(&client, Method::GET, bare_url, &patient, None).await;
    assert_eq!(status, 404);

    // A paid appointment is only cancelled
    let (_, paid) = book(&client, &base_url, &patient, center, 23, 9).await;
    let (status, _) = send(
        &client,
        Method::POST,
        format!("{}/api/payments", base_url),
        &patient,
        Some(json!({ "appointment_id": paid["id"], "amount": 50, "payment_method": "card" })),
    )
    .await;
    assert_eq!(status, 201);

    let paid_url = format!("{}/api/appointments/{}", base_url, paid["id"]);
    let (status, body) = send(&client, Method::DELETE, paid_url.clone(), &patient, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Appointment cancelled successfully");
    let kept = get_json(&client, paid_url, &patient).await;
    assert_eq!(kept["status"], "cancelled");
    assert!(kept["payment"].is_object());
}

#[tokio::test]
async fn test_accommodation_update_and_cancel() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let superuser = login(&client, &base_url, "superuser@rahati.com").await;
    let patient = login(&client, &base_url, "patient@rahati.com").await;
    let center = center_id(&client, &base_url, &superuser, "Rahati Wellness Center").await;

    let rooms = get_json(&client, format!("{}/api/rooms", base_url), &superuser).await;
    let room_id = rooms
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["room_number"] == "101" && r["center_id"] == center)
        .and_then(|r| r["id"].as_i64())
        .unwrap();

    let mut stays = Vec::new();
    for (offset, check_in, check_out) in [(30, 30, 32), (33, 33, 35)] {
        let (_, appt) = book(&client, &base_url, &patient, center, offset, 9).await;
        let (status, stay) = send(
            &client,
            Method::POST,
            format!("{}/api/accommodations", base_url),
            &patient,
            Some(json!({
                "appointment_id": appt["id"],
                "room_id": room_id,
                "check_in_date": days_ahead(check_in).to_string(),
                "check_out_date": days_ahead(check_out).to_string(),
                "number_of_guests": 1
            })),
        )
        .await;
        assert_eq!(status, 201);
        stays.push(stay);
    }
    let first_url = format!("{}/api/accommodations/{}", base_url, stays[0]["id"]);
    let second_url = format!("{}/api/accommodations/{}", base_url, stays[1]["id"]);

    // Pulling the second stay forward collides with the first
    let (status, body) = send(
        &client,
        Method::PUT,
        second_url,
        &patient,
        Some(json!({ "check_in_date": days_ahead(31).to_string() })),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "The room is not available for the selected dates");

    // One more night up to the next check-in is repriced
    let two_nights = amount(&stays[0]["total_price"]);
    let (status, longer) = send(
        &client,
        Method::PUT,
        first_url.clone(),
        &patient,
        Some(json!({ "check_out_date": days_ahead(33).to_string() })),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(amount(&longer["total_price"]), two_nights * 1.5);

    let (status, _) = send(
        &client,
        Method::PUT,
        first_url.clone(),
        &superuser,
        Some(json!({ "status": "checked-in" })),
    )
    .await;
    assert_eq!(status, 200);

    let (status, body) = send(&client, Method::DELETE, first_url, &patient, None).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Cannot cancel an accommodation that is already checked-in");
}

#[tokio::test]
async fn test_notification_read_state() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let superuser = login(&client, &base_url, "superuser@rahati.com").await;
    let patient = login(&client, &base_url, "patient@rahati.com").await;
    let patient_id = user_id(&client, &base_url, &patient).await;

    let (status, created) = send(
        &client,
        Method::POST,
        format!("{}/api/notifications", base_url),
        &superuser,
        Some(json!({
            "user_id": patient_id,
            "type": "reminder",
            "title": "Upcoming visit",
            "message": "See you tomorrow"
        })),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(created["is_read"], false);
    let url = format!("{}/api/notifications/{}", base_url, created["id"]);

    let (status, read) = send(&client, Method::PUT, url.clone(), &patient, Some(json!({ "is_read": true }))).await;
    assert_eq!(status, 200);
    assert_eq!(read["is_read"], true);
    assert!(read["read_at"].is_string());

    let (status, unread) = send(&client, Method::PUT, url.clone(), &patient, Some(json!({ "is_read": false }))).await;
    assert_eq!(status, 200);
    assert_eq!(unread["is_read"], false);
    assert!(unread["read_at"].is_null());

    // Recipients only toggle the read flag
    let (status, _) = send(&client, Method::PUT, url.clone(), &patient, Some(json!({ "title": "Edited" }))).await;
    assert_eq!(status, 422);

    let (status, marked) = send(&client, Method::PATCH, format!("{url}/read"), &patient, None).await;
    assert_eq!(status, 200);
    assert_eq!(marked["is_read"], true);
    assert_eq!(marked["title"], "Upcoming visit");
}

#[tokio::test]
async fn test_transportation_status_gates() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let superuser = login(&client, &base_url, "superuser@rahati.com").await;
    let patient = login(&client, &base_url, "patient@rahati.com").await;

    let (status, ride) = send(
        &client,
        Method::POST,
        format!("{}/api/transportation-requests", base_url),
        &patient,
        Some(json!({
            "pickup_location": "Home",
            "dropoff_location": "Rahati Wellness Center",
            "pickup_time": format!("{} 08:00:00", days_ahead(5))
        })),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(ride["status"], "pending");
    let url = format!("{}/api/transportation-requests/{}", base_url, ride["id"]);

    let (status, body) = send(&client, Method::PUT, url.clone(), &patient, Some(json!({ "status": "confirmed" }))).await;
    assert_eq!(status, 403);
    assert_eq!(body["error"], "Unauthorized to change status");

    let (status, body) = send(&client, Method::PUT, url.clone(), &patient, Some(json!({ "pickup_location": "Gate B" }))).await;
    assert_eq!(status, 200);
    assert_eq!(body["pickup_location"], "Gate B");

    let (status, body) = send(&client, Method::PUT, url.clone(), &superuser, Some(json!({ "status": "confirmed" }))).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "confirmed");

    // Confirmed rides can no longer be cancelled
    let (status, body) = send(&client, Method::DELETE, url, &patient, None).await;
    assert_eq!(status, 400);
    assert_eq!(
        body["error"],
        "Cannot cancel a transportation request that is already confirmed or completed"
    );
}

#[tokio::test]
async fn test_consultation_drives_appointment_status() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let superuser = login(&client, &base_url, "superuser@rahati.com").await;
    let patient = login(&client, &base_url, "patient@rahati.com").await;
    let center = center_id(&client, &base_url, &superuser, "Rahati Wellness Center").await;

    let (_, appt) = book(&client, &base_url, &patient, center, 8, 10).await;
    let appt_url = format!("{}/api/appointments/{}", base_url, appt["id"]);

    let (status, consultation) = send(
        &client,
        Method::POST,
        format!("{}/api/consultations", base_url),
        &superuser,
        Some(json!({
            "appointment_id": appt["id"],
            "start_time": format!("{} 10:00:00", days_ahead(8)),
            "end_time": format!("{} 10:30:00", days_ahead(8)),
            "status": "completed"
        })),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(get_json(&client, appt_url.clone(), &patient).await["status"], "completed");

    let (status, _) = send(
        &client,
        Method::DELETE,
        format!("{}/api/consultations/{}", base_url, consultation["id"]),
        &superuser,
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(get_json(&client, appt_url, &patient).await["status"], "scheduled");
}

#[tokio::test]
async fn test_user_with_history_is_kept() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let superuser = login(&client, &base_url, "superuser@rahati.com").await;
    let patient = login(&client, &base_url, "patient@rahati.com").await;
    let patient_id = user_id(&client, &base_url, &patient).await;
    let center = center_id(&client, &base_url, &superuser, "Rahati Wellness Center").await;

    let (_, appt) = book(&client, &base_url, &patient, center, 9, 10).await;
    let (status, _) = send(
        &client,
        Method::POST,
        format!("{}/api/payments", base_url),
        &patient,
        Some(json!({ "appointment_id": appt["id"], "amount": 80, "payment_method": "card" })),
    )
    .await;
    assert_eq!(status, 201);

    let (status, body) = send(
        &client,
        Method::DELETE,
        format!("{}/api/users/{}", base_url, patient_id),
        &superuser,
        None,
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Cannot delete a user with appointment, transportation or feedback history");

    let payments = get_json(&client, format!("{}/api/payments", base_url), &superuser).await;
    assert!(payments.as_array().unwrap().iter().any(|p| p["appointment_id"] == appt["id"]));
    get_json(&client, format!("{}/api/appointments/{}", base_url, appt["id"]), &superuser).await;

    // An account with no history can go
    let (status, fresh) = send(
        &client,
        Method::POST,
        format!("{}/api/users", base_url),
        &superuser,
        Some(json!({ "name": "Walk In", "email": "walk.in@example.com", "password": "secret-pass" })),
    )
    .await;
    assert_eq!(status, 201);
    let (status, _) = send(
        &client,
        Method::DELETE,
        format!("{}/api/users/{}", base_url, fresh["id"]),
        &superuser,
        None,
    )
    .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_center_with_admin_is_deactivated() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let superuser = login(&client, &base_url, "superuser@rahati.com").await;

    let (status, center) = send(
        &client,
        Method::POST,
        format!("{}/api/centers", base_url),
        &superuser,
        Some(json!({ "name": "Rahati Coastal Clinic", "address": "1 Shore Road", "phone": "555-0101" })),
    )
    .await;
    assert_eq!(status, 201);
    let center_id = center["id"].as_i64().unwrap();

    let (status, _) = send(
        &client,
        Method::POST,
        format!("{}/api/users", base_url),
        &superuser,
        Some(json!({
            "name": "Coastal Admin",
            "email": "coastal.admin@example.com",
            "password": "secret-pass",
            "role": "Admin",
            "center_id": center_id
        })),
    )
    .await;
    assert_eq!(status, 201);

    let (status, body) = send(
        &client,
        Method::DELETE,
        format!("{}/api/centers/{}", base_url, center_id),
        &superuser,
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Center deactivated successfully");

    // The admin stays confined to their center
    let admin = login_with(&client, &base_url, "coastal.admin@example.com", "secret-pass").await;
    let me = get_json(&client, format!("{}/api/auth/user", base_url), &admin).await;
    assert_eq!(me["center_id"], center_id);
    let visible = get_json(&client, format!("{}/api/centers", base_url), &admin).await;
    let visible = visible.as_array().unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0]["id"], center_id);
    assert_eq!(visible[0]["is_active"], false);
}

#[tokio::test]
async fn test_service_capacity_window() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let superuser = login(&client, &base_url, "superuser@rahati.com").await;
    let center = center_id(&client, &base_url, &superuser, "Rahati Wellness Center").await;
    let rule = |extra: Value| {
        let mut body = json!({
            "center_id": center,
            "service_type": "appointment",
            "max_capacity": 5,
            "date": days_ahead(15).to_string()
        });
        for (key, value) in extra.as_object().unwrap() {
            body[key.as_str()] = value.clone();
        }
        body
    };

    // A lone bound is not a window
    let (status, body) = send(
        &client,
        Method::POST,
        format!("{}/api/service-capacities", base_url),
        &superuser,
        Some(rule(json!({ "start_time": "09:00:00" }))),
    )
    .await;
    assert_eq!(status, 422);
    assert!(body["errors"]["end_time"].is_array());

    let (status, created) = send(
        &client,
        Method::POST,
        format!("{}/api/service-capacities", base_url),
        &superuser,
        Some(rule(json!({ "start_time": "09:00:00", "end_time": "12:00:00" }))),
    )
    .await;
    assert_eq!(status, 201);
    let url = format!("{}/api/service-capacities/{}", base_url, created["id"]);

    // Moving only the start past the stored end inverts the window
    let (status, body) = send(&client, Method::PUT, url.clone(), &superuser, Some(json!({ "start_time": "14:00:00" }))).await;
    assert_eq!(status, 422);
    assert!(body["errors"]["end_time"].is_array());

    let (status, body) = send(&client, Method::PUT, url.clone(), &superuser, Some(json!({ "end_time": null }))).await;
    assert_eq!(status, 422);
    assert!(body["errors"]["end_time"].is_array());

    let (status, body) = send(&client, Method::PUT, url, &superuser, Some(json!({ "start_time": "10:00:00" }))).await;
    assert_eq!(status, 200);
    assert_eq!(body["start_time"], "10:00:00");
    assert_eq!(body["end_time"], "12:00:00");
}
