//! Demo data set. Every row is upserted by its natural key, so seeding twice
//! leaves one copy of everything.

use crate::error::Result;
use crate::repo::{centers, meal_options, rooms, service_capacities, users};
use chrono::{Days, NaiveDate, NaiveDateTime};
use rahati_core::model::{Center, MealOption, Role, Room, ServiceCapacity, User, APPOINTMENT_SERVICE};
use rahati_core::password::hash_password;
use rusqlite::Connection;
use rust_decimal::Decimal;

/// Password shared by every seeded account
pub const DEMO_PASSWORD: &str = "password";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub centers: usize,
    pub users: usize,
    pub rooms: usize,
    pub meal_options: usize,
    pub capacities: usize,
}

struct CenterSeed {
    name: &'static str,
    description: &'static str,
    address: &'static str,
    phone: &'static str,
    email: &'static str,
    website: &'static str,
    latitude: f64,
    longitude: f64,
}

const CENTERS: [CenterSeed; 2] = [
    CenterSeed {
        name: "Rahati Wellness Center",
        description: "A premier wellness center offering comprehensive health services.",
        address: "100 Wellness Way, Health City, HC 12345",
        phone: "+1999888777",
        email: "info@rahatiwellness.com",
        website: "https://rahatiwellness.com",
        latitude: 37.7749,
        longitude: -122.4194,
    },
    CenterSeed {
        name: "Rahati Rehabilitation Center",
        description: "Specialized rehabilitation services for all ages.",
        address: "200 Rehab Road, Recovery Town, RT 67890",
        phone: "+1888777666",
        email: "info@rahatirehab.com",
        website: "https://rahatirehab.com",
        latitude: 34.0522,
        longitude: -118.2437,
    },
];

/// (email, name, role, phone, address, center index)
const ACCOUNTS: [(&str, &str, Role, &str, &str, Option<usize>); 5] = [
    ("superuser@rahati.com", "Superuser", Role::Superuser, "+1000000000", "100 Super St, Super City", None),
    ("admin1@rahati.com", "Admin User 1", Role::Admin, "+1234567890", "123 Admin St, Admin City", Some(0)),
    ("admin2@rahati.com", "Admin User 2", Role::Admin, "+1234567891", "124 Admin St, Admin City", Some(1)),
    ("provider@rahati.com", "Provider User", Role::Provider, "+1987654321", "456 Provider Ave, Provider Town", None),
    ("patient@rahati.com", "Patient User", Role::Patient, "+1122334455", "789 Patient Blvd, Patient Village", None),
];

/// (center index, number, type, description, price, capacity, accessible)
const ROOMS: [(usize, &str, &str, &str, i64, i64, bool); 4] = [
    (0, "101", "single", "Comfortable single room with private bathroom", 100, 1, true),
    (0, "102", "double", "Spacious double room with private bathroom and sitting area", 150, 2, true),
    (1, "201", "single", "Standard single room with private bathroom", 90, 1, false),
    (1, "202", "suite", "Luxury suite with separate bedroom, living area, and kitchenette", 200, 3, true),
];

/// (name, description, price, vegetarian, vegan, gluten free)
const MEALS: [(&str, &str, i64, bool, bool, bool); 4] = [
    ("Standard Meal Plan", "Three balanced meals per day", 30, false, false, false),
    ("Vegetarian Meal Plan", "Three vegetarian meals per day", 35, true, false, false),
    ("Vegan Meal Plan", "Three vegan meals per day", 40, true, true, false),
    ("Gluten-Free Meal Plan", "Three gluten-free meals per day", 45, false, false, true),
];

/// (center index, days from today, max capacity)
const CAPACITIES: [(usize, u64, i64); 4] = [(0, 1, 20), (0, 2, 15), (1, 1, 10), (1, 2, 12)];

/// Insert or refresh the demo data set relative to `now`.
pub fn seed_demo_data(conn: &Connection, now: NaiveDateTime) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    let mut center_ids = Vec::with_capacity(CENTERS.len());
    for seed in &CENTERS {
        let center = match centers::find_by_name(conn, seed.name)? {
            Some(existing) => existing,
            None => centers::insert(
                conn,
                &Center {
                    id: 0,
                    name: seed.name.to_string(),
                    description: Some(seed.description.to_string()),
                    address: seed.address.to_string(),
                    phone: seed.phone.to_string(),
                    email: Some(seed.email.to_string()),
                    website: Some(seed.website.to_string()),
                    latitude: Some(seed.latitude),
                    longitude: Some(seed.longitude),
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                },
            )?,
        };
        center_ids.push(center.id);
        report.centers += 1;
    }

    for (email, name, role, phone, address, center) in ACCOUNTS {
        let is_patient = role == Role::Patient;
        let mut user = users::find_by_email(conn, email)?.unwrap_or(User {
            id: 0,
            name: String::new(),
            email: email.to_string(),
            password_hash: String::new(),
            role,
            phone: None,
            address: None,
            caregiver_name: None,
            caregiver_phone: None,
            center_id: None,
            created_at: now,
            updated_at: now,
        });
        user.name = name.to_string();
        user.password_hash = hash_password(DEMO_PASSWORD);
        user.role = role;
        user.phone = Some(phone.to_string());
        user.address = Some(address.to_string());
        user.center_id = center.map(|idx| center_ids[idx]);
        if is_patient {
            user.caregiver_name = Some("Caregiver Name".to_string());
            user.caregiver_phone = Some("+1555666777".to_string());
        }
        user.updated_at = now;

        if user.id == 0 {
            users::insert(conn, &user)?;
        } else {
            users::update(conn, &user)?;
        }
        report.users += 1;
    }

    for (center, number, room_type, description, price, capacity, accessible) in ROOMS {
        let center_id = center_ids[center];
        let mut room = rooms::find_by_number(conn, center_id, number)?.unwrap_or(Room {
            id: 0,
            center_id,
            room_number: number.to_string(),
            room_type: String::new(),
            description: None,
            price_per_night: Decimal::ZERO,
            capacity: 1,
            is_accessible: false,
            is_available: true,
            created_at: now,
            updated_at: now,
        });
        room.room_type = room_type.to_string();
        room.description = Some(description.to_string());
        room.price_per_night = Decimal::new(price * 100, 2);
        room.capacity = capacity;
        room.is_accessible = accessible;
        room.is_available = true;
        room.updated_at = now;

        if room.id == 0 {
            rooms::insert(conn, &room)?;
        } else {
            rooms::update(conn, &room)?;
        }
        report.rooms += 1;
    }

    for (name, description, price, vegetarian, vegan, gluten_free) in MEALS {
        let mut meal = meal_options::find_by_name(conn, name)?.unwrap_or(MealOption {
            id: 0,
            name: name.to_string(),
            description: None,
            price: Decimal::ZERO,
            is_vegetarian: false,
            is_vegan: false,
            is_gluten_free: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        });
        meal.description = Some(description.to_string());
        meal.price = Decimal::new(price * 100, 2);
        meal.is_vegetarian = vegetarian;
        meal.is_vegan = vegan;
        meal.is_gluten_free = gluten_free;
        meal.is_active = true;
        meal.updated_at = now;

        if meal.id == 0 {
            meal_options::insert(conn, &meal)?;
        } else {
            meal_options::update(conn, &meal)?;
        }
        report.meal_options += 1;
    }

    let today = now.date();
    for (center, offset, max_capacity) in CAPACITIES {
        let center_id = center_ids[center];
        let date = today.checked_add_days(Days::new(offset)).unwrap_or(today);
        upsert_day_capacity(conn, center_id, date, max_capacity, now)?;
        report.capacities += 1;
    }

    tracing::info!(?report, "Demo data seeded");
    Ok(report)
}

fn upsert_day_capacity(
    conn: &Connection,
    center_id: i64,
    date: NaiveDate,
    max_capacity: i64,
    now: NaiveDateTime,
) -> Result<()> {
    let existing = service_capacities::for_day(conn, center_id, APPOINTMENT_SERVICE, date)?
        .into_iter()
        .find(|rule| rule.window().is_none());

    match existing {
        Some(mut rule) => {
            rule.max_capacity = max_capacity;
            rule.is_active = true;
            rule.updated_at = now;
            service_capacities::update(conn, &rule)
        }
        None => service_capacities::insert(
            conn,
            &ServiceCapacity {
                id: 0,
                center_id,
                service_type: APPOINTMENT_SERVICE.to_string(),
                max_capacity,
                date,
                start_time: None,
                end_time: None,
                is_active: true,
                notes: None,
                created_at: now,
                updated_at: now,
            },
        )
        .map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::tests::{memory, ts};
    use rahati_core::Scope;
    use rahati_core::password::verify_password;

    #[test]
    fn test_seed_is_idempotent() {
        let conn = memory();
        let now = ts("2030-06-01 08:00:00");

        let first = seed_demo_data(&conn, now).unwrap();
        let second = seed_demo_data(&conn, now).unwrap();
        assert_eq!(first, second);

        assert_eq!(centers::list(&conn, Scope::All).unwrap().len(), 2);
        assert_eq!(users::list(&conn, Scope::All).unwrap().len(), 5);
        assert_eq!(rooms::list(&conn, &Default::default()).unwrap().len(), 4);
        assert_eq!(meal_options::list(&conn, &Default::default()).unwrap().len(), 4);
        assert_eq!(service_capacities::list(&conn, &Default::default()).unwrap().len(), 4);
    }

    #[test]
    fn test_seeded_admins_are_bound_to_centers() {
        let conn = memory();
        seed_demo_data(&conn, ts("2030-06-01 08:00:00")).unwrap();

        let admin = users::find_by_email(&conn, "admin2@rahati.com").unwrap().unwrap();
        let center = centers::find_by_name(&conn, "Rahati Rehabilitation Center").unwrap().unwrap();
        assert_eq!(admin.center_id, Some(center.id));
        assert!(verify_password(DEMO_PASSWORD, &admin.password_hash));

        let rule = service_capacities::list(&conn, &Default::default()).unwrap()[0].clone();
        assert_eq!(rule.date.to_string(), "2030-06-02");
    }
}
