use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

string_enum! {
    /// Account role. Admins may additionally be bound to a center.
    pub enum Role {
        Patient => "Patient",
        Provider => "Provider",
        Admin => "Admin",
        Superuser => "Superuser",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Salted password digest, never serialised
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub caregiver_name: Option<String>,
    pub caregiver_phone: Option<String>,
    pub center_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn is_patient(&self) -> bool {
        self.role == Role::Patient
    }

    pub fn is_provider(&self) -> bool {
        self.role == Role::Provider
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_superuser(&self) -> bool {
        self.role == Role::Superuser
    }

    pub fn is_admin_or_superuser(&self) -> bool {
        self.is_admin() || self.is_superuser()
    }
}
