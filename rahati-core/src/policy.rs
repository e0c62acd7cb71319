//! Role-scoped authorization.
//!
//! Every decision is a lookup in a static table keyed on
//! `(resource kind, action, role)`. A table entry either allows, denies, or
//! requires the caller to stand in at least one [`Relation`] to the record.
//! Callers work out which relations hold and pass them to [`authorize`].
//!
//! Superusers follow the admin rows but are never confined to a center, so
//! [`Actor::covers_center`] is always true for them. A few rows (creating
//! superuser accounts, reading the audit trail) single them out.
//!
//! List endpoints do not check rows one by one: [`list_scope`] turns the
//! same table into a filter the store applies.

use crate::error::{RahatiError, Result};
use crate::model::{Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    User,
    Center,
    Appointment,
    Consultation,
    Payment,
    MealOption,
    Room,
    Accommodation,
    Transportation,
    Feedback,
    Notification,
    ServiceCapacity,
    AuditLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    View,
    Create,
    Update,
    Delete,
    /// Create an account with a role other than Patient
    CreatePrivileged,
    /// Create a Superuser account
    CreateSuperuser,
    /// Bind an account to a center
    AssignCenter,
    ChangeRole,
    /// Reassign an appointment to another provider
    ChangeProvider,
    /// Move a transportation request through its lifecycle
    ChangeStatus,
    /// Edit notification content (anything beyond the read flag)
    EditContent,
}

/// How the caller relates to the record under consideration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// The record is the caller's own account
    Itself,
    /// The caller is the patient of the underlying appointment
    OwnsAppointment,
    /// The caller is the provider assigned to the underlying appointment
    AssignedProvider,
    /// The caller created the record
    Author,
    /// The record is addressed to the caller
    Recipient,
    /// The record's center is within the caller's jurisdiction
    SameCenter,
    /// The caller is a provider with an appointment for this patient
    TreatsPatient,
    /// The record is publicly visible
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Allow,
    Deny,
    AnyOf(&'static [Relation]),
}

/// Fields a provider may change on a patient they treat
pub const PROVIDER_EDITABLE_PATIENT_FIELDS: &[&str] =
    &["name", "phone", "address", "caregiver_name", "caregiver_phone"];

/// The authenticated caller, as far as authorization is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
    pub center_id: Option<i64>,
}

impl Actor {
    pub fn new(id: i64, role: Role, center_id: Option<i64>) -> Self {
        Self { id, role, center_id }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Superuser)
    }

    /// The center an admin is confined to, if any
    pub fn confined_center(&self) -> Option<i64> {
        match self.role {
            Role::Admin => self.center_id,
            _ => None,
        }
    }

    /// Whether records of `center_id` fall within this caller's jurisdiction
    pub fn covers_center(&self, center_id: i64) -> bool {
        self.confined_center().is_none_or(|own| own == center_id)
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self::new(user.id, user.role, user.center_id)
    }
}

/// The static authorization table.
pub fn rule(kind: Kind, action: Action, role: Role) -> Rule {
    use Action::*;
    use Relation::*;
    use Role::{Admin, Patient, Provider, Superuser};

    match (kind, action, role) {
        // Accounts
        (Kind::User, List | Delete | ChangeRole | CreatePrivileged, Admin | Superuser) => Rule::Allow,
        (Kind::User, List | Delete | ChangeRole | CreatePrivileged, _) => Rule::Deny,
        (Kind::User, Create, _) => Rule::Allow,
        (Kind::User, CreateSuperuser, Superuser) => Rule::Allow,
        (Kind::User, CreateSuperuser, _) => Rule::Deny,
        (Kind::User, AssignCenter, Admin | Superuser) => Rule::AnyOf(&[SameCenter]),
        (Kind::User, AssignCenter, _) => Rule::Deny,
        (Kind::User, View | Update, Patient) => Rule::AnyOf(&[Itself]),
        (Kind::User, View | Update, Provider) => Rule::AnyOf(&[Itself, TreatsPatient]),
        (Kind::User, View | Update, Admin | Superuser) => Rule::Allow,

        // Centers
        (Kind::Center, List | View, Patient | Provider) => Rule::Allow,
        (Kind::Center, List | View | Update | Delete, Admin | Superuser) => Rule::AnyOf(&[SameCenter]),
        (Kind::Center, Create, Admin | Superuser) => Rule::Allow,

        // Appointments
        (Kind::Appointment, List, Patient | Provider) => Rule::Allow,
        (Kind::Appointment, Create, Patient | Provider) => Rule::AnyOf(&[Itself]),
        (Kind::Appointment, View | Update | Delete, Patient) => Rule::AnyOf(&[OwnsAppointment]),
        (Kind::Appointment, View | Update | Delete, Provider) => Rule::AnyOf(&[AssignedProvider]),
        (Kind::Appointment, List | Create | View | Update | Delete, Admin | Superuser) => {
            Rule::AnyOf(&[SameCenter])
        }
        (Kind::Appointment, ChangeProvider, Provider | Admin | Superuser) => Rule::Allow,

        // Consultations
        (Kind::Consultation, List, _) => Rule::Allow,
        (Kind::Consultation, View, Patient) => Rule::AnyOf(&[OwnsAppointment]),
        (Kind::Consultation, View | Create | Update, Provider) => Rule::AnyOf(&[AssignedProvider]),
        (Kind::Consultation, View | Create | Update | Delete, Admin | Superuser) => Rule::Allow,

        // Payments
        (Kind::Payment, List, _) => Rule::Allow,
        (Kind::Payment, View | Create, Patient) => Rule::AnyOf(&[OwnsAppointment]),
        (Kind::Payment, View, Provider) => Rule::AnyOf(&[AssignedProvider]),
        (Kind::Payment, Create, Provider) => Rule::Allow,
        (Kind::Payment, View | Create | Update | Delete, Admin | Superuser) => Rule::Allow,

        // Catalogue data: readable by everyone, managed by staff
        (Kind::MealOption | Kind::Room | Kind::ServiceCapacity, List | View, _) => Rule::Allow,
        (Kind::MealOption | Kind::Room | Kind::ServiceCapacity, Create | Update | Delete, Admin | Superuser) => {
            Rule::Allow
        }

        // Accommodations
        (Kind::Accommodation, List, _) => Rule::Allow,
        (Kind::Accommodation, View | Create | Update | Delete, Patient) => Rule::AnyOf(&[OwnsAppointment]),
        (Kind::Accommodation, View | Create | Update | Delete, _) => Rule::Allow,

        // Transportation
        (Kind::Transportation, List, _) => Rule::Allow,
        (Kind::Transportation, Create, Patient) => Rule::AnyOf(&[OwnsAppointment]),
        (Kind::Transportation, View | Update | Delete, Patient) => Rule::AnyOf(&[Author]),
        (Kind::Transportation, ChangeStatus, Patient) => Rule::Deny,
        (Kind::Transportation, Create | View | Update | Delete | ChangeStatus, _) => Rule::Allow,

        // Feedback
        (Kind::Feedback, List, _) => Rule::Allow,
        (Kind::Feedback, Create, _) => Rule::AnyOf(&[OwnsAppointment]),
        (Kind::Feedback, View, Patient) => Rule::AnyOf(&[Author, Public]),
        (Kind::Feedback, View, Provider) => Rule::AnyOf(&[AssignedProvider, Public]),
        (Kind::Feedback, Update | Delete, Patient | Provider) => Rule::AnyOf(&[Author]),
        (Kind::Feedback, View | Update | Delete, Admin | Superuser) => Rule::Allow,

        // Notifications
        (Kind::Notification, List, _) => Rule::Allow,
        (Kind::Notification, View | Update | Delete, Patient | Provider) => Rule::AnyOf(&[Recipient]),
        (Kind::Notification, View | Update | Delete | Create | EditContent, Admin | Superuser) => Rule::Allow,

        (Kind::AuditLog, List, Superuser) => Rule::Allow,

        _ => Rule::Deny,
    }
}

/// Check `action` on a record of `kind`, given the relations that hold.
pub fn authorize(kind: Kind, action: Action, actor: &Actor, held: &[Relation]) -> Result<()> {
    authorize_or(kind, action, actor, held, "Unauthorized")
}

/// Like [`authorize`], with a specific denial message.
pub fn authorize_or(
    kind: Kind,
    action: Action,
    actor: &Actor,
    held: &[Relation],
    denial: &str,
) -> Result<()> {
    let allowed = match rule(kind, action, actor.role) {
        Rule::Allow => true,
        Rule::Deny => false,
        Rule::AnyOf(required) => required.iter().any(|r| held.contains(r)),
    };

    if allowed {
        Ok(())
    } else {
        tracing::debug!(
            user_id = actor.id,
            role = %actor.role,
            ?kind,
            ?action,
            "Authorization denied"
        );
        Err(RahatiError::forbidden(denial))
    }
}

/// Row filter a list endpoint applies for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    /// Records whose appointment belongs to this patient
    Patient(i64),
    /// Records whose appointment is assigned to this provider
    Provider(i64),
    /// Records of this center
    Center(i64),
    /// Records created by this user
    Author(i64),
    /// Records created by this user, or public ones
    AuthorOrPublic(i64),
    /// Records on this provider's appointments, or public ones
    ProviderOrPublic(i64),
    /// Records addressed to this user
    Recipient(i64),
    /// Patients, providers, and admins of this center
    CenterDirectory(i64),
}

/// Translate the table into the filter a list query runs under.
pub fn list_scope(kind: Kind, actor: &Actor) -> Result<Scope> {
    authorize(kind, Action::List, actor, &[Relation::SameCenter])?;

    let scope = match (kind, actor.role) {
        (Kind::Notification, _) => Scope::Recipient(actor.id),
        (Kind::Appointment | Kind::Consultation | Kind::Payment | Kind::Accommodation, Role::Patient) => {
            Scope::Patient(actor.id)
        }
        (Kind::Appointment | Kind::Consultation | Kind::Payment, Role::Provider) => Scope::Provider(actor.id),
        (Kind::Transportation, Role::Patient) => Scope::Author(actor.id),
        (Kind::Feedback, Role::Patient) => Scope::AuthorOrPublic(actor.id),
        (Kind::Feedback, Role::Provider) => Scope::ProviderOrPublic(actor.id),
        (Kind::Appointment | Kind::Center, Role::Admin) => match actor.confined_center() {
            Some(center) => Scope::Center(center),
            None => Scope::All,
        },
        (Kind::User, Role::Admin) => match actor.confined_center() {
            Some(center) => Scope::CenterDirectory(center),
            None => Scope::All,
        },
        _ => Scope::All,
    };
    Ok(scope)
}
