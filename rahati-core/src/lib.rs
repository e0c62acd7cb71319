pub mod booking;
pub mod error;
pub mod model;
pub mod password;
pub mod policy;
pub mod validation;

pub use error::{FieldErrors, RahatiError, Result};
pub use policy::{Action, Actor, Kind, Relation, Scope};
pub use validation::{Presence, Validator};
