//! Login identities and staff profiles.

use crate::collection::impl_entity;
use serde::{Deserialize, Serialize};

/// What a user may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Platform operator, sees every clinic
    SuperAdmin,
    /// Runs one clinic
    ClinicAdmin,
    /// Sees only patients assigned to their professional profile
    Professional,
}

impl Role {
    /// Whether this role has the administrative view of a clinic.
    pub fn is_admin(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::ClinicAdmin)
    }
}

/// A login identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub clinic_id: String,
    pub name: String,
    pub email: String,
    /// Opaque reference held by the identity service
    #[serde(default)]
    pub credential_ref: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub professional_id: Option<String>,
}

impl User {
    /// Case-insensitive email match.
    pub fn has_email(&self, email: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(email.trim())
    }
}

impl_entity!(User, "users", users);

/// A staff member profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Professional {
    pub id: String,
    pub clinic_id: String,
    pub name: String,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub registration_number: Option<String>,
    /// Hex color shown on the agenda
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub is_active: bool,
}

impl_entity!(Professional, "professionals", professionals);

/// Input for creating a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub credential_ref: Option<String>,
    #[serde(default)]
    pub professional_id: Option<String>,
}

/// Input for creating or updating a professional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalInput {
    pub name: String,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub registration_number: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// When set, a login user with this email is created and linked
    #[serde(default)]
    pub email: Option<String>,
}
