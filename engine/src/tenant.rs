//! Clinic (tenant) records.

use crate::collection::{Collection, Entity};
use crate::state::ClinicState;
use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// An isolated clinic. Every other record points at one through `clinic_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clinic {
    pub id: String,
    /// URL-safe handle used at login
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub operating_hours: OperatingHours,
    #[serde(default)]
    pub ai: AiSettings,
}

// A clinic is its own tenant.
impl Entity for Clinic {
    const COLLECTION: &'static str = "tenants";

    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> &str {
        &self.id
    }

    fn collection(state: &ClinicState) -> &Collection<Self> {
        &state.tenants
    }

    fn collection_mut(state: &mut ClinicState) -> &mut Collection<Self> {
        &mut state.tenants
    }
}

/// When the clinic takes appointments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatingHours {
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    /// Empty means every day
    #[serde(default)]
    pub working_days: Vec<Weekday>,
    /// Offset of the clinic's local time from UTC
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for OperatingHours {
    fn default() -> Self {
        Self {
            opens_at: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            closes_at: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default(),
            working_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            utc_offset_minutes: 0,
        }
    }
}

/// Tone and focus handed to the AI collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    pub personality: String,
    pub focus: String,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            personality: "professional".into(),
            focus: "clinical nutrition".into(),
        }
    }
}

/// Fields a settings update may change. `None` leaves the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicSettings {
    pub name: Option<String>,
    pub operating_hours: Option<OperatingHours>,
    pub ai: Option<AiSettings>,
}

/// Input for registering a clinic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClinic {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub operating_hours: Option<OperatingHours>,
    #[serde(default)]
    pub ai: Option<AiSettings>,
}
