//! Patient aggregate and its nested documents.

use crate::body::{BodyComposition, Measurements, SkinfoldProtocol};
use crate::collection::impl_entity;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Biological sex used by the body-composition equations and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// A patient and everything recorded about them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub clinic_id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    pub gender: Gender,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Professional allowed to see this patient in professional mode
    #[serde(default)]
    pub assigned_professional_id: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub pathologies: Vec<String>,
    #[serde(default)]
    pub objective: Option<String>,
    /// Latest measurement
    #[serde(default)]
    pub anthropometry: Option<AnthropometrySnapshot>,
    /// Every measurement, oldest first
    #[serde(default)]
    pub anthropometry_history: Vec<AnthropometrySnapshot>,
    #[serde(default)]
    pub plans: Vec<NutritionalPlan>,
    #[serde(default)]
    pub financial: Vec<FinancialTransaction>,
    #[serde(default)]
    pub notes: Vec<ClinicalNote>,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl_entity!(Patient, "patients", patients);

impl Patient {
    /// Age in whole years on the given date.
    pub fn age_on(&self, date: NaiveDate) -> Option<u32> {
        let birth = self.birth_date?;
        let mut years = date.year() - birth.year();
        if (date.month(), date.day()) < (birth.month(), birth.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }

    /// Date of the most recent anthropometry entry.
    pub fn last_measured_at(&self) -> Option<DateTime<Utc>> {
        self.anthropometry_history
            .iter()
            .map(|s| s.date)
            .max()
            .or_else(|| self.anthropometry.as_ref().map(|s| s.date))
    }

    /// The plan currently in force, if any.
    pub fn active_plan(&self) -> Option<&NutritionalPlan> {
        self.plans.iter().find(|p| p.status == PlanStatus::Active)
    }

    /// Transaction linked to an appointment.
    pub fn transaction_for(&self, appointment_id: &str) -> Option<&FinancialTransaction> {
        self.financial
            .iter()
            .find(|t| t.appointment_id.as_deref() == Some(appointment_id))
    }
}

/// One measurement session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnthropometrySnapshot {
    pub id: String,
    pub date: DateTime<Utc>,
    pub measurements: Measurements,
    pub protocol: SkinfoldProtocol,
    pub composition: BodyComposition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Draft,
    Active,
    Archived,
}

/// A nutritional plan. At most one per patient is `Active`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionalPlan {
    pub id: String,
    pub title: String,
    pub status: PlanStatus,
    #[serde(default)]
    pub daily_calories: Option<f64>,
    /// Free-form meal structure
    #[serde(default)]
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    Pix,
    Transfer,
    Insurance,
}

/// A charge or payment on the patient's account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialTransaction {
    pub id: String,
    pub amount: f64,
    pub status: PaymentStatus,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    pub description: String,
    pub date: DateTime<Utc>,
    /// Set when the charge came from an appointment
    #[serde(default)]
    pub appointment_id: Option<String>,
}

impl FinancialTransaction {
    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }
}

/// A free-text clinical note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalNote {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub author_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Demographic and clinical fields supplied by callers on create/update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInput {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    pub gender: Gender,
    #[serde(default)]
    pub assigned_professional_id: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub pathologies: Vec<String>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Input for a measurement session. Composition is derived on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnthropometryInput {
    /// Defaults to now
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    pub measurements: Measurements,
    #[serde(default)]
    pub protocol: SkinfoldProtocol,
}

/// Input for a new plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInput {
    pub title: String,
    #[serde(default)]
    pub daily_calories: Option<f64>,
    #[serde(default)]
    pub content: serde_json::Value,
    /// Activate right away, archiving the current active plan
    #[serde(default)]
    pub activate: bool,
}

/// Input for a manual transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    pub amount: f64,
    pub status: PaymentStatus,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    pub description: String,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}
