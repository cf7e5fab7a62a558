//! Scheduled appointments.

use crate::collection::impl_entity;
use crate::patient::{PaymentMethod, PaymentStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Canceled,
    Missed,
}

impl AppointmentStatus {
    /// Whether the slot still counts as occupied.
    pub fn is_live(self) -> bool {
        self != AppointmentStatus::Canceled
    }
}

/// A scheduled interval linking one patient and one professional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub clinic_id: String,
    pub patient_id: String,
    pub professional_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

impl_entity!(Appointment, "appointments", appointments);

impl Appointment {
    /// Price when it is positive, i.e. when a transaction must back it.
    pub fn billable_amount(&self) -> Option<f64> {
        self.price.filter(|p| p.is_finite() && *p > 0.0)
    }
}

/// Input for creating or updating an appointment.
///
/// Carries an `id` only on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentInput {
    #[serde(default)]
    pub id: Option<String>,
    pub patient_id: String,
    pub professional_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn billable_only_when_positive() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let mut appt = Appointment {
            id: "a-1".into(),
            clinic_id: "c-1".into(),
            patient_id: "p-1".into(),
            professional_id: "pr-1".into(),
            start,
            end: start + chrono::Duration::minutes(45),
            status: AppointmentStatus::Scheduled,
            notes: None,
            price: None,
            payment_status: None,
            payment_method: None,
        };
        assert_eq!(appt.billable_amount(), None);

        appt.price = Some(0.0);
        assert_eq!(appt.billable_amount(), None);

        appt.price = Some(150.0);
        assert_eq!(appt.billable_amount(), Some(150.0));
    }

    #[test]
    fn status_wire_format() {
        let json = serde_json::to_string(&AppointmentStatus::Missed).unwrap();
        assert_eq!(json, "\"MISSED\"");
        assert!(!AppointmentStatus::Canceled.is_live());
        assert!(AppointmentStatus::Completed.is_live());
    }
}
