//! Clinical alerts and the rules that raise them.
//!
//! Rules run over active patients of one clinic. A rule never raises an alert
//! for a patient that already has an ACTIVE alert of the same type, so running
//! generation twice over unchanged data creates nothing the second time.

use crate::collection::impl_entity;
use crate::state::ClinicState;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Days without a new anthropometry entry before it is flagged.
pub const ANTHROPOMETRY_OVERDUE_DAYS: i64 = 30;
/// Days since the last visit, with nothing booked, before a return is flagged.
pub const RETURN_OVERDUE_DAYS: i64 = 45;
/// An exam younger than this with no visit after it needs attention.
pub const RECENT_EXAM_DAYS: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    AnthropometryOverdue,
    ReturnOverdue,
    ExamNeedsAttention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Active,
    Resolved,
}

/// Who closed an alert, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertResolution {
    pub resolved_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_by: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// A system-generated flag on one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalAlert {
    pub id: String,
    pub clinic_id: String,
    pub patient_id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub description: String,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolution: Option<AlertResolution>,
}

impl_entity!(ClinicalAlert, "alerts", alerts);

impl ClinicalAlert {
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

fn has_active(state: &ClinicState, patient_id: &str, alert_type: AlertType) -> bool {
    state
        .alerts
        .iter()
        .any(|a| a.patient_id == patient_id && a.alert_type == alert_type && a.is_active())
}

/// Evaluate every rule for the clinic's active patients.
///
/// Returns the alerts that should be inserted; the state is not touched.
pub fn evaluate(state: &ClinicState, tenant_id: &str, now: DateTime<Utc>) -> Vec<ClinicalAlert> {
    let mut raised = Vec::new();

    for patient in state.patients.for_tenant(tenant_id).filter(|p| p.is_active) {
        let mut raise = |alert_type: AlertType, severity: AlertSeverity, description: String| {
            if has_active(state, &patient.id, alert_type) {
                return;
            }
            raised.push(ClinicalAlert {
                id: uuid::Uuid::new_v4().to_string(),
                clinic_id: tenant_id.to_string(),
                patient_id: patient.id.clone(),
                alert_type,
                severity,
                description,
                status: AlertStatus::Active,
                created_at: now,
                resolution: None,
            });
        };

        if let Some(last) = patient.last_measured_at() {
            let days = (now - last).num_days();
            if days > ANTHROPOMETRY_OVERDUE_DAYS {
                raise(
                    AlertType::AnthropometryOverdue,
                    AlertSeverity::Medium,
                    format!("{} has not been measured for {days} days", patient.name),
                );
            }
        }

        let visits: Vec<_> = state
            .appointments
            .for_tenant(tenant_id)
            .filter(|a| a.patient_id == patient.id && a.status.is_live())
            .collect();

        let last_past = visits.iter().filter(|a| a.start < now).map(|a| a.start).max();
        let has_future = visits.iter().any(|a| a.start >= now);
        if let (Some(last), false) = (last_past, has_future) {
            let days = (now - last).num_days();
            if days > RETURN_OVERDUE_DAYS {
                raise(
                    AlertType::ReturnOverdue,
                    AlertSeverity::Medium,
                    format!(
                        "{} has no return booked; last visit {days} days ago",
                        patient.name
                    ),
                );
            }
        }

        let latest_exam = state
            .exams
            .for_tenant(tenant_id)
            .filter(|e| e.patient_id == patient.id && e.date <= now)
            .max_by_key(|e| e.date);
        if let Some(exam) = latest_exam {
            let recent = now - exam.date < Duration::days(RECENT_EXAM_DAYS);
            let seen_since = visits.iter().any(|a| a.start > exam.date && a.start <= now);
            if recent && !seen_since {
                let abnormal = exam.abnormal_markers().count();
                let severity = if abnormal > 0 {
                    AlertSeverity::High
                } else {
                    AlertSeverity::Medium
                };
                raise(
                    AlertType::ExamNeedsAttention,
                    severity,
                    format!(
                        "New exam \"{}\" for {} ({abnormal} abnormal markers) has not been reviewed in a visit",
                        exam.title, patient.name
                    ),
                );
            }
        }
    }

    raised
}
