//! Secondary clinical documents: exam requests, assessments, prescriptions.

use crate::collection::impl_entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A request for lab exams handed to the patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRequest {
    pub id: String,
    pub clinic_id: String,
    pub patient_id: String,
    #[serde(default)]
    pub professional_id: Option<String>,
    pub exams: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl_entity!(ExamRequest, "examRequests", exam_requests);

/// A questionnaire or scored assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub clinic_id: String,
    pub patient_id: String,
    /// Which instrument was applied
    pub kind: String,
    #[serde(default)]
    pub answers: serde_json::Value,
    #[serde(default)]
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl_entity!(Assessment, "assessments", assessments);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionItem {
    pub name: String,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Supplements or medication prescribed to a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: String,
    pub clinic_id: String,
    pub patient_id: String,
    #[serde(default)]
    pub professional_id: Option<String>,
    pub items: Vec<PrescriptionItem>,
    pub created_at: DateTime<Utc>,
}

impl_entity!(Prescription, "prescriptions", prescriptions);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRequestInput {
    pub patient_id: String,
    #[serde(default)]
    pub professional_id: Option<String>,
    pub exams: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentInput {
    pub patient_id: String,
    pub kind: String,
    #[serde(default)]
    pub answers: serde_json::Value,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionInput {
    pub patient_id: String,
    #[serde(default)]
    pub professional_id: Option<String>,
    pub items: Vec<PrescriptionItem>,
}
