//! Lab reports and their markers.

use crate::collection::impl_entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a marker's value sits against its reference range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Interpretation {
    Low,
    Normal,
    High,
    /// No usable reference range
    Unknown,
}

/// Inclusive reference bounds. Either side may be open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRange {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl ReferenceRange {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    /// Classify a value. Open ranges on both sides give `Unknown`.
    pub fn classify(&self, value: f64) -> Interpretation {
        if !value.is_finite() || (self.min.is_none() && self.max.is_none()) {
            return Interpretation::Unknown;
        }
        if self.min.is_some_and(|min| value < min) {
            Interpretation::Low
        } else if self.max.is_some_and(|max| value > max) {
            Interpretation::High
        } else {
            Interpretation::Normal
        }
    }
}

/// One measured lab marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub reference: ReferenceRange,
    pub interpretation: Interpretation,
}

impl Marker {
    /// Build a marker with its interpretation derived from the range.
    pub fn new(
        name: impl Into<String>,
        value: f64,
        unit: Option<String>,
        reference: ReferenceRange,
    ) -> Self {
        let interpretation = reference.classify(value);
        Self {
            name: name.into(),
            value,
            unit,
            reference,
            interpretation,
        }
    }

    pub fn is_abnormal(&self) -> bool {
        matches!(
            self.interpretation,
            Interpretation::Low | Interpretation::High
        )
    }
}

/// Who produced an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisSource {
    /// The AI collaborator answered
    Ai,
    /// Local rules stood in; reduced confidence
    Fallback,
}

/// Interpretation of one marker inside an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerInsight {
    pub name: String,
    pub interpretation: String,
}

/// Structured analysis of an exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamAnalysis {
    pub source: AnalysisSource,
    #[serde(default)]
    pub markers: Vec<MarkerInsight>,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub causes: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// A lab report attached to a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    pub clinic_id: String,
    pub patient_id: String,
    pub title: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub analysis: Option<ExamAnalysis>,
}

impl_entity!(Exam, "exams", exams);

impl Exam {
    pub fn abnormal_markers(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter().filter(|m| m.is_abnormal())
    }
}

/// Marker as supplied by callers; interpretation is derived on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerInput {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub reference: ReferenceRange,
}

/// Input for a new exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamInput {
    pub patient_id: String,
    pub title: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub markers: Vec<MarkerInput>,
}
