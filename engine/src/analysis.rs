//! AI-assisted exam analysis and plan critique.
//!
//! The model itself lives outside the engine. This module builds the prompts,
//! parses whatever comes back, and produces the deterministic local result
//! used when the model is unavailable or answers with something unusable.
//! Results always say which path produced them.

use crate::exam::{AnalysisSource, Exam, ExamAnalysis, Interpretation, MarkerInsight};
use crate::patient::{NutritionalPlan, Patient};
use crate::tenant::AiSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("no JSON object found in response")]
    NoJson,

    #[error("malformed analysis: {0}")]
    Malformed(String),

    #[error("analysis has no content")]
    Empty,
}

/// Shape the model is asked to answer with.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    #[serde(default)]
    markers: Vec<MarkerInsight>,
    #[serde(default)]
    findings: Vec<String>,
    #[serde(default)]
    causes: Vec<String>,
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default)]
    summary: Option<String>,
}

/// Parse the model's answer, tolerating prose around the JSON object.
pub fn parse_exam_analysis(raw: &str, at: DateTime<Utc>) -> Result<ExamAnalysis, ParseError> {
    let start = raw.find('{').ok_or(ParseError::NoJson)?;
    let end = raw.rfind('}').ok_or(ParseError::NoJson)?;
    if end < start {
        return Err(ParseError::NoJson);
    }

    let parsed: RawAnalysis = serde_json::from_str(&raw[start..=end])
        .map_err(|e| ParseError::Malformed(e.to_string()))?;
    if parsed.markers.is_empty()
        && parsed.findings.is_empty()
        && parsed.actions.is_empty()
        && parsed.summary.as_deref().map_or(true, |s| s.trim().is_empty())
    {
        return Err(ParseError::Empty);
    }

    Ok(ExamAnalysis {
        source: AnalysisSource::Ai,
        markers: parsed.markers,
        findings: parsed.findings,
        causes: parsed.causes,
        actions: parsed.actions,
        summary: parsed.summary,
        generated_at: at,
    })
}

/// Local analysis: every marker outside its range becomes a finding.
pub fn fallback_exam_analysis(exam: &Exam, at: DateTime<Utc>) -> ExamAnalysis {
    let markers = exam
        .markers
        .iter()
        .map(|m| MarkerInsight {
            name: m.name.clone(),
            interpretation: interpretation_label(m.interpretation).to_string(),
        })
        .collect();

    let findings: Vec<String> = exam
        .abnormal_markers()
        .map(|m| {
            let unit = m.unit.as_deref().unwrap_or("");
            format!(
                "{} is {} ({} {})",
                m.name,
                interpretation_label(m.interpretation),
                m.value,
                unit
            )
            .trim_end()
            .to_string()
        })
        .collect();

    let summary = if findings.is_empty() {
        "All markers with a reference range are within normal limits.".to_string()
    } else {
        format!(
            "{} marker(s) outside the reference range. Automatic analysis unavailable; review manually.",
            findings.len()
        )
    };
    let actions = if findings.is_empty() {
        Vec::new()
    } else {
        vec!["Review the flagged markers at the next visit".to_string()]
    };

    ExamAnalysis {
        source: AnalysisSource::Fallback,
        markers,
        findings,
        causes: Vec::new(),
        actions,
        summary: Some(summary),
        generated_at: at,
    }
}

fn interpretation_label(interpretation: Interpretation) -> &'static str {
    match interpretation {
        Interpretation::Low => "low",
        Interpretation::Normal => "normal",
        Interpretation::High => "high",
        Interpretation::Unknown => "without reference",
    }
}

/// Prompt asking the model for a JSON exam analysis.
pub fn exam_prompt(exam: &Exam, patient: Option<&Patient>, ai: &AiSettings) -> String {
    let mut prompt = format!(
        "You are a {} assistant focused on {}. Analyse the lab exam below and answer only with a JSON object \
         with the keys \"markers\" (array of {{\"name\", \"interpretation\"}}), \"findings\", \"causes\", \
         \"actions\" (arrays of strings) and \"summary\" (string).\n\n",
        ai.personality, ai.focus
    );
    if let Some(patient) = patient {
        prompt.push_str(&format!("Patient sex: {:?}\n", patient.gender));
        if let Some(diagnosis) = &patient.diagnosis {
            prompt.push_str(&format!("Diagnosis: {diagnosis}\n"));
        }
    }
    prompt.push_str(&format!("Exam: {} ({})\n", exam.title, exam.date.format("%Y-%m-%d")));
    for marker in &exam.markers {
        let range = match (marker.reference.min, marker.reference.max) {
            (Some(min), Some(max)) => format!("{min}-{max}"),
            (Some(min), None) => format!(">= {min}"),
            (None, Some(max)) => format!("<= {max}"),
            (None, None) => "no reference".to_string(),
        };
        prompt.push_str(&format!(
            "- {}: {} {} (reference {range})\n",
            marker.name,
            marker.value,
            marker.unit.as_deref().unwrap_or("")
        ));
    }
    prompt
}

/// Critique of a nutritional plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanCritique {
    pub source: AnalysisSource,
    pub text: String,
    pub generated_at: DateTime<Utc>,
}

/// Prompt asking the model for a plain-text plan review.
pub fn plan_critique_prompt(patient: &Patient, plan: &NutritionalPlan, ai: &AiSettings) -> String {
    format!(
        "You are a {} assistant focused on {}. Review this nutritional plan for the patient and point out \
         risks, gaps and concrete improvements in a few short paragraphs.\n\n\
         Objective: {}\nDiagnosis: {}\nPathologies: {}\nPlan: {}\nDaily calories: {}\nContent: {}\n",
        ai.personality,
        ai.focus,
        patient.objective.as_deref().unwrap_or("not informed"),
        patient.diagnosis.as_deref().unwrap_or("not informed"),
        if patient.pathologies.is_empty() {
            "none".to_string()
        } else {
            patient.pathologies.join(", ")
        },
        plan.title,
        plan.daily_calories
            .map(|c| format!("{c:.0} kcal"))
            .unwrap_or_else(|| "not informed".to_string()),
        plan.content
    )
}

/// Plan review used when the model is unavailable.
pub fn fallback_plan_critique(
    patient: &Patient,
    plan: &NutritionalPlan,
    at: DateTime<Utc>,
) -> PlanCritique {
    let mut notes = Vec::new();
    match plan.daily_calories {
        None => notes.push("No daily calorie target is set.".to_string()),
        Some(kcal) if kcal < 1200.0 => notes.push(format!(
            "The target of {kcal:.0} kcal is below 1200 kcal; confirm it is supervised."
        )),
        Some(_) => {}
    }
    if plan.content.is_null() {
        notes.push("The plan has no meal content yet.".to_string());
    }
    if patient.objective.is_none() {
        notes.push("The patient has no recorded objective to check the plan against.".to_string());
    }
    if !patient.pathologies.is_empty() {
        notes.push(format!(
            "Check the plan against: {}.",
            patient.pathologies.join(", ")
        ));
    }
    if notes.is_empty() {
        notes.push("No structural issues found.".to_string());
    }

    PlanCritique {
        source: AnalysisSource::Fallback,
        text: format!(
            "Automatic review unavailable; basic checks only.\n{}",
            notes.join("\n")
        ),
        generated_at: at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::{Marker, ReferenceRange};
    use crate::patient::PlanStatus;
    use crate::seed;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap()
    }

    fn exam() -> Exam {
        Exam {
            id: "e-1".into(),
            clinic_id: "c-1".into(),
            patient_id: "p-1".into(),
            title: "Routine".into(),
            date: at(),
            markers: vec![
                Marker::new("Glucose", 130.0, Some("mg/dL".into()), ReferenceRange::new(Some(70.0), Some(99.0))),
                Marker::new("Ferritin", 80.0, None, ReferenceRange::new(Some(30.0), Some(300.0))),
                Marker::new("Vitamin D", 18.0, Some("ng/mL".into()), ReferenceRange::new(Some(30.0), None)),
            ],
            analysis: None,
        }
    }

    #[test]
    fn parse_with_surrounding_prose() {
        let raw = r#"Sure! Here it is:
        {"findings": ["High glucose"], "actions": ["Repeat fasting glucose"], "summary": "Mild hyperglycemia"}
        Let me know if you need more."#;
        let analysis = parse_exam_analysis(raw, at()).unwrap();
        assert_eq!(analysis.source, AnalysisSource::Ai);
        assert_eq!(analysis.findings, vec!["High glucose".to_string()]);
        assert!(analysis.causes.is_empty());
    }

    #[test]
    fn parse_rejects_plain_text_and_empty_objects() {
        assert_eq!(parse_exam_analysis("no idea", at()), Err(ParseError::NoJson));
        assert_eq!(parse_exam_analysis("{}", at()), Err(ParseError::Empty));
        assert!(matches!(
            parse_exam_analysis("{ not json }", at()),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn fallback_flags_every_abnormal_marker() {
        let analysis = fallback_exam_analysis(&exam(), at());
        assert_eq!(analysis.source, AnalysisSource::Fallback);
        assert_eq!(analysis.findings.len(), 2);
        assert!(analysis.findings[0].starts_with("Glucose is high"));
        assert!(analysis.findings[1].starts_with("Vitamin D is low"));
        assert_eq!(analysis.markers.len(), 3);
    }

    #[test]
    fn fallback_on_clean_exam() {
        let mut clean = exam();
        clean.markers.truncate(0);
        let analysis = fallback_exam_analysis(&clean, at());
        assert!(analysis.findings.is_empty());
        assert!(analysis.actions.is_empty());
    }

    #[test]
    fn prompt_lists_markers() {
        let prompt = exam_prompt(&exam(), None, &AiSettings::default());
        assert!(prompt.contains("Glucose: 130"));
        assert!(prompt.contains("reference >= 30"));
    }

    #[test]
    fn fallback_critique_is_tagged() {
        let state = seed::default_state(0);
        let patient = state.patients.iter().next().unwrap();
        let plan = NutritionalPlan {
            id: "pl-1".into(),
            title: "Low carb".into(),
            status: PlanStatus::Active,
            daily_calories: Some(1000.0),
            content: serde_json::Value::Null,
            created_at: at(),
        };
        let critique = fallback_plan_critique(patient, &plan, at());
        assert_eq!(critique.source, AnalysisSource::Fallback);
        assert!(critique.text.contains("below 1200"));
        assert!(critique.text.contains("no meal content"));
    }
}
