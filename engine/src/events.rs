//! Append-only patient event log.
//!
//! Events are written in two ways:
//!
//! - [`append`] at mutation time, called by the store. It never fails the
//!   caller: an event that cannot be recorded is reported through `tracing`
//!   and dropped.
//! - [`backfill`], a one-shot migration per clinic that synthesizes history
//!   from existing records for patients with no events. Its completion is
//!   recorded in the state's migration markers and synthetic ids derive from
//!   the source record, so a second run is a no-op.
//!
//! The patient timeline is a query over this log ([`timeline`]), not a copy
//! stored on the patient.

use crate::collection::impl_entity;
use crate::state::ClinicState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    PatientCreated,
    PatientUpdated,
    AnthropometryRecorded,
    PlanCreated,
    PlanActivated,
    TransactionRecorded,
    TransactionVoided,
    NoteAdded,
    AppointmentScheduled,
    AppointmentUpdated,
    AppointmentCompleted,
    AppointmentMissed,
    AppointmentCanceled,
    AppointmentRemoved,
    ExamAdded,
    ExamAnalyzed,
    AlertResolved,
    ExamRequested,
    AssessmentRecorded,
    PrescriptionIssued,
}

impl EventType {
    /// Short tag used in synthetic event ids.
    pub fn tag(self) -> &'static str {
        match self {
            EventType::PatientCreated => "patient-created",
            EventType::PatientUpdated => "patient-updated",
            EventType::AnthropometryRecorded => "anthropometry",
            EventType::PlanCreated => "plan",
            EventType::PlanActivated => "plan-activated",
            EventType::TransactionRecorded => "transaction",
            EventType::TransactionVoided => "transaction-voided",
            EventType::NoteAdded => "note",
            EventType::AppointmentScheduled => "appointment",
            EventType::AppointmentUpdated => "appointment-updated",
            EventType::AppointmentCompleted => "appointment-completed",
            EventType::AppointmentMissed => "appointment-missed",
            EventType::AppointmentCanceled => "appointment-canceled",
            EventType::AppointmentRemoved => "appointment-removed",
            EventType::ExamAdded => "exam",
            EventType::ExamAnalyzed => "exam-analyzed",
            EventType::AlertResolved => "alert-resolved",
            EventType::ExamRequested => "exam-request",
            EventType::AssessmentRecorded => "assessment",
            EventType::PrescriptionIssued => "prescription",
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientEvent {
    pub id: String,
    pub clinic_id: String,
    pub patient_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub payload: Value,
    pub summary: String,
    #[serde(default)]
    pub actor: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Synthesized by the backfill migration rather than logged live
    #[serde(default)]
    pub synthetic: bool,
}

impl_entity!(PatientEvent, "events", events);

/// Event about to be logged.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub patient_id: String,
    pub event_type: EventType,
    pub payload: Value,
    pub summary: String,
}

impl NewEvent {
    pub fn new(
        patient_id: impl Into<String>,
        event_type: EventType,
        payload: Value,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            event_type,
            payload,
            summary: summary.into(),
        }
    }
}

/// Record an event. Never fails: an event for an unknown patient is dropped
/// with a warning. Returns whether it was recorded.
pub fn log_event(
    state: &mut ClinicState,
    tenant_id: &str,
    event: NewEvent,
    actor: Option<&str>,
    at: DateTime<Utc>,
) -> bool {
    let owned = state
        .patients
        .get(&event.patient_id)
        .is_some_and(|p| p.clinic_id == tenant_id);
    if !owned {
        warn!(
            tenant_id = %tenant_id,
            patient_id = %event.patient_id,
            event_type = ?event.event_type,
            "dropping event for unknown patient"
        );
        return false;
    }

    debug!(patient_id = %event.patient_id, event_type = ?event.event_type, "event logged");
    state.events.insert(PatientEvent {
        id: uuid::Uuid::new_v4().to_string(),
        clinic_id: tenant_id.to_string(),
        patient_id: event.patient_id,
        event_type: event.event_type,
        payload: event.payload,
        summary: event.summary,
        actor: actor.map(str::to_string),
        created_at: at,
        synthetic: false,
    });
    true
}

/// Migration marker for one clinic.
pub fn backfill_marker(tenant_id: &str) -> String {
    format!("events-backfill:{tenant_id}")
}

/// Stable id of a synthesized event.
pub fn synthetic_id(source_id: &str, event_type: EventType) -> String {
    format!("bf-{source_id}-{}", event_type.tag())
}

/// Outcome of a backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    /// The marker was already present; nothing ran
    pub skipped: bool,
    pub patients: usize,
    pub events: usize,
}

/// Synthesize history for every patient of the clinic that has no events,
/// then record the migration marker.
pub fn backfill(state: &mut ClinicState, tenant_id: &str) -> BackfillReport {
    let marker = backfill_marker(tenant_id);
    if state.migration_done(&marker) {
        return BackfillReport {
            skipped: true,
            ..Default::default()
        };
    }

    let mut synthesized = Vec::new();
    let mut patients = 0;

    for patient in state.patients.for_tenant(tenant_id) {
        if state.events.iter().any(|e| e.patient_id == patient.id) {
            continue;
        }
        patients += 1;

        let mut push = |source_id: &str,
                        event_type: EventType,
                        created_at: DateTime<Utc>,
                        payload: Value,
                        summary: String| {
            synthesized.push(PatientEvent {
                id: synthetic_id(source_id, event_type),
                clinic_id: tenant_id.to_string(),
                patient_id: patient.id.clone(),
                event_type,
                payload,
                summary,
                actor: None,
                created_at,
                synthetic: true,
            });
        };

        push(
            &patient.id,
            EventType::PatientCreated,
            patient.created_at,
            json!({ "name": patient.name }),
            format!("Patient {} registered", patient.name),
        );
        for snapshot in &patient.anthropometry_history {
            push(
                &snapshot.id,
                EventType::AnthropometryRecorded,
                snapshot.date,
                json!({
                    "weightKg": snapshot.measurements.weight_kg,
                    "bmi": snapshot.composition.bmi,
                    "bodyFatPercent": snapshot.composition.body_fat_percent,
                }),
                format!("Anthropometry recorded ({:.1} kg)", snapshot.measurements.weight_kg),
            );
        }
        for plan in &patient.plans {
            push(
                &plan.id,
                EventType::PlanCreated,
                plan.created_at,
                json!({ "title": plan.title }),
                format!("Plan \"{}\" created", plan.title),
            );
        }
        for tx in &patient.financial {
            push(
                &tx.id,
                EventType::TransactionRecorded,
                tx.date,
                json!({ "amount": tx.amount, "status": tx.status }),
                format!("Transaction of {:.2} recorded", tx.amount),
            );
        }
        for note in &patient.notes {
            push(
                &note.id,
                EventType::NoteAdded,
                note.created_at,
                Value::Null,
                "Clinical note added".to_string(),
            );
        }
        for appt in state
            .appointments
            .for_tenant(tenant_id)
            .filter(|a| a.patient_id == patient.id)
        {
            push(
                &appt.id,
                EventType::AppointmentScheduled,
                appt.start,
                json!({ "status": appt.status, "professionalId": appt.professional_id }),
                format!("Appointment on {}", appt.start.format("%Y-%m-%d %H:%M")),
            );
        }
        for exam in state
            .exams
            .for_tenant(tenant_id)
            .filter(|e| e.patient_id == patient.id)
        {
            push(
                &exam.id,
                EventType::ExamAdded,
                exam.date,
                json!({ "title": exam.title }),
                format!("Exam \"{}\" added", exam.title),
            );
        }
    }

    let events = synthesized.len();
    for event in synthesized {
        if !state.events.contains(&event.id) {
            state.events.insert(event);
        }
    }
    state.completed_migrations.insert(marker);

    info!(tenant_id = %tenant_id, patients, events, "event backfill complete");
    BackfillReport {
        skipped: false,
        patients,
        events,
    }
}

/// A patient's events, newest first.
pub fn timeline<'a>(state: &'a ClinicState, patient_id: &str) -> Vec<&'a PatientEvent> {
    let mut events: Vec<_> = state
        .events
        .iter()
        .filter(|e| e.patient_id == patient_id)
        .collect();
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    events
}
