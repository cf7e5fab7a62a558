//! The persisted state blob.
//!
//! [`ClinicState`] is what gets written to local storage and pushed to the
//! remote document store: one JSON object with a top-level array per entity
//! type plus a `lastModified` epoch-millisecond stamp used by reconciliation.
//! Field order is fixed by the struct, and records keep insertion order, so
//! serializing the same state twice yields identical bytes.
//!
//! The local blob can also carry clinics that are not active. Their records
//! stay in the same collections, keyed by `clinicId`, and their modification
//! stamps live in `parkedModified`. [`ClinicState::split_tenant`] and
//! [`ClinicState::absorb_parked`] move between the blob and one clinic's view.

use crate::alerts::ClinicalAlert;
use crate::appointment::Appointment;
use crate::collection::Collection;
use crate::events::PatientEvent;
use crate::exam::Exam;
use crate::patient::Patient;
use crate::records::{Assessment, ExamRequest, Prescription};
use crate::seed::SEED_PATIENT_COUNT;
use crate::staff::{Professional, User};
use crate::tenant::Clinic;
use crate::{error::Result, Error, TenantId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Version of the state format for future compatibility.
pub const STATE_FORMAT_VERSION: u32 = 1;

fn current_format_version() -> u32 {
    STATE_FORMAT_VERSION
}

/// Full in-memory state of the active clinic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicState {
    /// State format version
    #[serde(default = "current_format_version")]
    pub format_version: u32,
    /// Clinic this blob was loaded for. Absent in blobs written before tenancy.
    #[serde(default)]
    pub active_tenant: Option<TenantId>,
    #[serde(default)]
    pub tenants: Collection<Clinic>,
    #[serde(default)]
    pub users: Collection<User>,
    #[serde(default)]
    pub professionals: Collection<Professional>,
    #[serde(default)]
    pub patients: Collection<Patient>,
    #[serde(default)]
    pub appointments: Collection<Appointment>,
    #[serde(default)]
    pub exams: Collection<Exam>,
    #[serde(default)]
    pub alerts: Collection<ClinicalAlert>,
    #[serde(default)]
    pub events: Collection<PatientEvent>,
    #[serde(default)]
    pub exam_requests: Collection<ExamRequest>,
    #[serde(default)]
    pub assessments: Collection<Assessment>,
    #[serde(default)]
    pub prescriptions: Collection<Prescription>,
    /// Milliseconds since epoch of the last mutation
    #[serde(default)]
    pub last_modified: Option<Timestamp>,
    /// One-shot migrations already applied to this blob
    #[serde(default)]
    pub completed_migrations: BTreeSet<String>,
    /// Last modification of each inactive clinic stored in this blob
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parked_modified: BTreeMap<TenantId, Timestamp>,
}

impl Default for ClinicState {
    fn default() -> Self {
        Self {
            format_version: STATE_FORMAT_VERSION,
            active_tenant: None,
            tenants: Collection::new(),
            users: Collection::new(),
            professionals: Collection::new(),
            patients: Collection::new(),
            appointments: Collection::new(),
            exams: Collection::new(),
            alerts: Collection::new(),
            events: Collection::new(),
            exam_requests: Collection::new(),
            assessments: Collection::new(),
            prescriptions: Collection::new(),
            last_modified: None,
            completed_migrations: BTreeSet::new(),
            parked_modified: BTreeMap::new(),
        }
    }
}

impl ClinicState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the blob still looks like the untouched demo seed: no more
    /// patients than the seed ships and no appointments at all.
    pub fn looks_freshly_seeded(&self) -> bool {
        self.patients.len() <= SEED_PATIENT_COUNT && self.appointments.is_empty()
    }

    /// Whether the migration with this key has already run.
    pub fn migration_done(&self, key: &str) -> bool {
        self.completed_migrations.contains(key)
    }

    /// Whether the blob carries data for `tenant_id`, as its active clinic
    /// or a parked one. Blobs written before tenancy belong to the clinic
    /// they list, or to anyone when they list none.
    pub fn holds_tenant(&self, tenant_id: &str) -> bool {
        match self.active_tenant.as_deref() {
            Some(active) => active == tenant_id || self.parked_modified.contains_key(tenant_id),
            None => self.tenants.is_empty() || self.tenants.contains(tenant_id),
        }
    }

    /// Split a stored blob into `tenant_id`'s own view and the other clinics
    /// parked beside it.
    ///
    /// The view is `None` when the blob holds nothing for that clinic. It
    /// keeps the whole clinic registry and carries the clinic's own stamp.
    /// The outgoing active clinic's stamp moves into the parked side.
    pub fn split_tenant(mut self, tenant_id: &str) -> (Option<ClinicState>, ClinicState) {
        let held = self.holds_tenant(tenant_id);

        let mut stamps = std::mem::take(&mut self.parked_modified);
        let own_stamp = match self.active_tenant.take() {
            Some(active) if active != tenant_id => {
                if let Some(ts) = self.last_modified {
                    stamps.insert(active, ts);
                }
                stamps.remove(tenant_id)
            }
            _ => {
                stamps.remove(tenant_id);
                self.last_modified
            }
        };

        let mut parked = ClinicState {
            format_version: self.format_version,
            tenants: self.tenants.clone(),
            users: self.users.split_off_others(tenant_id),
            professionals: self.professionals.split_off_others(tenant_id),
            patients: self.patients.split_off_others(tenant_id),
            appointments: self.appointments.split_off_others(tenant_id),
            exams: self.exams.split_off_others(tenant_id),
            alerts: self.alerts.split_off_others(tenant_id),
            events: self.events.split_off_others(tenant_id),
            exam_requests: self.exam_requests.split_off_others(tenant_id),
            assessments: self.assessments.split_off_others(tenant_id),
            prescriptions: self.prescriptions.split_off_others(tenant_id),
            completed_migrations: self.completed_migrations.clone(),
            parked_modified: stamps,
            ..ClinicState::default()
        };
        parked.tenants.retain(|clinic| clinic.id != tenant_id);

        self.active_tenant = Some(tenant_id.to_string());
        self.last_modified = own_stamp;
        (held.then_some(self), parked)
    }

    /// Fold clinics parked by [`ClinicState::split_tenant`] back in, giving
    /// the blob to write locally. Records already present win.
    pub fn absorb_parked(&mut self, parked: &ClinicState) {
        self.tenants.absorb(&parked.tenants);
        self.users.absorb(&parked.users);
        self.professionals.absorb(&parked.professionals);
        self.patients.absorb(&parked.patients);
        self.appointments.absorb(&parked.appointments);
        self.exams.absorb(&parked.exams);
        self.alerts.absorb(&parked.alerts);
        self.events.absorb(&parked.events);
        self.exam_requests.absorb(&parked.exam_requests);
        self.assessments.absorb(&parked.assessments);
        self.prescriptions.absorb(&parked.prescriptions);
        self.completed_migrations
            .extend(parked.completed_migrations.iter().cloned());
        for (tenant_id, ts) in &parked.parked_modified {
            if self.active_tenant.as_deref() != Some(tenant_id.as_str()) {
                self.parked_modified.entry(tenant_id.clone()).or_insert(*ts);
            }
        }
    }

    /// Whether the state holds no records and no parked stamps.
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0 && self.parked_modified.is_empty()
    }

    /// Count records across all collections.
    pub fn record_count(&self) -> usize {
        self.tenants.len()
            + self.users.len()
            + self.professionals.len()
            + self.patients.len()
            + self.appointments.len()
            + self.exams.len()
            + self.alerts.len()
            + self.events.len()
            + self.exam_requests.len()
            + self.assessments.len()
            + self.prescriptions.len()
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidState(e.to_string()))
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidState(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let state: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidState(e.to_string()))?;
        state.check_format()?;
        Ok(state)
    }

    /// Deserialize from an already parsed JSON document.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let state: Self =
            serde_json::from_value(value).map_err(|e| Error::InvalidState(e.to_string()))?;
        state.check_format()?;
        Ok(state)
    }

    fn check_format(&self) -> Result<()> {
        if self.format_version > STATE_FORMAT_VERSION {
            return Err(Error::InvalidState(format!(
                "unsupported state format version: {} (max supported: {})",
                self.format_version, STATE_FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Summary of the state without the data.
    pub fn metadata(&self) -> StateMetadata {
        StateMetadata::from(self)
    }
}

/// Summary of a state blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMetadata {
    pub format_version: u32,
    pub active_tenant: Option<TenantId>,
    pub last_modified: Option<Timestamp>,
    pub patient_count: usize,
    pub appointment_count: usize,
    pub record_count: usize,
}

impl From<&ClinicState> for StateMetadata {
    fn from(state: &ClinicState) -> Self {
        Self {
            format_version: state.format_version,
            active_tenant: state.active_tenant.clone(),
            last_modified: state.last_modified,
            patient_count: state.patients.len(),
            appointment_count: state.appointments.len(),
            record_count: state.record_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed;

    #[test]
    fn empty_state() {
        let state = ClinicState::new();
        assert_eq!(state.format_version, STATE_FORMAT_VERSION);
        assert_eq!(state.record_count(), 0);
        assert!(state.looks_freshly_seeded());
    }

    #[test]
    fn json_uses_persisted_field_names() {
        let state = ClinicState::new();
        let value: serde_json::Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();
        for key in [
            "tenants",
            "users",
            "professionals",
            "patients",
            "appointments",
            "exams",
            "alerts",
            "events",
            "examRequests",
            "assessments",
            "prescriptions",
            "lastModified",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn seed_roundtrip_is_deep_equal() {
        let mut state = seed::default_state(1_700_000_000_000);
        state.last_modified = Some(1_700_000_000_123);
        state.completed_migrations.insert("events-backfill:demo".into());

        let json = state.to_json().unwrap();
        let restored = ClinicState::from_json(&json).unwrap();
        assert_eq!(state, restored);
        assert_eq!(json, restored.to_json().unwrap());
    }

    #[test]
    fn legacy_blob_without_optional_fields() {
        let json = r#"{"patients": [], "appointments": []}"#;
        let state = ClinicState::from_json(json).unwrap();
        assert_eq!(state.format_version, STATE_FORMAT_VERSION);
        assert_eq!(state.last_modified, None);
        assert_eq!(state.active_tenant, None);
    }

    #[test]
    fn reject_future_format_version() {
        let json = r#"{"formatVersion": 999, "patients": []}"#;
        let result = ClinicState::from_json(json);
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }

    #[test]
    fn reject_garbage() {
        assert!(matches!(
            ClinicState::from_json("not json"),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn seeded_heuristic() {
        let state = seed::default_state(0);
        assert!(state.looks_freshly_seeded());
        assert_eq!(state.patients.len(), SEED_PATIENT_COUNT);
    }

    #[test]
    fn split_parks_other_clinics_and_restores_them() {
        let mut demo = seed::default_state(0);
        demo.last_modified = Some(100);

        let (view, parked) = demo.clone().split_tenant("acme");
        assert!(view.is_none());
        assert_eq!(parked.patients.len(), SEED_PATIENT_COUNT);
        assert_eq!(parked.parked_modified.get(seed::SEED_TENANT_ID), Some(&100));

        let mut acme = seed::seed_for("acme", "acme", "Acme", 0);
        acme.last_modified = Some(200);
        acme.absorb_parked(&parked);
        let blob = ClinicState::from_json(&acme.to_json().unwrap()).unwrap();
        assert_eq!(blob.patients.len(), 2 * SEED_PATIENT_COUNT);
        assert!(blob.holds_tenant(seed::SEED_TENANT_ID));
        assert!(!blob.holds_tenant("elsewhere"));

        let (view, parked) = blob.split_tenant(seed::SEED_TENANT_ID);
        let view = view.unwrap();
        assert_eq!(view.active_tenant.as_deref(), Some(seed::SEED_TENANT_ID));
        assert_eq!(view.last_modified, Some(100));
        assert!(view.parked_modified.is_empty());
        assert_eq!(view.patients, demo.patients);
        assert!(view.tenants.contains("acme"));
        assert!(parked.patients.iter().all(|p| p.clinic_id == "acme"));
        assert!(!parked.tenants.contains(seed::SEED_TENANT_ID));
        assert_eq!(parked.parked_modified.get("acme"), Some(&200));
        assert!(!parked.parked_modified.contains_key(seed::SEED_TENANT_ID));
    }

    #[test]
    fn legacy_blob_belongs_to_the_clinic_it_lists() {
        let mut legacy = seed::default_state(0);
        legacy.active_tenant = None;
        assert!(legacy.holds_tenant(seed::SEED_TENANT_ID));
        assert!(!legacy.holds_tenant("acme"));

        let (view, parked) = legacy.split_tenant(seed::SEED_TENANT_ID);
        assert_eq!(view.unwrap().patients.len(), SEED_PATIENT_COUNT);
        assert!(parked.is_empty());
    }

    #[test]
    fn metadata_counts() {
        let state = seed::default_state(0);
        let meta = state.metadata();
        assert_eq!(meta.patient_count, SEED_PATIENT_COUNT);
        assert_eq!(meta.appointment_count, 0);
        assert_eq!(meta.record_count, state.record_count());
        assert_eq!(meta.active_tenant.as_deref(), Some(seed::SEED_TENANT_ID));
    }
}
