//! Store - the in-memory state container.
//!
//! The [`Store`] owns the [`ClinicState`] of the active clinic and is the only
//! way to change it. Every mutation follows the same order:
//!
//! 1. validate the input (a failure leaves the state untouched)
//! 2. swap whole records in their collection
//! 3. append a patient event when the change is patient-scoped
//! 4. stamp `lastModified`
//! 5. notify change listeners
//!
//! Persistence is not the store's concern. Callers compare
//! [`Store::revision`] before and after a call to know whether anything
//! needs writing.

use crate::access::{self, AccessScope};
use crate::alerts::{self, AlertResolution, AlertStatus, ClinicalAlert};
use crate::appointment::{Appointment, AppointmentInput, AppointmentStatus};
use crate::body;
use crate::clock::Clock;
use crate::collection::Entity;
use crate::error::Result;
use crate::events::{self, BackfillReport, EventType, NewEvent, PatientEvent};
use crate::exam::{Exam, ExamAnalysis, ExamInput, Marker};
use crate::ledger::{Ledger, PatientLedger};
use crate::patient::{
    AnthropometryInput, AnthropometrySnapshot, ClinicalNote, FinancialTransaction,
    NutritionalPlan, Patient, PatientInput, PlanInput, PlanStatus, TransactionInput,
};
use crate::records::{
    Assessment, AssessmentInput, ExamRequest, ExamRequestInput, Prescription, PrescriptionInput,
};
use crate::staff::{NewUser, Professional, ProfessionalInput, Role, User};
use crate::state::ClinicState;
use crate::stats::{self, DashboardStats};
use crate::tenant::{Clinic, ClinicSettings, NewClinic};
use crate::validation;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
    /// The whole state was swapped (reconciliation, reset)
    Reloaded,
}

/// Notification sent to listeners after a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub tenant_id: String,
    pub collection: &'static str,
    pub id: String,
    pub kind: ChangeKind,
}

/// Observer of store mutations.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, change: &Change);
}

impl<F> ChangeListener for F
where
    F: Fn(&Change) + Send + Sync,
{
    fn on_change(&self, change: &Change) {
        self(change)
    }
}

/// Records that hang off a single patient.
pub trait PatientRecord: Entity {
    fn patient_id(&self) -> &str;
}

macro_rules! impl_patient_record {
    ($($ty:ty),+) => {
        $(impl PatientRecord for $ty {
            fn patient_id(&self) -> &str {
                &self.patient_id
            }
        })+
    };
}

impl_patient_record!(
    Appointment,
    Exam,
    ClinicalAlert,
    PatientEvent,
    ExamRequest,
    Assessment,
    Prescription
);

/// Outcome of removing a professional.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalRemoval {
    pub professional: Professional,
    pub canceled_appointments: Vec<String>,
    pub removed_users: Vec<String>,
    pub unassigned_patients: usize,
}

/// Outcome of a clinic reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetReport {
    pub removed_records: usize,
    pub kept_users: usize,
}

/// The main store holding all state.
pub struct Store {
    state: ClinicState,
    clock: Arc<dyn Clock>,
    ledger: Box<dyn Ledger>,
    listeners: Vec<Arc<dyn ChangeListener>>,
    /// User id recorded on events
    actor: Option<String>,
    /// Bumped on every change, persisted or not
    revision: u64,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("active_tenant", &self.state.active_tenant)
            .field("last_modified", &self.state.last_modified)
            .field("revision", &self.revision)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Store {
    /// Create an empty store.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_state(ClinicState::new(), clock)
    }

    /// Create a store over an existing state.
    pub fn with_state(state: ClinicState, clock: Arc<dyn Clock>) -> Self {
        Self {
            state,
            clock,
            ledger: Box::new(PatientLedger),
            listeners: Vec::new(),
            actor: None,
            revision: 0,
        }
    }

    /// Use a different financial ledger.
    pub fn with_ledger(mut self, ledger: impl Ledger + 'static) -> Self {
        self.ledger = Box::new(ledger);
        self
    }

    pub fn subscribe(&mut self, listener: Arc<dyn ChangeListener>) {
        self.listeners.push(listener);
    }

    /// Set the user recorded as actor on subsequent events.
    pub fn set_actor(&mut self, actor: Option<String>) {
        self.actor = actor;
    }

    pub fn state(&self) -> &ClinicState {
        &self.state
    }

    pub fn active_tenant(&self) -> Option<&str> {
        self.state.active_tenant.as_deref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Swap the whole state, as reconciliation does. `lastModified` is kept
    /// as loaded.
    pub fn replace_state(&mut self, state: ClinicState) {
        self.state = state;
        self.revision += 1;
        let tenant_id = self.state.active_tenant.clone().unwrap_or_default();
        self.notify(&tenant_id, "state", &tenant_id, ChangeKind::Reloaded);
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn touch(&mut self) {
        self.state.last_modified = Some(self.clock.now_millis());
        self.revision += 1;
    }

    fn notify(&self, tenant_id: &str, collection: &'static str, id: &str, kind: ChangeKind) {
        if self.listeners.is_empty() {
            return;
        }
        let change = Change {
            tenant_id: tenant_id.to_string(),
            collection,
            id: id.to_string(),
            kind,
        };
        for listener in &self.listeners {
            listener.on_change(&change);
        }
    }

    fn log(&mut self, tenant_id: &str, event: NewEvent) {
        let at = self.clock.now();
        events::log_event(&mut self.state, tenant_id, event, self.actor.as_deref(), at);
    }

    fn find<T: Entity>(&self, tenant_id: &str, id: &str) -> Result<&T> {
        T::collection(&self.state)
            .get(id)
            .filter(|r| r.tenant_id() == tenant_id)
            .ok_or_else(|| Error::not_found(T::COLLECTION, id))
    }

    fn put<T: Entity>(&mut self, record: T) {
        T::collection_mut(&mut self.state).replace(record);
    }

    /// Clone a patient, change the copy, then swap it in.
    fn edit_patient<R, F>(&mut self, tenant_id: &str, patient_id: &str, edit: F) -> Result<R>
    where
        F: FnOnce(&mut Patient) -> Result<R>,
    {
        let mut patient = self.find::<Patient>(tenant_id, patient_id)?.clone();
        let out = edit(&mut patient)?;
        self.state.patients.replace(patient);
        Ok(out)
    }

    fn ensure_unique_email(&self, tenant_id: &str, email: &str) -> Result<()> {
        if self.state.users.for_tenant(tenant_id).any(|u| u.has_email(email)) {
            return Err(Error::DuplicateEmail(email.to_string()));
        }
        Ok(())
    }

    fn ensure_professional(&self, tenant_id: &str, id: Option<&str>) -> Result<()> {
        match id {
            Some(id) => self.find::<Professional>(tenant_id, id).map(|_| ()),
            None => Ok(()),
        }
    }

    // ---------------------------------------------------------------------
    // Clinics
    // ---------------------------------------------------------------------

    pub fn clinic(&self, tenant_id: &str) -> Result<&Clinic> {
        self.state
            .tenants
            .get(tenant_id)
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))
    }

    pub fn clinic_by_slug(&self, slug: &str) -> Option<&Clinic> {
        let slug = slug.trim();
        self.state
            .tenants
            .iter()
            .find(|c| c.slug.eq_ignore_ascii_case(slug))
    }

    pub fn create_clinic(&mut self, input: NewClinic) -> Result<Clinic> {
        let slug = validation::slug(&input.slug)?;
        let name = validation::required("name", &input.name)?.to_string();
        if self.clinic_by_slug(&slug).is_some() || self.state.tenants.contains(&slug) {
            return Err(Error::invalid("slug", format!("'{slug}' is already in use")));
        }
        if let Some(hours) = &input.operating_hours {
            if hours.closes_at <= hours.opens_at {
                return Err(Error::invalid("operatingHours", "closing must be after opening"));
            }
        }

        // The slug doubles as the id so a device that has never seen the
        // clinic can still address its remote document.
        let clinic = Clinic {
            id: slug.clone(),
            slug,
            name,
            operating_hours: input.operating_hours.unwrap_or_default(),
            ai: input.ai.unwrap_or_default(),
        };
        self.state.tenants.insert(clinic.clone());
        self.touch();
        self.notify(&clinic.id, Clinic::COLLECTION, &clinic.id, ChangeKind::Created);
        info!(tenant_id = %clinic.id, slug = %clinic.slug, "clinic created");
        Ok(clinic)
    }

    pub fn update_clinic_settings(
        &mut self,
        tenant_id: &str,
        settings: ClinicSettings,
    ) -> Result<Clinic> {
        let mut clinic = self.clinic(tenant_id)?.clone();
        if let Some(name) = &settings.name {
            clinic.name = validation::required("name", name)?.to_string();
        }
        if let Some(hours) = settings.operating_hours {
            if hours.closes_at <= hours.opens_at {
                return Err(Error::invalid("operatingHours", "closing must be after opening"));
            }
            clinic.operating_hours = hours;
        }
        if let Some(ai) = settings.ai {
            clinic.ai = ai;
        }

        self.put(clinic.clone());
        self.touch();
        self.notify(tenant_id, Clinic::COLLECTION, tenant_id, ChangeKind::Updated);
        Ok(clinic)
    }

    /// Remove everything the clinic owns except the clinic itself, its
    /// administrators and the professionals they are linked to.
    pub fn reset_tenant(&mut self, tenant_id: &str) -> Result<ResetReport> {
        self.clinic(tenant_id)?;

        let kept_professionals: Vec<String> = self
            .state
            .users
            .for_tenant(tenant_id)
            .filter(|u| u.role.is_admin())
            .filter_map(|u| u.professional_id.clone())
            .collect();
        let owned = |clinic_id: &str| clinic_id == tenant_id;

        let state = &mut self.state;
        let mut removed = 0;
        removed += state
            .users
            .retain(|u| !owned(&u.clinic_id) || u.role.is_admin());
        removed += state
            .professionals
            .retain(|p| !owned(&p.clinic_id) || kept_professionals.contains(&p.id));
        removed += state.patients.retain(|r| !owned(&r.clinic_id));
        removed += state.appointments.retain(|r| !owned(&r.clinic_id));
        removed += state.exams.retain(|r| !owned(&r.clinic_id));
        removed += state.alerts.retain(|r| !owned(&r.clinic_id));
        removed += state.events.retain(|r| !owned(&r.clinic_id));
        removed += state.exam_requests.retain(|r| !owned(&r.clinic_id));
        removed += state.assessments.retain(|r| !owned(&r.clinic_id));
        removed += state.prescriptions.retain(|r| !owned(&r.clinic_id));
        let kept_users = state.users.for_tenant(tenant_id).count();

        self.touch();
        self.notify(tenant_id, "state", tenant_id, ChangeKind::Reloaded);
        warn!(tenant_id = %tenant_id, removed, "clinic data reset");
        Ok(ResetReport {
            removed_records: removed,
            kept_users,
        })
    }

    // ---------------------------------------------------------------------
    // Users and professionals
    // ---------------------------------------------------------------------

    pub fn users(&self, tenant_id: &str) -> Vec<&User> {
        self.state.users.for_tenant(tenant_id).collect()
    }

    pub fn user(&self, tenant_id: &str, id: &str) -> Result<&User> {
        self.find(tenant_id, id)
    }

    pub fn find_user_by_email(&self, tenant_id: &str, email: &str) -> Option<&User> {
        self.state
            .users
            .for_tenant(tenant_id)
            .find(|u| u.has_email(email))
    }

    /// Create a login user. Email is unique per clinic, ignoring case.
    pub fn create_user(&mut self, tenant_id: &str, input: NewUser) -> Result<User> {
        self.clinic(tenant_id)?;
        let name = validation::required("name", &input.name)?.to_string();
        let email = validation::email("email", &input.email)?;
        self.ensure_unique_email(tenant_id, &email)?;
        self.ensure_professional(tenant_id, input.professional_id.as_deref())?;

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            clinic_id: tenant_id.to_string(),
            name,
            email,
            credential_ref: input.credential_ref,
            role: input.role,
            professional_id: input.professional_id,
        };
        self.state.users.insert(user.clone());
        self.touch();
        self.notify(tenant_id, User::COLLECTION, &user.id, ChangeKind::Created);
        Ok(user)
    }

    pub fn delete_user(&mut self, tenant_id: &str, id: &str) -> Result<User> {
        let user = self.find::<User>(tenant_id, id)?;
        if user.role.is_admin() {
            let admins = self
                .state
                .users
                .for_tenant(tenant_id)
                .filter(|u| u.role.is_admin())
                .count();
            if admins <= 1 {
                return Err(Error::NotAllowed(
                    "the last administrator of a clinic cannot be removed".into(),
                ));
            }
        }
        let removed = self
            .state
            .users
            .remove(id)
            .ok_or_else(|| Error::not_found(User::COLLECTION, id))?;
        self.touch();
        self.notify(tenant_id, User::COLLECTION, id, ChangeKind::Deleted);
        Ok(removed)
    }

    pub fn professionals(&self, tenant_id: &str) -> Vec<&Professional> {
        self.state.professionals.for_tenant(tenant_id).collect()
    }

    pub fn professional(&self, tenant_id: &str, id: &str) -> Result<&Professional> {
        self.find(tenant_id, id)
    }

    /// Create a professional. With an email, a linked login user is created
    /// too; the email is checked before anything is written.
    pub fn create_professional(
        &mut self,
        tenant_id: &str,
        input: ProfessionalInput,
    ) -> Result<(Professional, Option<User>)> {
        self.clinic(tenant_id)?;
        let name = validation::required("name", &input.name)?.to_string();
        let email = match input.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => {
                let email = validation::email("email", email)?;
                self.ensure_unique_email(tenant_id, &email)?;
                Some(email)
            }
            _ => None,
        };

        let professional = Professional {
            id: uuid::Uuid::new_v4().to_string(),
            clinic_id: tenant_id.to_string(),
            name: name.clone(),
            specialty: validation::optional(input.specialty.as_deref()),
            registration_number: validation::optional(input.registration_number.as_deref()),
            color: validation::optional(input.color.as_deref()),
            email: email.clone(),
            is_active: true,
        };
        self.state.professionals.insert(professional.clone());

        let user = email.map(|email| User {
            id: uuid::Uuid::new_v4().to_string(),
            clinic_id: tenant_id.to_string(),
            name,
            email,
            credential_ref: None,
            role: Role::Professional,
            professional_id: Some(professional.id.clone()),
        });
        if let Some(user) = &user {
            self.state.users.insert(user.clone());
        }

        self.touch();
        self.notify(tenant_id, Professional::COLLECTION, &professional.id, ChangeKind::Created);
        if let Some(user) = &user {
            self.notify(tenant_id, User::COLLECTION, &user.id, ChangeKind::Created);
        }
        Ok((professional, user))
    }

    /// Update profile fields. Email and active flag are left alone.
    pub fn update_professional(
        &mut self,
        tenant_id: &str,
        id: &str,
        input: ProfessionalInput,
    ) -> Result<Professional> {
        let name = validation::required("name", &input.name)?.to_string();
        let mut professional = self.find::<Professional>(tenant_id, id)?.clone();
        professional.name = name;
        professional.specialty = validation::optional(input.specialty.as_deref());
        professional.registration_number =
            validation::optional(input.registration_number.as_deref());
        professional.color = validation::optional(input.color.as_deref());

        self.put(professional.clone());
        self.touch();
        self.notify(tenant_id, Professional::COLLECTION, id, ChangeKind::Updated);
        Ok(professional)
    }

    pub fn deactivate_professional(&mut self, tenant_id: &str, id: &str) -> Result<Professional> {
        let mut professional = self.find::<Professional>(tenant_id, id)?.clone();
        professional.is_active = false;
        self.put(professional.clone());
        self.touch();
        self.notify(tenant_id, Professional::COLLECTION, id, ChangeKind::Updated);
        Ok(professional)
    }

    /// Hard-remove a professional.
    ///
    /// Future scheduled or confirmed appointments are canceled, login users
    /// linked to the profile are removed (administrators only lose the link),
    /// and patients assigned to it become unassigned.
    pub fn remove_professional(&mut self, tenant_id: &str, id: &str) -> Result<ProfessionalRemoval> {
        let professional = self.find::<Professional>(tenant_id, id)?.clone();
        let now = self.clock.now();

        let to_cancel: Vec<Appointment> = self
            .state
            .appointments
            .for_tenant(tenant_id)
            .filter(|a| {
                a.professional_id == id
                    && a.start > now
                    && matches!(
                        a.status,
                        AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
                    )
            })
            .cloned()
            .collect();
        let mut canceled_appointments = Vec::with_capacity(to_cancel.len());
        for mut appointment in to_cancel {
            appointment.status = AppointmentStatus::Canceled;
            self.put(appointment.clone());
            self.log(
                tenant_id,
                NewEvent::new(
                    appointment.patient_id.as_str(),
                    EventType::AppointmentCanceled,
                    json!({ "appointmentId": appointment.id, "reason": "professional removed" }),
                    format!(
                        "Appointment on {} canceled: {} was removed",
                        appointment.start.format("%Y-%m-%d %H:%M"),
                        professional.name
                    ),
                ),
            );
            canceled_appointments.push(appointment.id);
        }

        let linked: Vec<User> = self
            .state
            .users
            .for_tenant(tenant_id)
            .filter(|u| u.professional_id.as_deref() == Some(id))
            .cloned()
            .collect();
        let mut removed_users = Vec::new();
        for mut user in linked {
            if user.role.is_admin() {
                user.professional_id = None;
                self.put(user);
            } else {
                self.state.users.remove(&user.id);
                removed_users.push(user.id);
            }
        }

        let assigned: Vec<Patient> = self
            .state
            .patients
            .for_tenant(tenant_id)
            .filter(|p| p.assigned_professional_id.as_deref() == Some(id))
            .cloned()
            .collect();
        let unassigned_patients = assigned.len();
        for mut patient in assigned {
            patient.assigned_professional_id = None;
            self.put(patient);
        }

        self.state.professionals.remove(id);
        self.touch();
        for appointment_id in &canceled_appointments {
            self.notify(tenant_id, Appointment::COLLECTION, appointment_id, ChangeKind::Updated);
        }
        for user_id in &removed_users {
            self.notify(tenant_id, User::COLLECTION, user_id, ChangeKind::Deleted);
        }
        self.notify(tenant_id, Professional::COLLECTION, id, ChangeKind::Deleted);
        info!(
            tenant_id = %tenant_id,
            professional_id = %id,
            canceled = canceled_appointments.len(),
            "professional removed"
        );

        Ok(ProfessionalRemoval {
            professional,
            canceled_appointments,
            removed_users,
            unassigned_patients,
        })
    }

    // ---------------------------------------------------------------------
    // Patients
    // ---------------------------------------------------------------------

    pub fn patients(&self, tenant_id: &str, scope: &AccessScope) -> Vec<&Patient> {
        access::patients(&self.state, tenant_id, scope)
    }

    pub fn patient(&self, tenant_id: &str, scope: &AccessScope, id: &str) -> Result<&Patient> {
        access::patient(&self.state, tenant_id, scope, id)
            .ok_or_else(|| Error::not_found(Patient::COLLECTION, id))
    }

    fn check_patient_input(&self, tenant_id: &str, input: &PatientInput) -> Result<()> {
        validation::required("name", &input.name)?;
        if let Some(email) = input.email.as_deref().filter(|e| !e.trim().is_empty()) {
            validation::email("email", email)?;
        }
        self.ensure_professional(tenant_id, input.assigned_professional_id.as_deref())
    }

    fn apply_patient_input(patient: &mut Patient, input: PatientInput) {
        patient.name = input.name.trim().to_string();
        patient.email = validation::optional(input.email.as_deref()).map(|e| e.to_lowercase());
        patient.phone = validation::optional(input.phone.as_deref());
        patient.birth_date = input.birth_date;
        patient.gender = input.gender;
        patient.is_active = input.is_active;
        patient.assigned_professional_id = input.assigned_professional_id;
        patient.diagnosis = validation::optional(input.diagnosis.as_deref());
        patient.pathologies = input
            .pathologies
            .iter()
            .filter_map(|p| validation::optional(Some(p)))
            .collect();
        patient.objective = validation::optional(input.objective.as_deref());
    }

    pub fn create_patient(&mut self, tenant_id: &str, input: PatientInput) -> Result<Patient> {
        self.clinic(tenant_id)?;
        self.check_patient_input(tenant_id, &input)?;

        let mut patient = Patient {
            id: uuid::Uuid::new_v4().to_string(),
            clinic_id: tenant_id.to_string(),
            name: String::new(),
            email: None,
            phone: None,
            birth_date: None,
            gender: input.gender,
            is_active: true,
            assigned_professional_id: None,
            diagnosis: None,
            pathologies: Vec::new(),
            objective: None,
            anthropometry: None,
            anthropometry_history: Vec::new(),
            plans: Vec::new(),
            financial: Vec::new(),
            notes: Vec::new(),
            created_at: self.clock.now(),
        };
        Self::apply_patient_input(&mut patient, input);

        self.state.patients.insert(patient.clone());
        self.log(
            tenant_id,
            NewEvent::new(
                patient.id.as_str(),
                EventType::PatientCreated,
                json!({ "name": patient.name }),
                format!("Patient {} registered", patient.name),
            ),
        );
        self.touch();
        self.notify(tenant_id, Patient::COLLECTION, &patient.id, ChangeKind::Created);
        Ok(patient)
    }

    /// Update demographic and clinical fields. Nested documents are kept.
    pub fn update_patient(&mut self, tenant_id: &str, id: &str, input: PatientInput) -> Result<Patient> {
        self.check_patient_input(tenant_id, &input)?;
        let patient = self.edit_patient(tenant_id, id, |patient| {
            Self::apply_patient_input(patient, input);
            Ok(patient.clone())
        })?;

        self.log(
            tenant_id,
            NewEvent::new(
                id,
                EventType::PatientUpdated,
                serde_json::Value::Null,
                format!("Patient {} updated", patient.name),
            ),
        );
        self.touch();
        self.notify(tenant_id, Patient::COLLECTION, id, ChangeKind::Updated);
        Ok(patient)
    }

    /// Delete a patient and every record that hangs off it.
    pub fn delete_patient(&mut self, tenant_id: &str, id: &str) -> Result<Patient> {
        self.find::<Patient>(tenant_id, id)?;
        let patient = self
            .state
            .patients
            .remove(id)
            .ok_or_else(|| Error::not_found(Patient::COLLECTION, id))?;

        let state = &mut self.state;
        let cascaded = state.appointments.retain(|r| r.patient_id != id)
            + state.exams.retain(|r| r.patient_id != id)
            + state.alerts.retain(|r| r.patient_id != id)
            + state.events.retain(|r| r.patient_id != id)
            + state.exam_requests.retain(|r| r.patient_id != id)
            + state.assessments.retain(|r| r.patient_id != id)
            + state.prescriptions.retain(|r| r.patient_id != id);

        self.touch();
        self.notify(tenant_id, Patient::COLLECTION, id, ChangeKind::Deleted);
        debug!(tenant_id = %tenant_id, patient_id = %id, cascaded, "patient deleted");
        Ok(patient)
    }

    /// Record a measurement session and derive its body composition.
    pub fn record_anthropometry(
        &mut self,
        tenant_id: &str,
        patient_id: &str,
        input: AnthropometryInput,
    ) -> Result<AnthropometrySnapshot> {
        validation::positive_amount("weightKg", input.measurements.weight_kg)?;
        validation::positive_amount("height", input.measurements.height)?;
        let date = input.date.unwrap_or_else(|| self.clock.now());

        let snapshot = self.edit_patient(tenant_id, patient_id, |patient| {
            let age = patient.age_on(date.date_naive()).unwrap_or(0);
            let composition =
                body::compute(&input.measurements, input.protocol, patient.gender, age);
            let snapshot = AnthropometrySnapshot {
                id: uuid::Uuid::new_v4().to_string(),
                date,
                measurements: input.measurements,
                protocol: input.protocol,
                composition,
            };
            patient.anthropometry_history.push(snapshot.clone());
            patient.anthropometry_history.sort_by_key(|s| s.date);
            patient.anthropometry = patient.anthropometry_history.last().cloned();
            Ok(snapshot)
        })?;

        self.log(
            tenant_id,
            NewEvent::new(
                patient_id,
                EventType::AnthropometryRecorded,
                json!({
                    "weightKg": snapshot.measurements.weight_kg,
                    "bmi": snapshot.composition.bmi,
                    "bodyFatPercent": snapshot.composition.body_fat_percent,
                }),
                format!(
                    "Anthropometry recorded ({:.1} kg, BMI {:.1})",
                    snapshot.measurements.weight_kg, snapshot.composition.bmi
                ),
            ),
        );
        self.touch();
        self.notify(tenant_id, Patient::COLLECTION, patient_id, ChangeKind::Updated);
        Ok(snapshot)
    }

    /// Add a plan. When `activate` is set, the current active plan is archived.
    pub fn add_plan(
        &mut self,
        tenant_id: &str,
        patient_id: &str,
        input: PlanInput,
    ) -> Result<NutritionalPlan> {
        let title = validation::required("title", &input.title)?.to_string();
        let daily_calories = validation::non_negative("dailyCalories", input.daily_calories)?;
        let now = self.clock.now();

        let plan = self.edit_patient(tenant_id, patient_id, |patient| {
            let status = if input.activate {
                for plan in &mut patient.plans {
                    if plan.status == PlanStatus::Active {
                        plan.status = PlanStatus::Archived;
                    }
                }
                PlanStatus::Active
            } else {
                PlanStatus::Draft
            };
            let plan = NutritionalPlan {
                id: uuid::Uuid::new_v4().to_string(),
                title,
                status,
                daily_calories,
                content: input.content,
                created_at: now,
            };
            patient.plans.push(plan.clone());
            Ok(plan)
        })?;

        self.log(
            tenant_id,
            NewEvent::new(
                patient_id,
                EventType::PlanCreated,
                json!({ "planId": plan.id, "title": plan.title }),
                format!("Plan \"{}\" created", plan.title),
            ),
        );
        if plan.status == PlanStatus::Active {
            self.log(
                tenant_id,
                NewEvent::new(
                    patient_id,
                    EventType::PlanActivated,
                    json!({ "planId": plan.id }),
                    format!("Plan \"{}\" activated", plan.title),
                ),
            );
        }
        self.touch();
        self.notify(tenant_id, Patient::COLLECTION, patient_id, ChangeKind::Updated);
        Ok(plan)
    }

    /// Make one plan the active one; any other active plan is archived.
    pub fn activate_plan(
        &mut self,
        tenant_id: &str,
        patient_id: &str,
        plan_id: &str,
    ) -> Result<NutritionalPlan> {
        let plan = self.edit_patient(tenant_id, patient_id, |patient| {
            if !patient.plans.iter().any(|p| p.id == plan_id) {
                return Err(Error::not_found("plans", plan_id));
            }
            let mut activated = None;
            for plan in &mut patient.plans {
                if plan.id == plan_id {
                    plan.status = PlanStatus::Active;
                    activated = Some(plan.clone());
                } else if plan.status == PlanStatus::Active {
                    plan.status = PlanStatus::Archived;
                }
            }
            activated.ok_or_else(|| Error::not_found("plans", plan_id))
        })?;

        self.log(
            tenant_id,
            NewEvent::new(
                patient_id,
                EventType::PlanActivated,
                json!({ "planId": plan.id }),
                format!("Plan \"{}\" activated", plan.title),
            ),
        );
        self.touch();
        self.notify(tenant_id, Patient::COLLECTION, patient_id, ChangeKind::Updated);
        Ok(plan)
    }

    pub fn record_transaction(
        &mut self,
        tenant_id: &str,
        patient_id: &str,
        input: TransactionInput,
    ) -> Result<FinancialTransaction> {
        let amount = validation::positive_amount("amount", input.amount)?;
        let description = validation::required("description", &input.description)?.to_string();
        let date = input.date.unwrap_or_else(|| self.clock.now());

        let transaction = self.edit_patient(tenant_id, patient_id, |patient| {
            let transaction = FinancialTransaction {
                id: uuid::Uuid::new_v4().to_string(),
                amount,
                status: input.status,
                method: input.method,
                description,
                date,
                appointment_id: None,
            };
            patient.financial.push(transaction.clone());
            Ok(transaction)
        })?;

        self.log(
            tenant_id,
            NewEvent::new(
                patient_id,
                EventType::TransactionRecorded,
                json!({ "transactionId": transaction.id, "amount": transaction.amount, "status": transaction.status }),
                format!("Transaction of {:.2} recorded", transaction.amount),
            ),
        );
        self.touch();
        self.notify(tenant_id, Patient::COLLECTION, patient_id, ChangeKind::Updated);
        Ok(transaction)
    }

    pub fn add_note(&mut self, tenant_id: &str, patient_id: &str, text: &str) -> Result<ClinicalNote> {
        let text = validation::required("text", text)?.to_string();
        let now = self.clock.now();
        let author_id = self.actor.clone();

        let note = self.edit_patient(tenant_id, patient_id, |patient| {
            let note = ClinicalNote {
                id: uuid::Uuid::new_v4().to_string(),
                text,
                author_id,
                created_at: now,
            };
            patient.notes.push(note.clone());
            Ok(note)
        })?;

        self.log(
            tenant_id,
            NewEvent::new(
                patient_id,
                EventType::NoteAdded,
                json!({ "noteId": note.id }),
                "Clinical note added",
            ),
        );
        self.touch();
        self.notify(tenant_id, Patient::COLLECTION, patient_id, ChangeKind::Updated);
        Ok(note)
    }

    // ---------------------------------------------------------------------
    // Appointments
    // ---------------------------------------------------------------------

    pub fn appointments(&self, tenant_id: &str, scope: &AccessScope) -> Vec<&Appointment> {
        access::appointments(&self.state, tenant_id, scope)
    }

    pub fn appointment(&self, tenant_id: &str, scope: &AccessScope, id: &str) -> Result<&Appointment> {
        self.find::<Appointment>(tenant_id, id)
            .ok()
            .filter(|a| scope.can_see_appointment(a))
            .ok_or_else(|| Error::not_found(Appointment::COLLECTION, id))
    }

    /// Create (no `id`) or update (with `id`) an appointment.
    ///
    /// A positive price posts a transaction through the ledger. An update that
    /// clears the price, or moves the appointment to another patient, voids
    /// the transaction posted before. If posting fails on create, the new
    /// appointment is removed again and a [`Error::Compensated`] comes back.
    /// On update the appointment change stays and the ledger error is
    /// returned as is.
    pub fn save_appointment(&mut self, tenant_id: &str, input: AppointmentInput) -> Result<Appointment> {
        let hours = self.clinic(tenant_id)?.operating_hours.clone();
        self.find::<Patient>(tenant_id, &input.patient_id)?;
        let professional = self.find::<Professional>(tenant_id, &input.professional_id)?;
        let professional_active = professional.is_active;
        validation::schedule(&hours, input.start, input.end)?;
        let price = validation::non_negative("price", input.price)?;

        match input.id.clone() {
            Some(id) => {
                let existing = self.find::<Appointment>(tenant_id, &id)?.clone();
                let updated = Appointment {
                    id: id.clone(),
                    clinic_id: tenant_id.to_string(),
                    patient_id: input.patient_id,
                    professional_id: input.professional_id,
                    start: input.start,
                    end: input.end,
                    status: input.status.unwrap_or(existing.status),
                    notes: validation::optional(input.notes.as_deref()),
                    price,
                    payment_status: input.payment_status,
                    payment_method: input.payment_method,
                };
                self.put(updated.clone());
                let event_type = match (existing.status == updated.status, updated.status) {
                    (false, AppointmentStatus::Completed) => EventType::AppointmentCompleted,
                    (false, AppointmentStatus::Missed) => EventType::AppointmentMissed,
                    (false, AppointmentStatus::Canceled) => EventType::AppointmentCanceled,
                    _ => EventType::AppointmentUpdated,
                };
                self.log(
                    tenant_id,
                    NewEvent::new(
                        updated.patient_id.as_str(),
                        event_type,
                        json!({ "appointmentId": id, "status": updated.status }),
                        format!("Appointment on {} updated", updated.start.format("%Y-%m-%d %H:%M")),
                    ),
                );
                self.touch();
                self.notify(tenant_id, Appointment::COLLECTION, &id, ChangeKind::Updated);

                if existing.patient_id != updated.patient_id || updated.billable_amount().is_none() {
                    if let Err(e) = self.void_in_ledger(tenant_id, &existing.patient_id, &id) {
                        warn!(tenant_id = %tenant_id, appointment_id = %id, error = %e, "voiding the appointment's transaction failed");
                        return Err(e);
                    }
                }
                if updated.billable_amount().is_some() {
                    if let Err(e) = self.post_to_ledger(tenant_id, &updated) {
                        warn!(tenant_id = %tenant_id, appointment_id = %id, error = %e, "ledger write failed on appointment update");
                        return Err(e);
                    }
                }
                Ok(updated)
            }
            None => {
                if !professional_active {
                    return Err(Error::invalid(
                        "professionalId",
                        "the professional is inactive",
                    ));
                }
                let appointment = Appointment {
                    id: uuid::Uuid::new_v4().to_string(),
                    clinic_id: tenant_id.to_string(),
                    patient_id: input.patient_id,
                    professional_id: input.professional_id,
                    start: input.start,
                    end: input.end,
                    status: input.status.unwrap_or(AppointmentStatus::Scheduled),
                    notes: validation::optional(input.notes.as_deref()),
                    price,
                    payment_status: input.payment_status,
                    payment_method: input.payment_method,
                };
                self.state.appointments.insert(appointment.clone());

                if appointment.billable_amount().is_some() {
                    if let Err(cause) = self.post_to_ledger(tenant_id, &appointment) {
                        self.state.appointments.remove(&appointment.id);
                        warn!(
                            tenant_id = %tenant_id,
                            appointment_id = %appointment.id,
                            error = %cause,
                            "ledger write failed; appointment creation rolled back"
                        );
                        return Err(Error::Compensated {
                            intent: format!(
                                "scheduling the appointment on {}",
                                appointment.start.format("%Y-%m-%d %H:%M")
                            ),
                            rollback: "the appointment was not kept".into(),
                            cause: Box::new(cause),
                        });
                    }
                }

                self.log(
                    tenant_id,
                    NewEvent::new(
                        appointment.patient_id.as_str(),
                        EventType::AppointmentScheduled,
                        json!({ "appointmentId": appointment.id, "professionalId": appointment.professional_id }),
                        format!("Appointment scheduled on {}", appointment.start.format("%Y-%m-%d %H:%M")),
                    ),
                );
                self.touch();
                self.notify(tenant_id, Appointment::COLLECTION, &appointment.id, ChangeKind::Created);
                Ok(appointment)
            }
        }
    }

    fn post_to_ledger(&mut self, tenant_id: &str, appointment: &Appointment) -> Result<()> {
        let patient = self.find::<Patient>(tenant_id, &appointment.patient_id)?;
        let updated = self.ledger.post(patient, appointment, self.clock.now())?;
        let amount = appointment.billable_amount().unwrap_or_default();
        self.put(updated);
        self.log(
            tenant_id,
            NewEvent::new(
                appointment.patient_id.as_str(),
                EventType::TransactionRecorded,
                json!({ "appointmentId": appointment.id, "amount": amount }),
                format!("Transaction of {amount:.2} recorded for appointment"),
            ),
        );
        self.touch();
        self.notify(tenant_id, Patient::COLLECTION, &appointment.patient_id, ChangeKind::Updated);
        Ok(())
    }

    fn void_in_ledger(&mut self, tenant_id: &str, patient_id: &str, appointment_id: &str) -> Result<()> {
        let patient = self.find::<Patient>(tenant_id, patient_id)?;
        let Some(updated) = self.ledger.void(patient, appointment_id)? else {
            return Ok(());
        };
        self.put(updated);
        self.log(
            tenant_id,
            NewEvent::new(
                patient_id,
                EventType::TransactionVoided,
                json!({ "appointmentId": appointment_id }),
                "Transaction voided, the appointment is no longer billable",
            ),
        );
        self.touch();
        self.notify(tenant_id, Patient::COLLECTION, patient_id, ChangeKind::Updated);
        info!(tenant_id = %tenant_id, appointment_id = %appointment_id, "appointment transaction voided");
        Ok(())
    }

    /// Change only the status of an appointment.
    pub fn set_appointment_status(
        &mut self,
        tenant_id: &str,
        id: &str,
        status: AppointmentStatus,
    ) -> Result<Appointment> {
        let mut appointment = self.find::<Appointment>(tenant_id, id)?.clone();
        if appointment.status == status {
            return Ok(appointment);
        }
        appointment.status = status;
        self.put(appointment.clone());

        let event_type = match status {
            AppointmentStatus::Completed => EventType::AppointmentCompleted,
            AppointmentStatus::Missed => EventType::AppointmentMissed,
            AppointmentStatus::Canceled => EventType::AppointmentCanceled,
            _ => EventType::AppointmentUpdated,
        };
        self.log(
            tenant_id,
            NewEvent::new(
                appointment.patient_id.as_str(),
                event_type,
                json!({ "appointmentId": id, "status": status }),
                format!(
                    "Appointment on {} marked {:?}",
                    appointment.start.format("%Y-%m-%d %H:%M"),
                    status
                ),
            ),
        );
        self.touch();
        self.notify(tenant_id, Appointment::COLLECTION, id, ChangeKind::Updated);
        Ok(appointment)
    }

    /// Remove an appointment. A transaction already posted for it is kept.
    pub fn delete_appointment(&mut self, tenant_id: &str, id: &str) -> Result<Appointment> {
        self.find::<Appointment>(tenant_id, id)?;
        let appointment = self
            .state
            .appointments
            .remove(id)
            .ok_or_else(|| Error::not_found(Appointment::COLLECTION, id))?;
        self.log(
            tenant_id,
            NewEvent::new(
                appointment.patient_id.as_str(),
                EventType::AppointmentRemoved,
                json!({ "appointmentId": id }),
                format!(
                    "Appointment on {} removed",
                    appointment.start.format("%Y-%m-%d %H:%M")
                ),
            ),
        );
        self.touch();
        self.notify(tenant_id, Appointment::COLLECTION, id, ChangeKind::Deleted);
        Ok(appointment)
    }

    // ---------------------------------------------------------------------
    // Exams
    // ---------------------------------------------------------------------

    pub fn exam(&self, tenant_id: &str, scope: &AccessScope, id: &str) -> Result<&Exam> {
        let exam = self.find::<Exam>(tenant_id, id)?;
        self.patient(tenant_id, scope, &exam.patient_id)
            .map_err(|_| Error::not_found(Exam::COLLECTION, id))?;
        Ok(exam)
    }

    pub fn add_exam(&mut self, tenant_id: &str, input: ExamInput) -> Result<Exam> {
        self.find::<Patient>(tenant_id, &input.patient_id)?;
        let title = validation::required("title", &input.title)?.to_string();
        let mut markers = Vec::with_capacity(input.markers.len());
        for marker in input.markers {
            let name = validation::required("markers.name", &marker.name)?.to_string();
            if !marker.value.is_finite() {
                return Err(Error::invalid("markers.value", format!("{name} has no numeric value")));
            }
            markers.push(Marker::new(name, marker.value, marker.unit, marker.reference));
        }

        let exam = Exam {
            id: uuid::Uuid::new_v4().to_string(),
            clinic_id: tenant_id.to_string(),
            patient_id: input.patient_id,
            title,
            date: input.date,
            markers,
            analysis: None,
        };
        self.state.exams.insert(exam.clone());
        self.log(
            tenant_id,
            NewEvent::new(
                exam.patient_id.as_str(),
                EventType::ExamAdded,
                json!({ "examId": exam.id, "abnormal": exam.abnormal_markers().count() }),
                format!("Exam \"{}\" added", exam.title),
            ),
        );
        self.touch();
        self.notify(tenant_id, Exam::COLLECTION, &exam.id, ChangeKind::Created);
        Ok(exam)
    }

    pub fn attach_analysis(
        &mut self,
        tenant_id: &str,
        exam_id: &str,
        analysis: ExamAnalysis,
    ) -> Result<Exam> {
        let mut exam = self.find::<Exam>(tenant_id, exam_id)?.clone();
        let source = analysis.source;
        exam.analysis = Some(analysis);
        self.put(exam.clone());
        self.log(
            tenant_id,
            NewEvent::new(
                exam.patient_id.as_str(),
                EventType::ExamAnalyzed,
                json!({ "examId": exam_id, "source": source }),
                format!("Exam \"{}\" analysed", exam.title),
            ),
        );
        self.touch();
        self.notify(tenant_id, Exam::COLLECTION, exam_id, ChangeKind::Updated);
        Ok(exam)
    }

    pub fn delete_exam(&mut self, tenant_id: &str, id: &str) -> Result<Exam> {
        self.delete_record::<Exam>(tenant_id, id)
    }

    // ---------------------------------------------------------------------
    // Alerts
    // ---------------------------------------------------------------------

    /// Active and resolved alerts on patients visible through `scope`.
    pub fn alerts(&self, tenant_id: &str, scope: &AccessScope) -> Vec<&ClinicalAlert> {
        self.state
            .alerts
            .for_tenant(tenant_id)
            .filter(|a| access::patient(&self.state, tenant_id, scope, &a.patient_id).is_some())
            .collect()
    }

    /// Run the alert rules and insert what they raise.
    pub fn generate_alerts(&mut self, tenant_id: &str) -> Result<Vec<ClinicalAlert>> {
        self.clinic(tenant_id)?;
        let raised = alerts::evaluate(&self.state, tenant_id, self.clock.now());
        if raised.is_empty() {
            debug!(tenant_id = %tenant_id, "no new alerts");
            return Ok(raised);
        }

        for alert in &raised {
            self.state.alerts.insert(alert.clone());
        }
        self.touch();
        for alert in &raised {
            self.notify(tenant_id, ClinicalAlert::COLLECTION, &alert.id, ChangeKind::Created);
        }
        info!(tenant_id = %tenant_id, count = raised.len(), "alerts generated");
        Ok(raised)
    }

    pub fn resolve_alert(
        &mut self,
        tenant_id: &str,
        id: &str,
        note: Option<String>,
    ) -> Result<ClinicalAlert> {
        let mut alert = self.find::<ClinicalAlert>(tenant_id, id)?.clone();
        if !alert.is_active() {
            return Err(Error::NotAllowed("the alert is already resolved".into()));
        }
        alert.status = AlertStatus::Resolved;
        alert.resolution = Some(AlertResolution {
            resolved_at: self.clock.now(),
            resolved_by: self.actor.clone(),
            note: validation::optional(note.as_deref()),
        });
        self.put(alert.clone());
        self.log(
            tenant_id,
            NewEvent::new(
                alert.patient_id.as_str(),
                EventType::AlertResolved,
                json!({ "alertId": id, "type": alert.alert_type }),
                format!("Alert resolved: {}", alert.description),
            ),
        );
        self.touch();
        self.notify(tenant_id, ClinicalAlert::COLLECTION, id, ChangeKind::Updated);
        Ok(alert)
    }

    // ---------------------------------------------------------------------
    // Secondary documents
    // ---------------------------------------------------------------------

    /// Records of one type for a patient visible through `scope`.
    pub fn for_patient<T: PatientRecord>(
        &self,
        tenant_id: &str,
        scope: &AccessScope,
        patient_id: &str,
    ) -> Result<Vec<&T>> {
        self.patient(tenant_id, scope, patient_id)?;
        Ok(T::collection(&self.state)
            .for_tenant(tenant_id)
            .filter(|r| r.patient_id() == patient_id)
            .collect())
    }

    /// One record, if its patient is visible through `scope`.
    pub fn patient_record<T: PatientRecord>(
        &self,
        tenant_id: &str,
        scope: &AccessScope,
        id: &str,
    ) -> Result<&T> {
        let record = self.find::<T>(tenant_id, id)?;
        self.patient(tenant_id, scope, record.patient_id())
            .map_err(|_| Error::not_found(T::COLLECTION, id))?;
        Ok(record)
    }

    fn delete_record<T: PatientRecord>(&mut self, tenant_id: &str, id: &str) -> Result<T> {
        self.find::<T>(tenant_id, id)?;
        let record = T::collection_mut(&mut self.state)
            .remove(id)
            .ok_or_else(|| Error::not_found(T::COLLECTION, id))?;
        self.touch();
        self.notify(tenant_id, T::COLLECTION, id, ChangeKind::Deleted);
        Ok(record)
    }

    pub fn add_exam_request(&mut self, tenant_id: &str, input: ExamRequestInput) -> Result<ExamRequest> {
        self.find::<Patient>(tenant_id, &input.patient_id)?;
        self.ensure_professional(tenant_id, input.professional_id.as_deref())?;
        let exams: Vec<String> = input
            .exams
            .iter()
            .filter_map(|e| validation::optional(Some(e)))
            .collect();
        if exams.is_empty() {
            return Err(Error::MissingRequiredField("exams".into()));
        }

        let request = ExamRequest {
            id: uuid::Uuid::new_v4().to_string(),
            clinic_id: tenant_id.to_string(),
            patient_id: input.patient_id,
            professional_id: input.professional_id,
            exams,
            notes: validation::optional(input.notes.as_deref()),
            created_at: self.clock.now(),
        };
        self.state.exam_requests.insert(request.clone());
        self.log(
            tenant_id,
            NewEvent::new(
                request.patient_id.as_str(),
                EventType::ExamRequested,
                json!({ "requestId": request.id, "exams": request.exams }),
                format!("{} exam(s) requested", request.exams.len()),
            ),
        );
        self.touch();
        self.notify(tenant_id, ExamRequest::COLLECTION, &request.id, ChangeKind::Created);
        Ok(request)
    }

    pub fn delete_exam_request(&mut self, tenant_id: &str, id: &str) -> Result<ExamRequest> {
        self.delete_record::<ExamRequest>(tenant_id, id)
    }

    pub fn add_assessment(&mut self, tenant_id: &str, input: AssessmentInput) -> Result<Assessment> {
        self.find::<Patient>(tenant_id, &input.patient_id)?;
        let kind = validation::required("kind", &input.kind)?.to_string();
        if let Some(score) = input.score {
            if !score.is_finite() {
                return Err(Error::invalid("score", "must be a number"));
            }
        }

        let assessment = Assessment {
            id: uuid::Uuid::new_v4().to_string(),
            clinic_id: tenant_id.to_string(),
            patient_id: input.patient_id,
            kind,
            answers: input.answers,
            score: input.score,
            created_at: self.clock.now(),
        };
        self.state.assessments.insert(assessment.clone());
        self.log(
            tenant_id,
            NewEvent::new(
                assessment.patient_id.as_str(),
                EventType::AssessmentRecorded,
                json!({ "assessmentId": assessment.id, "kind": assessment.kind, "score": assessment.score }),
                format!("Assessment \"{}\" recorded", assessment.kind),
            ),
        );
        self.touch();
        self.notify(tenant_id, Assessment::COLLECTION, &assessment.id, ChangeKind::Created);
        Ok(assessment)
    }

    pub fn delete_assessment(&mut self, tenant_id: &str, id: &str) -> Result<Assessment> {
        self.delete_record::<Assessment>(tenant_id, id)
    }

    pub fn add_prescription(&mut self, tenant_id: &str, input: PrescriptionInput) -> Result<Prescription> {
        self.find::<Patient>(tenant_id, &input.patient_id)?;
        self.ensure_professional(tenant_id, input.professional_id.as_deref())?;
        if input.items.is_empty() {
            return Err(Error::MissingRequiredField("items".into()));
        }
        for item in &input.items {
            validation::required("items.name", &item.name)?;
        }

        let prescription = Prescription {
            id: uuid::Uuid::new_v4().to_string(),
            clinic_id: tenant_id.to_string(),
            patient_id: input.patient_id,
            professional_id: input.professional_id,
            items: input.items,
            created_at: self.clock.now(),
        };
        self.state.prescriptions.insert(prescription.clone());
        self.log(
            tenant_id,
            NewEvent::new(
                prescription.patient_id.as_str(),
                EventType::PrescriptionIssued,
                json!({ "prescriptionId": prescription.id, "items": prescription.items.len() }),
                format!("Prescription with {} item(s) issued", prescription.items.len()),
            ),
        );
        self.touch();
        self.notify(tenant_id, Prescription::COLLECTION, &prescription.id, ChangeKind::Created);
        Ok(prescription)
    }

    pub fn delete_prescription(&mut self, tenant_id: &str, id: &str) -> Result<Prescription> {
        self.delete_record::<Prescription>(tenant_id, id)
    }

    // ---------------------------------------------------------------------
    // Events and derived views
    // ---------------------------------------------------------------------

    /// A patient's events, newest first.
    pub fn timeline(
        &self,
        tenant_id: &str,
        scope: &AccessScope,
        patient_id: &str,
    ) -> Result<Vec<&PatientEvent>> {
        self.patient(tenant_id, scope, patient_id)?;
        Ok(events::timeline(&self.state, patient_id))
    }

    /// Run the one-shot event backfill for the clinic.
    pub fn run_event_backfill(&mut self, tenant_id: &str) -> BackfillReport {
        let report = events::backfill(&mut self.state, tenant_id);
        if !report.skipped {
            self.touch();
            self.notify(tenant_id, PatientEvent::COLLECTION, tenant_id, ChangeKind::Updated);
        }
        report
    }

    pub fn dashboard(&self, tenant_id: &str, scope: &AccessScope) -> DashboardStats {
        stats::dashboard(&self.state, tenant_id, scope, self.clock.now())
    }
}
