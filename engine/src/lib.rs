//! # Clinic Engine
//!
//! Domain core for a local-first, multi-clinic practice manager.
//!
//! This crate owns the clinic state and every rule that changes it. It has no
//! knowledge of files, network or HTTP; the server crate wires it to storage
//! tiers and exposes it over the wire.
//!
//! ## Design Principles
//!
//! - **No IO**: persistence and remote sync live outside the engine
//! - **Whole-record updates**: records are swapped, never edited in place
//! - **Validate first**: a failed operation leaves the state untouched
//! - **Injected time**: every timestamp comes from a [`Clock`]
//!
//! ## Core Concepts
//!
//! ### State
//!
//! A [`ClinicState`] holds typed collections (clinics, users, professionals,
//! patients, appointments, exams, alerts, events and secondary records) plus
//! `lastModified` and the set of completed migrations. It serializes to one
//! JSON document, which is what both storage tiers hold.
//!
//! ### Store
//!
//! The [`Store`] is the only writer. Each mutation validates, swaps records,
//! appends a patient event, stamps `lastModified` and notifies listeners.
//! Callers look at [`Store::revision`] to know whether to persist.
//!
//! ### Reconciliation
//!
//! [`reconcile`] picks the local or the remote copy of a clinic's state,
//! whole-state and timestamp-gated. See the module docs for the rules.
//!
//! ### Derived views
//!
//! Dashboard statistics, clinical alerts and body composition are pure
//! functions of the state: [`stats`], [`alerts`] and [`body`].
//!
//! ## Quick Start
//!
//! ```rust
//! use clinic_engine::{seed, AccessScope, ManualClock, PatientInput, Gender, Store};
//! use std::sync::Arc;
//!
//! let clock = Arc::new(ManualClock::at_millis(1_709_546_400_000));
//! let mut store = Store::with_state(seed::default_state(0), clock);
//!
//! let patient = store
//!     .create_patient(
//!         seed::SEED_TENANT_ID,
//!         PatientInput {
//!             name: "Marina Alves".into(),
//!             email: None,
//!             phone: None,
//!             birth_date: None,
//!             gender: Gender::Female,
//!             assigned_professional_id: Some(seed::SEED_PROFESSIONAL_ID.into()),
//!             diagnosis: Some("Obesity".into()),
//!             pathologies: vec![],
//!             objective: None,
//!             is_active: true,
//!         },
//!     )
//!     .unwrap();
//!
//! let visible = store.patients(seed::SEED_TENANT_ID, &AccessScope::administrative());
//! assert!(visible.iter().any(|p| p.id == patient.id));
//! assert_eq!(store.state().last_modified, Some(1_709_546_400_000));
//! ```

pub mod access;
pub mod alerts;
pub mod analysis;
pub mod appointment;
pub mod body;
pub mod clock;
pub mod collection;
pub mod error;
pub mod events;
pub mod exam;
pub mod ledger;
pub mod patient;
pub mod reconcile;
pub mod records;
pub mod seed;
pub mod staff;
pub mod state;
pub mod stats;
pub mod store;
pub mod tenant;
pub mod validation;

// Re-export main types at crate root
pub use access::{AccessMode, AccessScope};
pub use alerts::{AlertSeverity, AlertStatus, AlertType, ClinicalAlert};
pub use analysis::{ParseError, PlanCritique};
pub use appointment::{Appointment, AppointmentInput, AppointmentStatus};
pub use body::{BodyComposition, Measurements, SkinfoldProtocol, Skinfolds};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collection::{Collection, Entity};
pub use error::Error;
pub use events::{BackfillReport, EventType, PatientEvent};
pub use exam::{AnalysisSource, Exam, ExamAnalysis, ExamInput, Marker, MarkerInput, ReferenceRange};
pub use ledger::{Ledger, PatientLedger};
pub use patient::{
    AnthropometryInput, AnthropometrySnapshot, ClinicalNote, FinancialTransaction, Gender,
    NutritionalPlan, Patient, PatientInput, PaymentMethod, PaymentStatus, PlanInput, PlanStatus,
    TransactionInput,
};
pub use reconcile::{reconcile, Decision, ReconcileOutcome, RemoteSnapshot};
pub use records::{
    Assessment, AssessmentInput, ExamRequest, ExamRequestInput, Prescription, PrescriptionInput,
    PrescriptionItem,
};
pub use staff::{NewUser, Professional, ProfessionalInput, Role, User};
pub use state::{ClinicState, StateMetadata, STATE_FORMAT_VERSION};
pub use stats::DashboardStats;
pub use store::{Change, ChangeKind, ChangeListener, ProfessionalRemoval, ResetReport, Store};
pub use tenant::{AiSettings, Clinic, ClinicSettings, NewClinic, OperatingHours};

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;
/// Clinic identifier.
pub type TenantId = String;
pub type RecordId = String;
