//! Default demo dataset used when no state exists anywhere.

use crate::patient::{Gender, Patient};
use crate::staff::{Professional, Role, User};
use crate::state::ClinicState;
use crate::tenant::{AiSettings, Clinic, OperatingHours};
use crate::Timestamp;
use chrono::{DateTime, NaiveDate};

pub const SEED_TENANT_ID: &str = "demo-clinic";
pub const SEED_TENANT_SLUG: &str = "demo";
pub const SEED_ADMIN_ID: &str = "demo-admin";
pub const SEED_ADMIN_EMAIL: &str = "admin@demo.clinic";
pub const SEED_PROFESSIONAL_ID: &str = "demo-professional";
/// Number of patients the seed ships with.
pub const SEED_PATIENT_COUNT: usize = 2;

/// Seed for the demo clinic, stamped at `now`.
pub fn default_state(now: Timestamp) -> ClinicState {
    seed_for(SEED_TENANT_ID, SEED_TENANT_SLUG, "Demo Clinic", now)
}

/// Seed for an arbitrary clinic id.
///
/// Record ids are derived from the clinic id so two clinics seeded side by
/// side never collide.
pub fn seed_for(tenant_id: &str, slug: &str, name: &str, now: Timestamp) -> ClinicState {
    let created_at = DateTime::from_timestamp_millis(now).unwrap_or_default();
    let scoped = |suffix: &str| {
        if tenant_id == SEED_TENANT_ID {
            format!("demo-{suffix}")
        } else {
            format!("{tenant_id}-{suffix}")
        }
    };
    let admin_email = if tenant_id == SEED_TENANT_ID {
        SEED_ADMIN_EMAIL.to_string()
    } else {
        format!("admin@{slug}.clinic")
    };

    let mut state = ClinicState::new();
    state.active_tenant = Some(tenant_id.to_string());
    state.tenants.insert(Clinic {
        id: tenant_id.to_string(),
        slug: slug.to_string(),
        name: name.to_string(),
        operating_hours: OperatingHours::default(),
        ai: AiSettings::default(),
    });
    state.professionals.insert(Professional {
        id: scoped("professional"),
        clinic_id: tenant_id.to_string(),
        name: "Dr. Helena Costa".into(),
        specialty: Some("Clinical nutrition".into()),
        registration_number: Some("CRN-0001".into()),
        color: Some("#2f855a".into()),
        email: None,
        is_active: true,
    });
    state.users.insert(User {
        id: scoped("admin"),
        clinic_id: tenant_id.to_string(),
        name: "Clinic Administrator".into(),
        email: admin_email,
        credential_ref: None,
        role: Role::ClinicAdmin,
        professional_id: Some(scoped("professional")),
    });

    let patients = [
        ("patient-1", "Joana Ribeiro", Gender::Female, (1988, 4, 12), "Type 2 diabetes"),
        ("patient-2", "Carlos Mendes", Gender::Male, (1975, 11, 3), "Hypertension"),
    ];
    for (suffix, patient_name, gender, (y, m, d), diagnosis) in patients {
        state.patients.insert(Patient {
            id: scoped(suffix),
            clinic_id: tenant_id.to_string(),
            name: patient_name.into(),
            email: None,
            phone: None,
            birth_date: NaiveDate::from_ymd_opt(y, m, d),
            gender,
            is_active: true,
            assigned_professional_id: Some(scoped("professional")),
            diagnosis: Some(diagnosis.into()),
            pathologies: Vec::new(),
            objective: None,
            anthropometry: None,
            anthropometry_history: Vec::new(),
            plans: Vec::new(),
            financial: Vec::new(),
            notes: Vec::new(),
            created_at,
        });
    }

    state.last_modified = Some(now);
    state
}
