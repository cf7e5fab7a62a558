//! Access-scoped listing.
//!
//! A scope is always explicit. In professional mode the caller sees only
//! records tied to their professional id, and a professional scope without
//! an id sees nothing at all.

use crate::appointment::Appointment;
use crate::patient::Patient;
use crate::staff::User;
use crate::state::ClinicState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessMode {
    Administrative,
    Professional,
}

/// Who is looking, and through which lens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessScope {
    pub mode: AccessMode,
    #[serde(default)]
    pub professional_id: Option<String>,
}

impl AccessScope {
    pub fn administrative() -> Self {
        Self {
            mode: AccessMode::Administrative,
            professional_id: None,
        }
    }

    pub fn professional(professional_id: Option<String>) -> Self {
        Self {
            mode: AccessMode::Professional,
            professional_id,
        }
    }

    /// The scope a logged-in user gets.
    pub fn for_user(user: &User) -> Self {
        if user.role.is_admin() {
            Self::administrative()
        } else {
            Self::professional(user.professional_id.clone())
        }
    }

    fn allows(&self, professional_id: Option<&str>) -> bool {
        match self.mode {
            AccessMode::Administrative => true,
            AccessMode::Professional => match (&self.professional_id, professional_id) {
                (Some(mine), Some(theirs)) => mine == theirs,
                _ => false,
            },
        }
    }

    pub fn can_see_patient(&self, patient: &Patient) -> bool {
        self.allows(patient.assigned_professional_id.as_deref())
    }

    pub fn can_see_appointment(&self, appointment: &Appointment) -> bool {
        self.allows(Some(appointment.professional_id.as_str()))
    }
}

/// Patients of the clinic visible through `scope`.
pub fn patients<'a>(state: &'a ClinicState, tenant_id: &str, scope: &AccessScope) -> Vec<&'a Patient> {
    state
        .patients
        .for_tenant(tenant_id)
        .filter(|p| scope.can_see_patient(p))
        .collect()
}

/// A single patient, if it exists in the clinic and is visible.
pub fn patient<'a>(
    state: &'a ClinicState,
    tenant_id: &str,
    scope: &AccessScope,
    patient_id: &str,
) -> Option<&'a Patient> {
    state
        .patients
        .get(patient_id)
        .filter(|p| p.clinic_id == tenant_id && scope.can_see_patient(p))
}

/// Appointments of the clinic visible through `scope`, ordered by start.
pub fn appointments<'a>(
    state: &'a ClinicState,
    tenant_id: &str,
    scope: &AccessScope,
) -> Vec<&'a Appointment> {
    let mut visible: Vec<_> = state
        .appointments
        .for_tenant(tenant_id)
        .filter(|a| scope.can_see_appointment(a))
        .collect();
    visible.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed;
    use proptest::prelude::*;

    #[test]
    fn admin_sees_everything_in_clinic() {
        let state = seed::default_state(0);
        let scope = AccessScope::administrative();
        assert_eq!(
            patients(&state, seed::SEED_TENANT_ID, &scope).len(),
            seed::SEED_PATIENT_COUNT
        );
        assert!(patients(&state, "other-clinic", &scope).is_empty());
    }

    #[test]
    fn visible_records_outlive_the_clinic_key() {
        let state = seed::default_state(0);
        let scope = AccessScope::administrative();
        let (visible, booked) = {
            let key = seed::SEED_TENANT_ID.to_string();
            (patients(&state, &key, &scope), appointments(&state, &key, &scope))
        };
        assert_eq!(visible.len(), seed::SEED_PATIENT_COUNT);
        assert!(booked.is_empty());
    }

    #[test]
    fn professional_sees_assigned_only() {
        let state = seed::default_state(0);
        let own = AccessScope::professional(Some(seed::SEED_PROFESSIONAL_ID.into()));
        assert_eq!(
            patients(&state, seed::SEED_TENANT_ID, &own).len(),
            seed::SEED_PATIENT_COUNT
        );

        let other = AccessScope::professional(Some("someone-else".into()));
        assert!(patients(&state, seed::SEED_TENANT_ID, &other).is_empty());
    }

    #[test]
    fn single_patient_respects_scope() {
        let state = seed::default_state(0);
        let id = state.patients.iter().next().unwrap().id.clone();
        let blind = AccessScope::professional(None);
        assert!(patient(&state, seed::SEED_TENANT_ID, &blind, &id).is_none());
        assert!(patient(&state, seed::SEED_TENANT_ID, &AccessScope::administrative(), &id).is_some());
        assert!(patient(&state, "other-clinic", &AccessScope::administrative(), &id).is_none());
    }

    proptest! {
        #[test]
        fn professional_scope_without_id_sees_nothing(
            assignments in proptest::collection::vec(proptest::option::of("[a-c]"), 0..20)
        ) {
            let mut state = seed::default_state(0);
            let template = state.patients.iter().next().unwrap().clone();
            for (i, assigned) in assignments.into_iter().enumerate() {
                let mut p = template.clone();
                p.id = format!("p-{i}");
                p.assigned_professional_id = assigned;
                state.patients.insert(p);
            }

            let scope = AccessScope::professional(None);
            prop_assert!(patients(&state, seed::SEED_TENANT_ID, &scope).is_empty());
            prop_assert!(appointments(&state, seed::SEED_TENANT_ID, &scope).is_empty());
        }
    }
}
