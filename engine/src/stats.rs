//! Dashboard statistics.

use crate::access::{self, AccessScope};
use crate::appointment::{Appointment, AppointmentStatus};
use crate::patient::{FinancialTransaction, Gender, Patient};
use crate::state::ClinicState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How many pathologies the dashboard ranks.
pub const TOP_PATHOLOGIES: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenderDistribution {
    pub male: usize,
    pub female: usize,
    pub other: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathologyCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub patient_count: usize,
    pub active_patient_count: usize,
    pub appointment_count: usize,
    pub upcoming_appointments: usize,
    pub revenue: f64,
    pub average_ticket: f64,
    /// Percentage, rounded to the nearest integer
    pub no_show_rate: u32,
    pub gender_distribution: GenderDistribution,
    pub top_pathologies: Vec<PathologyCount>,
    pub active_alerts: usize,
}

/// Missed appointments as a rounded percentage of all appointments.
pub fn no_show_rate(total: usize, missed: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (missed as f64 / total as f64 * 100.0).round() as u32
}

/// Sum of paid transactions and the average paid ticket.
pub fn revenue<'a>(transactions: impl IntoIterator<Item = &'a FinancialTransaction>) -> (f64, f64) {
    let (sum, count) = transactions
        .into_iter()
        .filter(|t| t.is_paid())
        .fold((0.0, 0usize), |(sum, count), t| (sum + t.amount, count + 1));
    let average = if count == 0 { 0.0 } else { sum / count as f64 };
    (sum, average)
}

pub fn gender_distribution<'a>(patients: impl IntoIterator<Item = &'a Patient>) -> GenderDistribution {
    patients
        .into_iter()
        .fold(GenderDistribution::default(), |mut dist, p| {
            match p.gender {
                Gender::Male => dist.male += 1,
                Gender::Female => dist.female += 1,
                Gender::Other => dist.other += 1,
            }
            dist
        })
}

/// Most frequent entries across `diagnosis` and `pathologies`.
///
/// Descending by count, ties broken by name, at most `limit` entries.
pub fn top_pathologies<'a>(
    patients: impl IntoIterator<Item = &'a Patient>,
    limit: usize,
) -> Vec<PathologyCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for patient in patients {
        let entries = patient
            .diagnosis
            .iter()
            .chain(patient.pathologies.iter())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty());
        for entry in entries {
            *counts.entry(entry).or_default() += 1;
        }
    }

    let mut ranked: Vec<_> = counts
        .into_iter()
        .map(|(name, count)| PathologyCount {
            name: name.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(limit);
    ranked
}

/// Dashboard for one clinic as seen through `scope`.
pub fn dashboard(
    state: &ClinicState,
    tenant_id: &str,
    scope: &AccessScope,
    now: DateTime<Utc>,
) -> DashboardStats {
    let patients = access::patients(state, tenant_id, scope);
    let appointments: Vec<&Appointment> = access::appointments(state, tenant_id, scope);

    let missed = appointments
        .iter()
        .filter(|a| a.status == AppointmentStatus::Missed)
        .count();
    let upcoming = appointments
        .iter()
        .filter(|a| a.start >= now && a.status.is_live())
        .count();
    let (revenue, average_ticket) = revenue(patients.iter().flat_map(|p| p.financial.iter()));
    let active_alerts = state
        .alerts
        .for_tenant(tenant_id)
        .filter(|a| a.is_active() && patients.iter().any(|p| p.id == a.patient_id))
        .count();

    DashboardStats {
        patient_count: patients.len(),
        active_patient_count: patients.iter().filter(|p| p.is_active).count(),
        appointment_count: appointments.len(),
        upcoming_appointments: upcoming,
        revenue,
        average_ticket,
        no_show_rate: no_show_rate(appointments.len(), missed),
        gender_distribution: gender_distribution(patients.iter().copied()),
        top_pathologies: top_pathologies(patients.iter().copied(), TOP_PATHOLOGIES),
        active_alerts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::PaymentStatus;
    use crate::seed;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn tx(amount: f64, status: PaymentStatus) -> FinancialTransaction {
        FinancialTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            amount,
            status,
            method: None,
            description: "visit".into(),
            date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            appointment_id: None,
        }
    }

    #[test]
    fn no_show_examples() {
        assert_eq!(no_show_rate(0, 0), 0);
        assert_eq!(no_show_rate(10, 3), 30);
        assert_eq!(no_show_rate(3, 1), 33);
        assert_eq!(no_show_rate(3, 2), 67);
    }

    #[test]
    fn revenue_counts_paid_only() {
        let txs = vec![
            tx(100.0, PaymentStatus::Paid),
            tx(50.0, PaymentStatus::Pending),
            tx(200.0, PaymentStatus::Paid),
            tx(80.0, PaymentStatus::Refunded),
        ];
        assert_eq!(revenue(&txs), (300.0, 150.0));
        assert_eq!(revenue(&[]), (0.0, 0.0));
    }

    #[test]
    fn pathology_ranking() {
        let mut state = seed::default_state(0);
        let template = state.patients.iter().next().unwrap().clone();
        let extra = [
            (Some("Obesity"), vec!["Hypertension"]),
            (Some("Obesity"), vec!["Dyslipidemia"]),
            (None, vec!["Obesity", "  "]),
        ];
        for (i, (diagnosis, pathologies)) in extra.into_iter().enumerate() {
            let mut p = template.clone();
            p.id = format!("x-{i}");
            p.diagnosis = diagnosis.map(str::to_string);
            p.pathologies = pathologies.into_iter().map(str::to_string).collect();
            state.patients.insert(p);
        }

        let ranked = top_pathologies(state.patients.iter(), TOP_PATHOLOGIES);
        assert_eq!(ranked[0], PathologyCount { name: "Obesity".into(), count: 3 });
        assert_eq!(ranked[1], PathologyCount { name: "Hypertension".into(), count: 2 });
        assert!(ranked.iter().all(|p| !p.name.is_empty()));
        assert!(ranked.len() <= TOP_PATHOLOGIES);
    }

    #[test]
    fn pathology_cap() {
        let mut state = seed::default_state(0);
        let template = state.patients.iter().next().unwrap().clone();
        let mut p = template.clone();
        p.id = "many".into();
        p.pathologies = (0..10).map(|i| format!("condition-{i}")).collect();
        state.patients.insert(p);
        assert_eq!(top_pathologies(state.patients.iter(), TOP_PATHOLOGIES).len(), 5);
    }

    #[test]
    fn seed_dashboard() {
        let state = seed::default_state(0);
        let stats = dashboard(
            &state,
            seed::SEED_TENANT_ID,
            &AccessScope::administrative(),
            Utc::now(),
        );
        assert_eq!(stats.patient_count, seed::SEED_PATIENT_COUNT);
        assert_eq!(stats.appointment_count, 0);
        assert_eq!(stats.no_show_rate, 0);
        assert_eq!(stats.revenue, 0.0);
        assert_eq!(stats.gender_distribution.male + stats.gender_distribution.female, 2);
    }

    #[test]
    fn blind_scope_dashboard_is_empty() {
        let state = seed::default_state(0);
        let stats = dashboard(
            &state,
            seed::SEED_TENANT_ID,
            &AccessScope::professional(None),
            Utc::now(),
        );
        assert_eq!(stats.patient_count, 0);
        assert!(stats.top_pathologies.is_empty());
    }

    proptest! {
        #[test]
        fn no_show_rate_is_a_percentage(total in 0usize..10_000, missed_seed in 0usize..10_000) {
            let missed = if total == 0 { 0 } else { missed_seed % (total + 1) };
            let rate = no_show_rate(total, missed);
            prop_assert!(rate <= 100);
            if missed == 0 {
                prop_assert_eq!(rate, 0);
            }
            if total > 0 && missed == total {
                prop_assert_eq!(rate, 100);
            }
        }
    }
}
