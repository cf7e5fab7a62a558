//! End-to-end flows through the store: the behaviours a clinic relies on.

use chrono::{DateTime, Duration, TimeZone, Utc};
use clinic_engine::body::{self, Measurements, SkinfoldProtocol, Skinfolds};
use clinic_engine::seed::{self, SEED_PROFESSIONAL_ID, SEED_TENANT_ID};
use clinic_engine::{
    reconcile, AccessScope, AlertType, Appointment, AppointmentInput, AppointmentStatus,
    ClinicState, Decision, Error, ExamInput, Gender, Ledger, ManualClock, MarkerInput, Patient,
    PaymentStatus, ReferenceRange, RemoteSnapshot, Store,
};
use proptest::prelude::*;
use std::sync::Arc;

const T: &str = SEED_TENANT_ID;

fn monday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

fn store_at(now: DateTime<Utc>) -> (Store, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now));
    let store = Store::with_state(seed::default_state(0), clock.clone());
    (store, clock)
}

fn patient_ids(store: &Store) -> Vec<String> {
    store.state().patients.iter().map(|p| p.id.clone()).collect()
}

fn booking(patient_id: &str, start: DateTime<Utc>, price: Option<f64>) -> AppointmentInput {
    AppointmentInput {
        id: None,
        patient_id: patient_id.into(),
        professional_id: SEED_PROFESSIONAL_ID.into(),
        start,
        end: start + Duration::minutes(50),
        status: None,
        notes: None,
        price,
        payment_status: Some(PaymentStatus::Paid),
        payment_method: None,
    }
}

struct BrokenLedger;

impl Ledger for BrokenLedger {
    fn post(&self, _: &Patient, _: &Appointment, _: DateTime<Utc>) -> clinic_engine::error::Result<Patient> {
        Err(Error::Ledger("ledger offline".into()))
    }
}

// ============================================================================
// Privacy
// ============================================================================

#[test]
fn professional_mode_without_id_sees_nothing() {
    let (mut store, _) = store_at(monday());
    let patient = patient_ids(&store)[0].clone();
    store
        .save_appointment(T, booking(&patient, monday() + Duration::days(1), None))
        .unwrap();

    let blind = AccessScope::professional(None);
    assert!(store.patients(T, &blind).is_empty());
    assert!(store.appointments(T, &blind).is_empty());
    assert_eq!(store.dashboard(T, &blind).patient_count, 0);
    assert!(store.patient(T, &blind, &patient).is_err());
}

// ============================================================================
// Reset
// ============================================================================

#[test]
fn reset_removes_clinical_data_and_keeps_admin() {
    let (mut store, _) = store_at(monday());
    let patient = patient_ids(&store)[0].clone();
    store
        .save_appointment(T, booking(&patient, monday() + Duration::days(1), Some(150.0)))
        .unwrap();
    store
        .add_exam(
            T,
            ExamInput {
                patient_id: patient,
                title: "Lipid panel".into(),
                date: monday() - Duration::days(1),
                markers: vec![],
            },
        )
        .unwrap();

    store.reset_tenant(T).unwrap();

    let state = store.state();
    assert!(state.users.get(seed::SEED_ADMIN_ID).is_some());
    assert!(state.professionals.get(SEED_PROFESSIONAL_ID).is_some());
    assert!(state.patients.for_tenant(T).next().is_none());
    assert!(state.appointments.for_tenant(T).next().is_none());
    assert!(state.exams.for_tenant(T).next().is_none());
}

// ============================================================================
// Appointment + ledger
// ============================================================================

#[test]
fn priced_appointments_each_have_one_matching_transaction() {
    let (mut store, _) = store_at(monday());
    let patient = patient_ids(&store)[1].clone();
    let prices = [80.0, 120.5, 300.0];
    let mut created = Vec::new();
    for (i, price) in prices.iter().enumerate() {
        let start = monday() + Duration::days(1) + Duration::hours(i as i64);
        created.push(
            store
                .save_appointment(T, booking(&patient, start, Some(*price)))
                .unwrap(),
        );
    }

    let record = store.state().patients.get(&patient).unwrap();
    for (appointment, price) in created.iter().zip(prices) {
        let matching: Vec<_> = record
            .financial
            .iter()
            .filter(|t| t.appointment_id.as_deref() == Some(appointment.id.as_str()))
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].amount, price);
    }
}

#[test]
fn updating_price_keeps_a_single_transaction() {
    let (mut store, _) = store_at(monday());
    let patient = patient_ids(&store)[0].clone();
    let created = store
        .save_appointment(T, booking(&patient, monday() + Duration::days(2), Some(100.0)))
        .unwrap();

    let mut update = booking(&patient, monday() + Duration::days(2), Some(140.0));
    update.id = Some(created.id.clone());
    store.save_appointment(T, update).unwrap();

    let record = store.state().patients.get(&patient).unwrap();
    let linked = record.transaction_for(&created.id).unwrap();
    assert_eq!(linked.amount, 140.0);
    assert_eq!(
        record
            .financial
            .iter()
            .filter(|t| t.appointment_id.is_some())
            .count(),
        1
    );
}

#[test]
fn clearing_the_price_voids_the_linked_transaction() {
    let (mut store, _) = store_at(monday());
    let patient = patient_ids(&store)[0].clone();
    let created = store
        .save_appointment(T, booking(&patient, monday() + Duration::days(2), Some(150.0)))
        .unwrap();
    assert!(store
        .state()
        .patients
        .get(&patient)
        .unwrap()
        .transaction_for(&created.id)
        .is_some());

    let mut update = booking(&patient, monday() + Duration::days(2), None);
    update.id = Some(created.id.clone());
    let updated = store.save_appointment(T, update).unwrap();
    assert_eq!(updated.price, None);

    let record = store.state().patients.get(&patient).unwrap();
    assert!(record.transaction_for(&created.id).is_none());
    assert!(store
        .state()
        .events
        .iter()
        .any(|e| e.patient_id == patient && e.summary.contains("voided")));

    let mut free = booking(&patient, monday() + Duration::days(2), Some(0.0));
    free.id = Some(created.id.clone());
    store.save_appointment(T, free).unwrap();
    assert!(store.state().patients.get(&patient).unwrap().financial.is_empty());
}

#[test]
fn moving_an_appointment_moves_its_transaction() {
    let (mut store, _) = store_at(monday());
    let ids = patient_ids(&store);
    let created = store
        .save_appointment(T, booking(&ids[0], monday() + Duration::days(2), Some(120.0)))
        .unwrap();

    let mut update = booking(&ids[1], monday() + Duration::days(2), Some(120.0));
    update.id = Some(created.id.clone());
    store.save_appointment(T, update).unwrap();

    let first = store.state().patients.get(&ids[0]).unwrap();
    let second = store.state().patients.get(&ids[1]).unwrap();
    assert!(first.transaction_for(&created.id).is_none());
    assert_eq!(second.transaction_for(&created.id).unwrap().amount, 120.0);
}

#[test]
fn ledger_failure_removes_new_appointment() {
    let clock = Arc::new(ManualClock::new(monday()));
    let mut store = Store::with_state(seed::default_state(0), clock).with_ledger(BrokenLedger);
    let patient = patient_ids(&store)[0].clone();

    let err = store
        .save_appointment(T, booking(&patient, monday() + Duration::days(1), Some(90.0)))
        .unwrap_err();

    assert!(matches!(err, Error::Compensated { .. }));
    let message = err.to_string();
    assert!(message.contains("ledger offline"), "{message}");
    assert!(message.contains("not kept"), "{message}");
    assert!(store.state().appointments.is_empty());
    assert!(store
        .state()
        .patients
        .get(&patient)
        .unwrap()
        .financial
        .is_empty());
}

#[test]
fn unpriced_appointment_never_touches_ledger() {
    let clock = Arc::new(ManualClock::new(monday()));
    let mut store = Store::with_state(seed::default_state(0), clock).with_ledger(BrokenLedger);
    let patient = patient_ids(&store)[0].clone();

    let zero = store.save_appointment(T, booking(&patient, monday() + Duration::days(1), Some(0.0)));
    assert!(zero.is_ok());
    let none = store.save_appointment(T, booking(&patient, monday() + Duration::days(3), None));
    assert!(none.is_ok());
    assert_eq!(store.state().appointments.len(), 2);
}

#[test]
fn weekend_booking_is_rejected() {
    let (mut store, _) = store_at(monday());
    let patient = patient_ids(&store)[0].clone();
    let saturday = monday() + Duration::days(5);
    let result = store.save_appointment(T, booking(&patient, saturday, None));
    assert!(matches!(result, Err(Error::InvalidSchedule(_))));
}

// ============================================================================
// Alerts
// ============================================================================

#[test]
fn alert_generation_is_idempotent() {
    let (mut store, clock) = store_at(monday());
    let [first, second]: [String; 2] = patient_ids(&store).try_into().unwrap();

    // A visit long ago with nothing booked after it.
    let old_visit = monday() - Duration::days(60);
    let visit = store
        .save_appointment(T, booking(&first, old_visit, None))
        .unwrap();
    store
        .set_appointment_status(T, &visit.id, AppointmentStatus::Completed)
        .unwrap();

    store
        .add_exam(
            T,
            ExamInput {
                patient_id: second.clone(),
                title: "Glycemic profile".into(),
                date: monday() - Duration::days(3),
                markers: vec![MarkerInput {
                    name: "Glucose".into(),
                    value: 140.0,
                    unit: Some("mg/dL".into()),
                    reference: ReferenceRange::new(Some(70.0), Some(99.0)),
                }],
            },
        )
        .unwrap();

    clock.advance(Duration::hours(1));
    let first_run = store.generate_alerts(T).unwrap();
    let types: Vec<_> = first_run.iter().map(|a| (a.patient_id.clone(), a.alert_type)).collect();
    assert!(types.contains(&(first.clone(), AlertType::ReturnOverdue)));
    assert!(types.contains(&(second.clone(), AlertType::ExamNeedsAttention)));

    let second_run = store.generate_alerts(T).unwrap();
    assert!(second_run.is_empty());
}

#[test]
fn resolved_alert_can_be_raised_again() {
    let (mut store, _) = store_at(monday());
    let patient = patient_ids(&store)[0].clone();
    store
        .add_exam(
            T,
            ExamInput {
                patient_id: patient,
                title: "Blood count".into(),
                date: monday() - Duration::days(1),
                markers: vec![],
            },
        )
        .unwrap();

    let raised = store.generate_alerts(T).unwrap();
    assert_eq!(raised.len(), 1);
    store.resolve_alert(T, &raised[0].id, None).unwrap();
    assert_eq!(store.generate_alerts(T).unwrap().len(), 1);
}

// ============================================================================
// Persistence shape
// ============================================================================

#[test]
fn state_round_trip_after_activity() {
    let (mut store, _) = store_at(monday());
    let patient = patient_ids(&store)[0].clone();
    store
        .save_appointment(T, booking(&patient, monday() + Duration::days(1), Some(120.0)))
        .unwrap();
    store.add_note(T, &patient, "Reports better sleep").unwrap();
    store.run_event_backfill(T);

    let json = store.state().to_json().unwrap();
    let restored = ClinicState::from_json(&json).unwrap();
    assert_eq!(&restored, store.state());
}

#[test]
fn persisted_shape_uses_top_level_arrays() {
    let state = seed::default_state(1_000);
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
    ] {
        assert!(value[key].is_array(), "{key} should be an array");
    }
    assert_eq!(value["lastModified"], 1_000);
}

// ============================================================================
// Body composition
// ============================================================================

#[test]
fn jackson_pollock_7_female_reference() {
    // Sum 140mm, age 40:
    // D = 1.097 - 0.00046971*140 + 0.00000056*19600 - 0.00012828*40 = 1.0370854
    let folds = Skinfolds {
        chest: Some(20.0),
        midaxillary: Some(20.0),
        triceps: Some(20.0),
        subscapular: Some(20.0),
        abdominal: Some(20.0),
        suprailiac: Some(20.0),
        thigh: Some(20.0),
        biceps: None,
    };
    let pct = body::body_fat_percent(SkinfoldProtocol::JacksonPollock7, &folds, Gender::Female, 40);
    assert!((pct - 27.299169).abs() < 1e-5, "got {pct}");

    let mut incomplete = folds;
    incomplete.thigh = None;
    let pct = body::body_fat_percent(SkinfoldProtocol::JacksonPollock7, &incomplete, Gender::Female, 40);
    assert_eq!(pct, 0.0);
}

#[test]
fn composition_splits_weight() {
    let measurements = Measurements {
        weight_kg: 80.0,
        height: 180.0,
        waist_cm: Some(90.0),
        hip_cm: Some(100.0),
        skinfolds: Skinfolds {
            chest: Some(10.0),
            midaxillary: Some(10.0),
            triceps: Some(10.0),
            subscapular: Some(10.0),
            abdominal: Some(10.0),
            suprailiac: Some(10.0),
            thigh: Some(10.0),
            biceps: None,
        },
    };
    let c = body::compute(&measurements, SkinfoldProtocol::JacksonPollock7, Gender::Male, 30);
    assert!((c.fat_mass_kg + c.lean_mass_kg - 80.0).abs() < 1e-9);
    assert!((c.waist_hip_ratio - 0.9).abs() < 1e-12);
    assert!((c.bmi - 80.0 / (1.8 * 1.8)).abs() < 1e-9);
}

// ============================================================================
// Dashboard
// ============================================================================

#[test]
fn no_show_rate_over_ten_appointments() {
    let (mut store, _) = store_at(monday());
    let patient = patient_ids(&store)[0].clone();
    let mut ids = Vec::new();
    for i in 0..10 {
        let start = monday() + Duration::days(1) + Duration::minutes(50 * i);
        ids.push(store.save_appointment(T, booking(&patient, start, None)).unwrap().id);
    }
    for id in ids.iter().take(3) {
        store
            .set_appointment_status(T, id, AppointmentStatus::Missed)
            .unwrap();
    }
    let stats = store.dashboard(T, &AccessScope::administrative());
    assert_eq!(stats.appointment_count, 10);
    assert_eq!(stats.no_show_rate, 30);
}

// ============================================================================
// Reconciliation
// ============================================================================

#[test]
fn newer_local_with_activity_wins() {
    let base = 1_700_000_000_000;
    let (mut store, _) = store_at(DateTime::from_timestamp_millis(base + 10).unwrap());
    let patient = patient_ids(&store)[0].clone();
    store
        .save_appointment(T, booking(&patient, monday() + Duration::days(1), None))
        .unwrap();
    let local = store.state().clone();
    assert_eq!(local.last_modified, Some(base + 10));

    let remote = seed::default_state(base);
    let outcome = reconcile(T, Some(local.clone()), RemoteSnapshot::Found(remote), base + 20, || {
        seed::default_state(0)
    });
    assert_eq!(outcome.decision, Decision::KeptLocal);
    assert!(outcome.push_local);
    assert_eq!(outcome.state, local);
}

#[test]
fn seed_looking_local_defers_to_older_remote() {
    let base = 1_700_000_000_000;
    let mut remote = seed::default_state(base - 1_000);
    remote.patients.retain(|p| p.gender == Gender::Male);

    let outcome = reconcile(
        T,
        Some(seed::default_state(base)),
        RemoteSnapshot::Found(remote.clone()),
        base,
        || seed::default_state(0),
    );
    assert_eq!(outcome.decision, Decision::AdoptedRemote);
    assert_eq!(outcome.state.patients, remote.patients);
}

#[test]
fn adopted_state_replaces_store_contents() {
    let (mut store, _) = store_at(monday());
    let revision = store.revision();
    let mut remote = seed::default_state(5);
    remote.patients.retain(|_| false);
    store.replace_state(remote);
    assert!(store.state().patients.is_empty());
    assert_eq!(store.state().last_modified, Some(5));
    assert!(store.revision() > revision);
}

// ============================================================================
// Event log
// ============================================================================

#[test]
fn backfill_runs_once_per_clinic() {
    let (mut store, _) = store_at(monday());
    let first = store.run_event_backfill(T);
    assert!(!first.skipped);
    assert_eq!(first.patients, seed::SEED_PATIENT_COUNT);
    let count = store.state().events.len();

    let second = store.run_event_backfill(T);
    assert!(second.skipped);
    assert_eq!(store.state().events.len(), count);
}

#[test]
fn backfill_skips_patients_that_already_have_history() {
    let (mut store, _) = store_at(monday());
    let ids = patient_ids(&store);
    store.add_note(T, &ids[0], "first contact").unwrap();

    let report = store.run_event_backfill(T);
    assert_eq!(report.patients, 1);
    let synthetic: Vec<_> = store.state().events.iter().filter(|e| e.synthetic).collect();
    assert!(synthetic.iter().all(|e| e.patient_id == ids[1]));
}

proptest! {
    #[test]
    fn round_trip_preserves_any_patient_set(
        names in proptest::collection::vec("[A-Za-z ]{1,24}", 0..12),
        last_modified in 0i64..4_000_000_000_000,
    ) {
        let mut state = seed::default_state(last_modified);
        let template = state.patients.iter().next().unwrap().clone();
        for (i, name) in names.iter().enumerate() {
            let mut p = template.clone();
            p.id = format!("gen-{i}");
            p.name = name.clone();
            state.patients.insert(p);
        }
        let restored = ClinicState::from_json(&state.to_json().unwrap()).unwrap();
        prop_assert_eq!(restored, state);
    }
}
