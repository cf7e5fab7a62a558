//! Performance benchmarks for clinic-engine

use chrono::{DateTime, Duration, TimeZone, Utc};
use clinic_engine::body::{self, Measurements, SkinfoldProtocol, Skinfolds};
use clinic_engine::seed::{self, SEED_PROFESSIONAL_ID, SEED_TENANT_ID};
use clinic_engine::{
    alerts, stats, AccessScope, Appointment, AppointmentStatus, ClinicState, Gender, Patient,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
}

/// Seed state grown to `patients` patients with a few visits each.
fn populated_state(patients: usize) -> ClinicState {
    let mut state = seed::default_state(0);
    let template: Patient = state.patients.iter().next().unwrap().clone();

    for i in 0..patients {
        let mut p = template.clone();
        p.id = format!("p-{i}");
        p.gender = if i % 2 == 0 { Gender::Female } else { Gender::Male };
        p.pathologies = vec![format!("condition-{}", i % 9)];
        state.patients.insert(p);

        for v in 0..3 {
            let start = now() - Duration::days(20 * v + (i % 30) as i64);
            state.appointments.insert(Appointment {
                id: format!("a-{i}-{v}"),
                clinic_id: SEED_TENANT_ID.into(),
                patient_id: format!("p-{i}"),
                professional_id: SEED_PROFESSIONAL_ID.into(),
                start,
                end: start + Duration::minutes(45),
                status: if v == 1 {
                    AppointmentStatus::Missed
                } else {
                    AppointmentStatus::Completed
                },
                notes: None,
                price: Some(150.0),
                payment_status: None,
                payment_method: None,
            });
        }
    }
    state
}

fn bench_alerts(c: &mut Criterion) {
    let mut group = c.benchmark_group("alerts");

    for size in [10, 100, 500].iter() {
        let state = populated_state(*size);
        group.bench_with_input(BenchmarkId::new("evaluate", size), size, |b, _| {
            b.iter(|| alerts::evaluate(black_box(&state), SEED_TENANT_ID, now()))
        });
    }

    group.finish();
}

fn bench_dashboard(c: &mut Criterion) {
    let mut group = c.benchmark_group("dashboard");
    let admin = AccessScope::administrative();
    let own = AccessScope::professional(Some(SEED_PROFESSIONAL_ID.into()));

    for size in [10, 100, 1000].iter() {
        let state = populated_state(*size);
        group.bench_with_input(BenchmarkId::new("administrative", size), size, |b, _| {
            b.iter(|| stats::dashboard(black_box(&state), SEED_TENANT_ID, &admin, now()))
        });
        group.bench_with_input(BenchmarkId::new("professional", size), size, |b, _| {
            b.iter(|| stats::dashboard(black_box(&state), SEED_TENANT_ID, &own, now()))
        });
    }

    group.finish();
}

fn bench_body(c: &mut Criterion) {
    let mut group = c.benchmark_group("body");
    let measurements = Measurements {
        weight_kg: 82.5,
        height: 178.0,
        waist_cm: Some(88.0),
        hip_cm: Some(101.0),
        skinfolds: Skinfolds {
            chest: Some(12.0),
            midaxillary: Some(14.0),
            triceps: Some(11.0),
            subscapular: Some(16.0),
            abdominal: Some(24.0),
            suprailiac: Some(18.0),
            thigh: Some(15.0),
            biceps: Some(6.0),
        },
    };

    for protocol in [
        SkinfoldProtocol::JacksonPollock7,
        SkinfoldProtocol::JacksonPollock3,
        SkinfoldProtocol::DurninWomersley,
        SkinfoldProtocol::Faulkner,
    ] {
        group.bench_function(format!("{protocol:?}"), |b| {
            b.iter(|| body::compute(black_box(&measurements), protocol, Gender::Male, 34))
        });
    }

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    for size in [10, 100, 1000].iter() {
        let state = populated_state(*size);
        let json = state.to_json().unwrap();

        group.bench_with_input(BenchmarkId::new("to_json", size), size, |b, _| {
            b.iter(|| black_box(&state).to_json())
        });
        group.bench_with_input(BenchmarkId::new("from_json", size), size, |b, _| {
            b.iter(|| ClinicState::from_json(black_box(&json)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_alerts,
    bench_dashboard,
    bench_body,
    bench_serialization,
);
criterion_main!(benches);
