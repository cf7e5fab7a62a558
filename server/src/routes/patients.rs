//! Patients and everything recorded on them.
//!
//! Every route resolves the patient through the caller's scope first, so a
//! professional can neither read nor change someone else's patient.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use clinic_engine::store::PatientRecord;
use clinic_engine::{
    AnthropometryInput, AnthropometrySnapshot, Appointment, Assessment, ClinicalAlert,
    ClinicalNote, Error as EngineError, Exam, ExamRequest, FinancialTransaction, NutritionalPlan,
    Patient, PatientEvent, PatientInput, PlanCritique, PlanInput, Prescription, TransactionInput,
};
use serde::{Deserialize, Serialize};

use crate::analysis;
use crate::auth::AuthUser;
use crate::error::Result;
use crate::AppState;

#[derive(Deserialize)]
pub struct NoteRequest {
    pub text: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/patients", get(list_patients).post(create_patient))
        .route(
            "/patients/{id}",
            get(get_patient).put(update_patient).delete(delete_patient),
        )
        .route("/patients/{id}/anthropometry", post(record_anthropometry))
        .route("/patients/{id}/plans", post(add_plan))
        .route("/patients/{id}/plans/{plan_id}/activate", post(activate_plan))
        .route("/patients/{id}/plans/{plan_id}/critique", post(critique_plan))
        .route("/patients/{id}/transactions", post(record_transaction))
        .route("/patients/{id}/notes", post(add_note))
        .route("/patients/{id}/timeline", get(timeline))
        .route("/patients/{id}/appointments", get(records::<Appointment>))
        .route("/patients/{id}/exams", get(records::<Exam>))
        .route("/patients/{id}/alerts", get(records::<ClinicalAlert>))
        .route("/patients/{id}/exam-requests", get(records::<ExamRequest>))
        .route("/patients/{id}/assessments", get(records::<Assessment>))
        .route("/patients/{id}/prescriptions", get(records::<Prescription>))
}

async fn list_patients(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<Patient>>> {
    let scope = auth.scope();
    let patients = state
        .service
        .read(&auth, |store, tenant| {
            Ok(store.patients(tenant, &scope).into_iter().cloned().collect())
        })
        .await?;
    Ok(Json(patients))
}

async fn create_patient(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(mut input): Json<PatientInput>,
) -> Result<Json<Patient>> {
    // A professional's new patient is theirs unless assigned elsewhere.
    if !auth.is_admin() && input.assigned_professional_id.is_none() {
        input.assigned_professional_id = auth.professional_id.clone();
    }
    let patient = state
        .service
        .mutate(&auth, |store, tenant| store.create_patient(tenant, input))
        .await?;
    Ok(Json(patient))
}

async fn get_patient(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Patient>> {
    let scope = auth.scope();
    let patient = state
        .service
        .read(&auth, |store, tenant| Ok(store.patient(tenant, &scope, &id)?.clone()))
        .await?;
    Ok(Json(patient))
}

async fn update_patient(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<PatientInput>,
) -> Result<Json<Patient>> {
    let scope = auth.scope();
    let patient = state
        .service
        .mutate(&auth, |store, tenant| {
            store.patient(tenant, &scope, &id)?;
            store.update_patient(tenant, &id, input)
        })
        .await?;
    Ok(Json(patient))
}

/// DELETE /api/patients/{id} - removes the patient and every record on them.
async fn delete_patient(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Patient>> {
    let scope = auth.scope();
    let patient = state
        .service
        .mutate(&auth, |store, tenant| {
            store.patient(tenant, &scope, &id)?;
            store.delete_patient(tenant, &id)
        })
        .await?;
    Ok(Json(patient))
}

async fn record_anthropometry(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<AnthropometryInput>,
) -> Result<Json<AnthropometrySnapshot>> {
    let scope = auth.scope();
    let snapshot = state
        .service
        .mutate(&auth, |store, tenant| {
            store.patient(tenant, &scope, &id)?;
            store.record_anthropometry(tenant, &id, input)
        })
        .await?;
    Ok(Json(snapshot))
}

async fn add_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<PlanInput>,
) -> Result<Json<NutritionalPlan>> {
    let scope = auth.scope();
    let plan = state
        .service
        .mutate(&auth, |store, tenant| {
            store.patient(tenant, &scope, &id)?;
            store.add_plan(tenant, &id, input)
        })
        .await?;
    Ok(Json(plan))
}

async fn activate_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, plan_id)): Path<(String, String)>,
) -> Result<Json<NutritionalPlan>> {
    let scope = auth.scope();
    let plan = state
        .service
        .mutate(&auth, |store, tenant| {
            store.patient(tenant, &scope, &id)?;
            store.activate_plan(tenant, &id, &plan_id)
        })
        .await?;
    Ok(Json(plan))
}

/// POST /api/patients/{id}/plans/{plan_id}/critique - AI review of a plan,
/// with a local fallback. Nothing is stored.
async fn critique_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, plan_id)): Path<(String, String)>,
) -> Result<Json<PlanCritique>> {
    let scope = auth.scope();
    let (patient, plan, ai) = state
        .service
        .read(&auth, |store, tenant| {
            let patient = store.patient(tenant, &scope, &id)?.clone();
            let plan = patient
                .plans
                .iter()
                .find(|p| p.id == plan_id)
                .cloned()
                .ok_or_else(|| EngineError::not_found("plans", plan_id.as_str()))?;
            let ai = store.clinic(tenant)?.ai.clone();
            Ok((patient, plan, ai))
        })
        .await?;

    let critique = analysis::critique_plan(
        state.analysis.as_ref(),
        &patient,
        &plan,
        &ai,
        state.service.now(),
    )
    .await;
    Ok(Json(critique))
}

async fn record_transaction(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<TransactionInput>,
) -> Result<Json<FinancialTransaction>> {
    let scope = auth.scope();
    let transaction = state
        .service
        .mutate(&auth, |store, tenant| {
            store.patient(tenant, &scope, &id)?;
            store.record_transaction(tenant, &id, input)
        })
        .await?;
    Ok(Json(transaction))
}

async fn add_note(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<NoteRequest>,
) -> Result<Json<ClinicalNote>> {
    let scope = auth.scope();
    let note = state
        .service
        .mutate(&auth, |store, tenant| {
            store.patient(tenant, &scope, &id)?;
            store.add_note(tenant, &id, &request.text)
        })
        .await?;
    Ok(Json(note))
}

/// GET /api/patients/{id}/timeline - event history, newest first.
async fn timeline(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<PatientEvent>>> {
    let scope = auth.scope();
    let events = state
        .service
        .read(&auth, |store, tenant| {
            Ok(store
                .timeline(tenant, &scope, &id)?
                .into_iter()
                .cloned()
                .collect())
        })
        .await?;
    Ok(Json(events))
}

async fn records<T>(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<T>>>
where
    T: PatientRecord + Serialize + Send + Sync + 'static,
{
    let scope = auth.scope();
    let records = state
        .service
        .read(&auth, |store, tenant| {
            Ok(store
                .for_patient::<T>(tenant, &scope, &id)?
                .into_iter()
                .cloned()
                .collect())
        })
        .await?;
    Ok(Json(records))
}
