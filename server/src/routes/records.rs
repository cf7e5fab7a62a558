//! Secondary clinical documents: exam requests, assessments and
//! prescriptions. Listing lives under the patient routes.

use axum::{
    extract::{Path, State},
    routing::{delete, post},
    Json, Router,
};
use clinic_engine::{
    Assessment, AssessmentInput, ExamRequest, ExamRequestInput, Prescription, PrescriptionInput,
};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/exam-requests", post(add_exam_request))
        .route("/exam-requests/{id}", delete(delete_exam_request))
        .route("/assessments", post(add_assessment))
        .route("/assessments/{id}", delete(delete_assessment))
        .route("/prescriptions", post(add_prescription))
        .route("/prescriptions/{id}", delete(delete_prescription))
}

async fn add_exam_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<ExamRequestInput>,
) -> Result<Json<ExamRequest>> {
    let scope = auth.scope();
    let request = state
        .service
        .mutate(&auth, |store, tenant| {
            store.patient(tenant, &scope, &input.patient_id)?;
            store.add_exam_request(tenant, input)
        })
        .await?;
    Ok(Json(request))
}

async fn delete_exam_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ExamRequest>> {
    let scope = auth.scope();
    let request = state
        .service
        .mutate(&auth, |store, tenant| {
            store.patient_record::<ExamRequest>(tenant, &scope, &id)?;
            store.delete_exam_request(tenant, &id)
        })
        .await?;
    Ok(Json(request))
}

/// POST /api/assessments - body composition is computed from the skinfolds
/// when a protocol is given.
async fn add_assessment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<AssessmentInput>,
) -> Result<Json<Assessment>> {
    let scope = auth.scope();
    let assessment = state
        .service
        .mutate(&auth, |store, tenant| {
            store.patient(tenant, &scope, &input.patient_id)?;
            store.add_assessment(tenant, input)
        })
        .await?;
    Ok(Json(assessment))
}

async fn delete_assessment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Assessment>> {
    let scope = auth.scope();
    let assessment = state
        .service
        .mutate(&auth, |store, tenant| {
            store.patient_record::<Assessment>(tenant, &scope, &id)?;
            store.delete_assessment(tenant, &id)
        })
        .await?;
    Ok(Json(assessment))
}

async fn add_prescription(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<PrescriptionInput>,
) -> Result<Json<Prescription>> {
    let scope = auth.scope();
    let prescription = state
        .service
        .mutate(&auth, |store, tenant| {
            store.patient(tenant, &scope, &input.patient_id)?;
            store.add_prescription(tenant, input)
        })
        .await?;
    Ok(Json(prescription))
}

async fn delete_prescription(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Prescription>> {
    let scope = auth.scope();
    let prescription = state
        .service
        .mutate(&auth, |store, tenant| {
            store.patient_record::<Prescription>(tenant, &scope, &id)?;
            store.delete_prescription(tenant, &id)
        })
        .await?;
    Ok(Json(prescription))
}
