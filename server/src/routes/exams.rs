//! Lab exams and their analysis.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use clinic_engine::{Exam, ExamInput};

use crate::analysis;
use crate::auth::AuthUser;
use crate::error::Result;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/exams", post(add_exam))
        .route("/exams/{id}", get(get_exam).delete(delete_exam))
        .route("/exams/{id}/analysis", post(analyze))
}

/// POST /api/exams - markers are interpreted against their ranges on insert.
async fn add_exam(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<ExamInput>,
) -> Result<Json<Exam>> {
    let scope = auth.scope();
    let exam = state
        .service
        .mutate(&auth, |store, tenant| {
            store.patient(tenant, &scope, &input.patient_id)?;
            store.add_exam(tenant, input)
        })
        .await?;
    Ok(Json(exam))
}

async fn get_exam(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Exam>> {
    let scope = auth.scope();
    let exam = state
        .service
        .read(&auth, |store, tenant| Ok(store.exam(tenant, &scope, &id)?.clone()))
        .await?;
    Ok(Json(exam))
}

async fn delete_exam(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Exam>> {
    let scope = auth.scope();
    let exam = state
        .service
        .mutate(&auth, |store, tenant| {
            store.exam(tenant, &scope, &id)?;
            store.delete_exam(tenant, &id)
        })
        .await?;
    Ok(Json(exam))
}

/// POST /api/exams/{id}/analysis - ask the AI service, fall back to local
/// rules, and store the result on the exam.
///
/// The model call runs without holding the store.
async fn analyze(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Exam>> {
    let scope = auth.scope();
    let (exam, patient, ai) = state
        .service
        .read(&auth, |store, tenant| {
            let exam = store.exam(tenant, &scope, &id)?.clone();
            let patient = store.patient(tenant, &scope, &exam.patient_id)?.clone();
            let ai = store.clinic(tenant)?.ai.clone();
            Ok((exam, patient, ai))
        })
        .await?;

    let result = analysis::analyze_exam(
        state.analysis.as_ref(),
        &exam,
        Some(&patient),
        &ai,
        state.service.now(),
    )
    .await;

    let exam = state
        .service
        .mutate(&auth, |store, tenant| store.attach_analysis(tenant, &id, result))
        .await?;
    Ok(Json(exam))
}
