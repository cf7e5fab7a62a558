//! Scheduling.

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use clinic_engine::{Appointment, AppointmentInput, AppointmentStatus};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::AppState;

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: AppointmentStatus,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(save_appointment))
        .route(
            "/appointments/{id}",
            put(update_appointment).delete(delete_appointment),
        )
        .route("/appointments/{id}/status", post(set_status))
}

/// Professionals book only into their own agenda.
fn check_agenda(auth: &AuthUser, input: &AppointmentInput) -> Result<()> {
    if auth.is_admin() || auth.professional_id.as_deref() == Some(input.professional_id.as_str()) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "professionals can only book into their own agenda".into(),
        ))
    }
}

async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Appointment>>> {
    let scope = auth.scope();
    let appointments = state
        .service
        .read(&auth, |store, tenant| {
            Ok(store.appointments(tenant, &scope).into_iter().cloned().collect())
        })
        .await?;
    Ok(Json(appointments))
}

/// POST /api/appointments - create, or update when `id` is set.
///
/// A priced appointment also writes its financial transaction. When that
/// write fails on create, the appointment is rolled back and the error
/// says so.
async fn save_appointment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<AppointmentInput>,
) -> Result<Json<Appointment>> {
    check_agenda(&auth, &input)?;
    let scope = auth.scope();
    let appointment = state
        .service
        .mutate(&auth, |store, tenant| {
            store.patient(tenant, &scope, &input.patient_id)?;
            if let Some(id) = &input.id {
                store.appointment(tenant, &scope, id)?;
            }
            store.save_appointment(tenant, input)
        })
        .await?;
    Ok(Json(appointment))
}

async fn update_appointment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(mut input): Json<AppointmentInput>,
) -> Result<Json<Appointment>> {
    input.id = Some(id);
    save_appointment(State(state), auth, Json(input)).await
}

async fn set_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Appointment>> {
    let scope = auth.scope();
    let appointment = state
        .service
        .mutate(&auth, |store, tenant| {
            store.appointment(tenant, &scope, &id)?;
            store.set_appointment_status(tenant, &id, request.status)
        })
        .await?;
    Ok(Json(appointment))
}

async fn delete_appointment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Appointment>> {
    let scope = auth.scope();
    let appointment = state
        .service
        .mutate(&auth, |store, tenant| {
            store.appointment(tenant, &scope, &id)?;
            store.delete_appointment(tenant, &id)
        })
        .await?;
    Ok(Json(appointment))
}
