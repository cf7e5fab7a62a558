//! Clinic settings, reset, creation and the dashboard.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use clinic_engine::{Clinic, ClinicSettings, DashboardStats, NewClinic, ResetReport, Role};

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/clinic", get(get_clinic).put(update_settings))
        .route("/clinic/reset", post(reset))
        .route("/clinics", post(create_clinic))
        .route("/dashboard", get(dashboard))
}

async fn get_clinic(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Clinic>> {
    let clinic = state
        .service
        .read(&auth, |store, tenant| Ok(store.clinic(tenant)?.clone()))
        .await?;
    Ok(Json(clinic))
}

/// PUT /api/clinic - name, operating hours and AI persona.
async fn update_settings(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(settings): Json<ClinicSettings>,
) -> Result<Json<Clinic>> {
    auth.require_admin()?;
    let clinic = state
        .service
        .mutate(&auth, |store, tenant| store.update_clinic_settings(tenant, settings))
        .await?;
    Ok(Json(clinic))
}

/// POST /api/clinic/reset - wipe the clinic's records, keeping its admins.
async fn reset(State(state): State<AppState>, auth: AuthUser) -> Result<Json<ResetReport>> {
    auth.require_admin()?;
    let (report, removed_users) = state
        .service
        .mutate(&auth, |store, tenant| {
            let before: Vec<String> = store.users(tenant).iter().map(|u| u.id.clone()).collect();
            let report = store.reset_tenant(tenant)?;
            let removed = before
                .into_iter()
                .filter(|id| store.user(tenant, id).is_err())
                .collect::<Vec<_>>();
            Ok((report, removed))
        })
        .await?;

    for user_id in &removed_users {
        state.service.sessions().revoke_user(user_id);
    }
    tracing::info!(
        tenant_id = %auth.tenant_id,
        removed_records = report.removed_records,
        "clinic reset"
    );
    Ok(Json(report))
}

/// POST /api/clinics - register a new clinic. Platform operators only.
async fn create_clinic(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<NewClinic>,
) -> Result<Json<Clinic>> {
    if auth.role != Role::SuperAdmin {
        return Err(AppError::Forbidden(
            "only platform administrators may create clinics".into(),
        ));
    }
    let clinic = state
        .service
        .mutate(&auth, |store, _| store.create_clinic(input))
        .await?;
    Ok(Json(clinic))
}

/// GET /api/dashboard - statistics through the caller's scope.
async fn dashboard(State(state): State<AppState>, auth: AuthUser) -> Result<Json<DashboardStats>> {
    let scope = auth.scope();
    let stats = state
        .service
        .read(&auth, |store, tenant| Ok(store.dashboard(tenant, &scope)))
        .await?;
    Ok(Json(stats))
}
