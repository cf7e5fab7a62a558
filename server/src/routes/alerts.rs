//! Clinical alerts.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use clinic_engine::ClinicalAlert;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub note: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/alerts", get(list_alerts))
        .route("/alerts/generate", post(generate))
        .route("/alerts/{id}/resolve", post(resolve))
}

async fn list_alerts(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ClinicalAlert>>> {
    let scope = auth.scope();
    let alerts = state
        .service
        .read(&auth, |store, tenant| {
            Ok(store.alerts(tenant, &scope).into_iter().cloned().collect())
        })
        .await?;
    Ok(Json(alerts))
}

/// POST /api/alerts/generate - run the rules; returns only new alerts.
async fn generate(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ClinicalAlert>>> {
    let scope = auth.scope();
    let created = state
        .service
        .mutate(&auth, |store, tenant| store.generate_alerts(tenant))
        .await?;
    let visible = state
        .service
        .read(&auth, |store, tenant| {
            Ok(created
                .into_iter()
                .filter(|a| store.patient(tenant, &scope, &a.patient_id).is_ok())
                .collect())
        })
        .await?;
    Ok(Json(visible))
}

async fn resolve(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    request: Option<Json<ResolveRequest>>,
) -> Result<Json<ClinicalAlert>> {
    let scope = auth.scope();
    let note = request.and_then(|Json(r)| r.note);
    let alert = state
        .service
        .mutate(&auth, |store, tenant| {
            store.patient_record::<ClinicalAlert>(tenant, &scope, &id)?;
            store.resolve_alert(tenant, &id, note)
        })
        .await?;
    Ok(Json(alert))
}
