//! Sync endpoint routes.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::service::SyncStatus;
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync", post(force_sync))
        .route("/sync/status", get(status))
}

/// POST /api/sync - Save and push the active clinic now.
async fn force_sync(State(state): State<AppState>, auth: AuthUser) -> Result<Json<SyncStatus>> {
    let status = state.service.force_sync(&auth).await?;
    Ok(Json(status))
}

/// GET /api/sync/status - Remote availability and background push state.
async fn status(State(state): State<AppState>, _auth: AuthUser) -> Json<SyncStatus> {
    Json(state.service.sync_status().await)
}
