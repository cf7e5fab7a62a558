//! Sign-in and sign-out.

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use clinic_engine::{Clinic, User};
use serde::Serialize;

use crate::auth::{AuthUser, Session};
use crate::error::Result;
use crate::service::{LoginRequest, LoginResponse};
use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSession {
    pub session: Session,
    pub user: User,
    pub clinic: Clinic,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/session", post(login).get(current).delete(logout))
}

/// POST /api/session - sign in to a clinic.
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    Ok(Json(state.service.login(request).await?))
}

/// GET /api/session - who is signed in.
async fn current(State(state): State<AppState>, auth: AuthUser) -> Result<Json<CurrentSession>> {
    let user_id = auth.user_id.clone();
    let (user, clinic) = state
        .service
        .read(&auth, |store, tenant| {
            Ok((
                store.user(tenant, &user_id)?.clone(),
                store.clinic(tenant)?.clone(),
            ))
        })
        .await?;
    Ok(Json(CurrentSession {
        session: auth.0,
        user,
        clinic,
    }))
}

/// DELETE /api/session - sign out.
async fn logout(State(state): State<AppState>, auth: AuthUser) -> StatusCode {
    state.service.logout(&auth.token);
    StatusCode::NO_CONTENT
}
