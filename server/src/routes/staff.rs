//! Users and professionals. Changes are for clinic administrators.

use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use clinic_engine::{NewUser, Professional, ProfessionalInput, ProfessionalRemoval, User};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedProfessional {
    pub professional: Professional,
    /// Login created alongside, when an email was given
    pub user: Option<User>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", delete(delete_user))
        .route(
            "/professionals",
            get(list_professionals).post(create_professional),
        )
        .route(
            "/professionals/{id}",
            put(update_professional).delete(remove_professional),
        )
        .route("/professionals/{id}/deactivate", post(deactivate_professional))
}

async fn list_users(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<User>>> {
    auth.require_admin()?;
    let users = state
        .service
        .read(&auth, |store, tenant| {
            Ok(store.users(tenant).into_iter().cloned().collect())
        })
        .await?;
    Ok(Json(users))
}

async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<NewUser>,
) -> Result<Json<User>> {
    auth.require_admin()?;
    let user = state
        .service
        .mutate(&auth, |store, tenant| store.create_user(tenant, input))
        .await?;
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<User>> {
    auth.require_admin()?;
    let user = state
        .service
        .mutate(&auth, |store, tenant| store.delete_user(tenant, &id))
        .await?;
    state.service.sessions().revoke_user(&user.id);
    Ok(Json(user))
}

async fn list_professionals(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Professional>>> {
    let professionals = state
        .service
        .read(&auth, |store, tenant| {
            Ok(store.professionals(tenant).into_iter().cloned().collect())
        })
        .await?;
    Ok(Json(professionals))
}

async fn create_professional(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<ProfessionalInput>,
) -> Result<Json<CreatedProfessional>> {
    auth.require_admin()?;
    let (professional, user) = state
        .service
        .mutate(&auth, |store, tenant| store.create_professional(tenant, input))
        .await?;
    Ok(Json(CreatedProfessional { professional, user }))
}

async fn update_professional(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<ProfessionalInput>,
) -> Result<Json<Professional>> {
    auth.require_admin()?;
    let professional = state
        .service
        .mutate(&auth, |store, tenant| store.update_professional(tenant, &id, input))
        .await?;
    Ok(Json(professional))
}

async fn deactivate_professional(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Professional>> {
    auth.require_admin()?;
    let professional = state
        .service
        .mutate(&auth, |store, tenant| store.deactivate_professional(tenant, &id))
        .await?;
    Ok(Json(professional))
}

/// DELETE /api/professionals/{id} - cancels future visits, removes linked
/// logins and unassigns patients.
async fn remove_professional(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ProfessionalRemoval>> {
    auth.require_admin()?;
    let removal = state
        .service
        .mutate(&auth, |store, tenant| store.remove_professional(tenant, &id))
        .await?;
    for user_id in &removal.removed_users {
        state.service.sessions().revoke_user(user_id);
    }
    Ok(Json(removal))
}
