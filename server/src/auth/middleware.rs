//! Authentication extractors.
//!
//! Requests carry `Authorization: Bearer <token>` where the token was
//! returned by `POST /api/session`.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::Session;
use crate::error::AppError;
use crate::AppState;

/// Authenticated user extracted from request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Session);

impl AuthUser {
    /// Reject callers without the administrative view.
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.0.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "only clinic administrators may do this".into(),
            ))
        }
    }
}

impl std::ops::Deref for AuthUser {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.0
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    match header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(AppError::Unauthorized),
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        state
            .service
            .sessions()
            .get(token)
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}
