//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use clinic_engine::Error as EngineError;
use serde::Serialize;

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::storage::{LocalStoreError, RemoteError};

/// Shown when a local write hits the storage quota.
pub const QUOTA_MESSAGE: &str =
    "local storage is full: remove large attachments or old exams, then retry";

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Local storage error: {0}")]
    LocalStore(#[from] LocalStoreError),

    #[error("Remote storage error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Remote sync is not configured")]
    SyncDisabled,

    #[error("Another clinic is active: {0}")]
    TenantMismatch(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

fn engine_status(e: &EngineError) -> StatusCode {
    match e {
        EngineError::MissingRequiredField(_)
        | EngineError::InvalidField { .. }
        | EngineError::InvalidSchedule(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::DuplicateEmail(_) | EngineError::NotAllowed(_) => StatusCode::CONFLICT,
        EngineError::NotFound { .. } | EngineError::TenantNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Ledger(_) | EngineError::Compensated { .. } | EngineError::InvalidState(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            AppError::Engine(e) => {
                let status = engine_status(e);
                if status.is_server_error() {
                    tracing::error!("Engine error: {}", e);
                } else {
                    tracing::debug!("Rejected by engine: {}", e);
                }
                (status, e.to_string(), None)
            }
            AppError::LocalStore(LocalStoreError::QuotaExceeded { needed, quota }) => {
                tracing::warn!(needed, quota, "local storage quota exceeded");
                (
                    StatusCode::INSUFFICIENT_STORAGE,
                    QUOTA_MESSAGE.to_string(),
                    Some(format!("{needed} bytes needed, quota is {quota}")),
                )
            }
            AppError::LocalStore(e) => {
                tracing::error!("Local storage error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Local storage error".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Remote(e) => {
                tracing::warn!("Remote storage error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Remote sync failed".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Auth(AuthError::InvalidCredentials) => (
                StatusCode::UNAUTHORIZED,
                AuthError::InvalidCredentials.to_string(),
                None,
            ),
            AppError::Auth(e @ AuthError::NotConfigured) => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string(), None)
            }
            AppError::Auth(e @ AuthError::Unavailable(_)) => {
                tracing::warn!("Identity service error: {}", e);
                (StatusCode::BAD_GATEWAY, e.to_string(), None)
            }
            AppError::SyncDisabled => (StatusCode::CONFLICT, self.to_string(), None),
            AppError::TenantMismatch(active) => (
                StatusCode::CONFLICT,
                "Another clinic is active on this server; sign in again".to_string(),
                Some(active.clone()),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone(), None),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors that stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("local storage: {0}")]
    LocalStore(#[from] LocalStoreError),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("identity service: {0}")]
    Auth(#[from] AuthError),

    #[error("AI service: {0}")]
    Analysis(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
