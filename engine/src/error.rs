//! Error types for the clinic engine.

use thiserror::Error;

/// All possible errors from the clinic engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Validation errors
    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("invalid value for '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("email already registered in this clinic: {0}")]
    DuplicateEmail(String),

    // Lookup errors
    #[error("{collection} not found: {id}")]
    NotFound {
        collection: &'static str,
        id: String,
    },

    #[error("clinic not found: {0}")]
    TenantNotFound(String),

    // Operation errors
    #[error("financial transaction failed: {0}")]
    Ledger(String),

    #[error("{intent} failed ({cause}); {rollback}")]
    Compensated {
        intent: String,
        rollback: String,
        cause: Box<Error>,
    },

    #[error("operation not allowed: {0}")]
    NotAllowed(String),

    // State errors
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Shorthand for a missing record.
    pub fn not_found(collection: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            collection,
            id: id.into(),
        }
    }

    /// Shorthand for a field that failed validation.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error was raised before any mutation was applied.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::MissingRequiredField(_)
                | Error::InvalidField { .. }
                | Error::InvalidSchedule(_)
                | Error::DuplicateEmail(_)
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
