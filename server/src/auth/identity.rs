//! External identity service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("no identity service is configured")]
    NotConfigured,

    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

/// Who the identity service says the caller is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Opaque subject id, stored as the user's credential reference
    pub subject: String,
    pub email: String,
}

/// Verifies email and password pairs.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;
}

/// Identity service reached over HTTP.
///
/// Posts `{ email, password }` to `{base_url}/sign-in` and expects
/// `{ subject, email }` back.
#[derive(Debug, Clone)]
pub struct HttpAuthenticator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthenticator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let url = format!("{}/sign-in", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SignInRequest { email, password })
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(AuthError::Unavailable(format!("status {status}")));
        }

        response
            .json::<Identity>()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))
    }
}

/// Stands in when no identity service is configured; every sign-in fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAuthenticator;

#[async_trait]
impl Authenticator for DisabledAuthenticator {
    async fn sign_in(&self, _email: &str, _password: &str) -> Result<Identity, AuthError> {
        Err(AuthError::NotConfigured)
    }
}
