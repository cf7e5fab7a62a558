//! Configuration management for the server.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Password that signs a user in without the identity service, when
/// `INSECURE_DEV_AUTH` is switched on.
pub const DEV_BYPASS_PASSWORD: &str = "123";

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL; remote sync is off without it
    pub database_url: Option<String>,
    /// Directory holding the local state blob
    pub local_store_dir: PathBuf,
    /// Largest blob the local store accepts, in bytes
    pub local_store_quota_bytes: usize,
    /// Clinic loaded at startup when no local blob names one
    pub default_tenant: Option<String>,
    /// Key of the pre-tenancy document read as a fallback
    pub legacy_document_key: String,
    pub remote_timeout: Duration,
    /// Extra attempts after a failed background push
    pub remote_max_retries: u32,
    /// Identity service base URL
    pub auth_service_url: Option<String>,
    /// AI service base URL; analyses fall back to local rules without it
    pub ai_service_url: Option<String>,
    pub ai_model: String,
    /// Accept the development password for any known or new email
    pub insecure_dev_auth: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            local_store_dir: PathBuf::from("./data"),
            local_store_quota_bytes: 5 * 1024 * 1024,
            default_tenant: None,
            legacy_document_key: "main".to_string(),
            remote_timeout: Duration::from_millis(10_000),
            remote_max_retries: 0,
            auth_service_url: None,
            ai_service_url: None,
            ai_model: "llama3.2".to_string(),
            insecure_dev_auth: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = env::var("HOST").unwrap_or(defaults.host);

        let port = match env::var("PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidPort)?,
            Err(_) => defaults.port,
        };

        let local_store_quota_bytes = parse_number("LOCAL_STORE_QUOTA_BYTES")?
            .map(|n| n as usize)
            .unwrap_or(defaults.local_store_quota_bytes);

        let remote_timeout = parse_number("REMOTE_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.remote_timeout);

        let remote_max_retries = parse_number("REMOTE_MAX_RETRIES")?
            .map(|n| n as u32)
            .unwrap_or(defaults.remote_max_retries);

        let insecure_dev_auth = match env::var("INSECURE_DEV_AUTH") {
            Ok(raw) => parse_flag("INSECURE_DEV_AUTH", &raw)?,
            Err(_) => defaults.insecure_dev_auth,
        };

        Ok(Self {
            host,
            port,
            database_url: non_empty("DATABASE_URL"),
            local_store_dir: non_empty("LOCAL_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.local_store_dir),
            local_store_quota_bytes,
            default_tenant: non_empty("DEFAULT_TENANT"),
            legacy_document_key: non_empty("LEGACY_DOCUMENT_KEY")
                .unwrap_or(defaults.legacy_document_key),
            remote_timeout,
            remote_max_retries,
            auth_service_url: non_empty("AUTH_SERVICE_URL"),
            ai_service_url: non_empty("AI_SERVICE_URL"),
            ai_model: non_empty("AI_MODEL").unwrap_or(defaults.ai_model),
            insecure_dev_auth,
        })
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match non_empty(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        None => Ok(None),
    }
}

fn parse_flag(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidFlag {
            name,
            value: other.to_string(),
        }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("{name} must be a non-negative integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name} must be true or false, got '{value}'")]
    InvalidFlag { name: &'static str, value: String },
}
