//! Classroom coordinator configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use crate::coordinator::binder::BindPolicy;
use common::config::{DatabaseConfig, ObservabilityConfig};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default number of render bind attempts before giving up.
pub const DEFAULT_BIND_MAX_ATTEMPTS: u32 = 5;

/// Default spacing between render bind attempts in milliseconds.
pub const DEFAULT_BIND_RETRY_INTERVAL_MS: u64 = 200;

/// Default token issuer request timeout in seconds.
pub const DEFAULT_TOKEN_REQUEST_TIMEOUT_SECONDS: u64 = 10;

/// Default database pool size.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Default channel name prefix (`<prefix>_<course_id>_<millis>`).
pub const DEFAULT_CHANNEL_PREFIX: &str = "course";

/// Classroom coordinator configuration.
#[derive(Clone)]
pub struct Config {
    /// Token issuer endpoint (POST).
    pub token_issuer_url: String,

    /// Bearer token presented to the token issuer.
    /// Protected by `SecretString` to prevent accidental logging.
    pub token_issuer_auth_token: SecretString,

    /// Token issuer request timeout in seconds (default: 10).
    pub token_request_timeout_seconds: u64,

    /// Postgres settings. `None` when `DATABASE_URL` is unset and the caller
    /// supplies its own stores.
    pub database: Option<DatabaseConfig>,

    /// Render bind attempts before reporting a bind timeout (default: 5).
    pub bind_max_attempts: u32,

    /// Spacing between render bind attempts in milliseconds (default: 200).
    pub bind_retry_interval_ms: u64,

    /// Prefix for generated channel names (default: "course").
    pub channel_prefix: String,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token_issuer_url", &self.token_issuer_url)
            .field("token_issuer_auth_token", &"[REDACTED]")
            .field(
                "token_request_timeout_seconds",
                &self.token_request_timeout_seconds,
            )
            .field(
                "database_max_connections",
                &self.database.as_ref().map(|db| db.max_connections),
            )
            .field("bind_max_attempts", &self.bind_max_attempts)
            .field("bind_retry_interval_ms", &self.bind_retry_interval_ms)
            .field("channel_prefix", &self.channel_prefix)
            .field("observability", &self.observability)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let token_issuer_url = vars
            .get("CLASSROOM_TOKEN_ISSUER_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("CLASSROOM_TOKEN_ISSUER_URL".to_string()))?
            .clone();

        if !token_issuer_url.starts_with("http://") && !token_issuer_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "CLASSROOM_TOKEN_ISSUER_URL must be an http(s) URL".to_string(),
            ));
        }

        let token_issuer_auth_token = SecretString::from(
            vars.get("CLASSROOM_TOKEN_ISSUER_AUTH_TOKEN")
                .ok_or_else(|| {
                    ConfigError::MissingEnvVar("CLASSROOM_TOKEN_ISSUER_AUTH_TOKEN".to_string())
                })?
                .clone(),
        );

        let token_request_timeout_seconds = vars
            .get("CLASSROOM_TOKEN_REQUEST_TIMEOUT_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TOKEN_REQUEST_TIMEOUT_SECONDS);

        let max_connections = vars
            .get("CLASSROOM_DB_MAX_CONNECTIONS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

        let database = vars.get("DATABASE_URL").map(|url| DatabaseConfig {
            postgres_url: SecretString::from(url.clone()),
            max_connections,
        });

        let bind_max_attempts = parse_positive(
            vars,
            "CLASSROOM_BIND_MAX_ATTEMPTS",
            DEFAULT_BIND_MAX_ATTEMPTS,
        )?;

        let bind_retry_interval_ms = parse_positive(
            vars,
            "CLASSROOM_BIND_RETRY_INTERVAL_MS",
            DEFAULT_BIND_RETRY_INTERVAL_MS,
        )?;

        let channel_prefix = vars
            .get("CLASSROOM_CHANNEL_PREFIX")
            .cloned()
            .unwrap_or_else(|| DEFAULT_CHANNEL_PREFIX.to_string());

        if channel_prefix.is_empty()
            || !channel_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::InvalidValue(
                "CLASSROOM_CHANNEL_PREFIX must be non-empty ASCII alphanumerics, '_' or '-'"
                    .to_string(),
            ));
        }

        let observability = ObservabilityConfig {
            log_level: vars
                .get("CLASSROOM_LOG_LEVEL")
                .cloned()
                .unwrap_or_else(|| "info".to_string()),
            json_logs: vars
                .get("CLASSROOM_JSON_LOGS")
                .is_some_and(|v| v == "true" || v == "1"),
        };

        Ok(Config {
            token_issuer_url,
            token_issuer_auth_token,
            token_request_timeout_seconds,
            database,
            bind_max_attempts,
            bind_retry_interval_ms,
            channel_prefix,
            observability,
        })
    }

    /// Render binder retry policy derived from this configuration.
    #[must_use]
    pub fn bind_policy(&self) -> BindPolicy {
        BindPolicy {
            max_attempts: self.bind_max_attempts,
            retry_interval: Duration::from_millis(self.bind_retry_interval_ms),
        }
    }

    /// Token issuer request timeout.
    #[must_use]
    pub fn token_request_timeout(&self) -> Duration {
        Duration::from_secs(self.token_request_timeout_seconds)
    }
}

/// Parse an optional numeric variable that must be at least 1 when present.
fn parse_positive<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
{
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => match raw.parse::<T>() {
            Ok(value) if value >= T::from(1) => Ok(value),
            _ => Err(ConfigError::InvalidValue(format!(
                "{name} must be a positive integer"
            ))),
        },
    }
}
