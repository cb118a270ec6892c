//! Common configuration types for Live Classroom components.

use crate::secret::SecretString;
use serde::Deserialize;

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string (redacted in Debug output)
    pub postgres_url: SecretString,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObservabilityConfig {
    /// Fallback log filter when `RUST_LOG` is unset (trace, debug, info, warn, error)
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
