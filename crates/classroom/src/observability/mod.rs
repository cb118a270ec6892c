//! Observability for the classroom coordinator.
//!
//! # Privacy by Default
//!
//! Async entry points use `#[instrument(skip_all)]` with explicit safe field
//! allow-listing. Credentials never appear in spans or events. Metric labels
//! are bounded:
//! - `role`: teacher, student
//! - `kind`: audio, video
//! - `target`: local, remote
//! - `step`: bounded by [`crate::coordinator::cleanup::TeardownStep`]
//! - `error_type`: bounded by [`crate::errors::ClassroomError::label`]
//!
//! # Log targets
//!
//! | Target | Component |
//! |--------|-----------|
//! | `classroom.lifecycle` | session resolve/create/end |
//! | `classroom.role` | role upgrades, local tracks |
//! | `classroom.registry` | remote participant bookkeeping |
//! | `classroom.binder` | render bind attempts |
//! | `classroom.cleanup` | teardown steps |
//! | `classroom.actor` | classroom task loop |
//! | `classroom.token_issuer` | credential requests |
//! | `classroom.repo` | persistence |

pub mod metrics;

use common::config::ObservabilityConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `config.log_level` is used as the
/// filter. JSON output is selected by `config.json_logs`.
///
/// # Errors
///
/// Returns error if a global subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), String> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.as_str().into());

    tracing_subscriber::registry()
        .with(filter)
        .with(config.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!config.json_logs).then(tracing_subscriber::fmt::layer))
        .try_init()
        .map_err(|e| format!("Failed to install tracing subscriber: {e}"))
}
