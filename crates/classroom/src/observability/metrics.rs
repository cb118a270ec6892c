//! Metrics definitions for the classroom coordinator.
//!
//! All metrics follow Prometheus naming conventions:
//! - `classroom_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Every label is bounded by an enum in this crate (see the module docs of
//! [`crate::observability`]). Participant and course ids are never labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle for
/// rendering the exposition text.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Join covers resolve, token and engine join: user-facing
        .set_buckets_for_metric(
            Matcher::Full("classroom_join_duration_seconds".to_string()),
            &[
                0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set join duration buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("classroom_token_request".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000],
        )
        .map_err(|e| format!("Failed to set token request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Session Lifecycle
// ============================================================================

/// Record a session state transition.
///
/// Metric: `classroom_session_transitions_total`
/// Labels: `transition` (created, ended, already_ended)
pub fn record_session_transition(transition: &str) {
    counter!("classroom_session_transitions_total",
        "transition" => transition.to_string()
    )
    .increment(1);
}

/// Record the outcome of a join attempt.
///
/// Metrics:
/// - `classroom_joins_total` (labels: `role`, `status`, `error_type`)
/// - `classroom_join_duration_seconds` (labels: `role`)
pub fn record_join(role: &str, error_type: Option<&str>, duration: Duration) {
    histogram!("classroom_join_duration_seconds", "role" => role.to_string())
        .record(duration.as_secs_f64());

    let status = if error_type.is_some() { "error" } else { "success" };
    counter!("classroom_joins_total",
        "role" => role.to_string(),
        "status" => status,
        "error_type" => error_type.unwrap_or("none").to_string()
    )
    .increment(1);
}

// ============================================================================
// Token Issuer
// ============================================================================

/// Record a token issuer request.
///
/// Metrics:
/// - `classroom_token_requests_total` (labels: `status`)
/// - `classroom_token_request_duration_seconds` (no labels)
/// - `classroom_token_request_failures_total` (labels: `error_type`, on failure only)
pub fn record_token_request(status: &str, error_type: Option<&str>, duration: Duration) {
    histogram!("classroom_token_request_duration_seconds").record(duration.as_secs_f64());

    counter!("classroom_token_requests_total",
        "status" => status.to_string()
    )
    .increment(1);

    if let Some(err_type) = error_type {
        counter!("classroom_token_request_failures_total",
            "error_type" => err_type.to_string()
        )
        .increment(1);
    }
}

// ============================================================================
// Local Media
// ============================================================================

/// Record a local role change request.
///
/// Metric: `classroom_role_changes_total`
/// Labels: `to` (presenter, listener), `status` (success, error, rolled_back)
pub fn record_role_change(to: &str, status: &str) {
    counter!("classroom_role_changes_total",
        "to" => to.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a local publish attempt.
///
/// Metric: `classroom_publish_total`
/// Labels: `kind`, `status` (success, device_error, error)
pub fn record_publish(kind: &str, status: &str) {
    counter!("classroom_publish_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Remote Media
// ============================================================================

/// Record a remote subscribe attempt.
///
/// Metric: `classroom_subscribe_total`
/// Labels: `kind`, `status` (success, error)
pub fn record_subscribe(kind: &str, status: &str) {
    counter!("classroom_subscribe_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a render bind outcome.
///
/// Metric: `classroom_bind_outcomes_total`
/// Labels: `target` (local, remote), `kind`, `outcome` (playing, gave_up)
pub fn record_bind_outcome(target: &str, kind: &str, outcome: &str) {
    counter!("classroom_bind_outcomes_total",
        "target" => target.to_string(),
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record an engine membership notification.
///
/// Metric: `classroom_engine_events_total`
/// Labels: `event_type`
pub fn record_engine_event(event_type: &str) {
    counter!("classroom_engine_events_total",
        "event_type" => event_type.to_string()
    )
    .increment(1);
}

/// Set the number of remote participants known to a classroom.
///
/// Metric: `classroom_remote_participants`
/// Labels: none
pub fn set_remote_participants(count: usize) {
    // usize to f64 conversion is safe for realistic classroom sizes
    #[allow(clippy::cast_precision_loss)]
    gauge!("classroom_remote_participants").set(count as f64);
}

// ============================================================================
// Persistence
// ============================================================================

/// Record a database query.
///
/// Metrics:
/// - `classroom_db_query_duration_seconds` (labels: `operation`)
/// - `classroom_db_queries_total` (labels: `operation`, `status`)
pub fn record_db_query(operation: &str, status: &str, duration: Duration) {
    histogram!("classroom_db_query_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("classroom_db_queries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Teardown & Errors
// ============================================================================

/// Record a failed teardown step.
///
/// Metric: `classroom_teardown_failures_total`
/// Labels: `step`
pub fn record_teardown_failure(step: &str) {
    counter!("classroom_teardown_failures_total",
        "step" => step.to_string()
    )
    .increment(1);
}

/// Record a non-fatal or fatal error by category.
///
/// Metric: `classroom_errors_total`
/// Labels: `operation`, `error_type`, `code`
pub fn record_error(operation: &str, error_type: &str, code: i32) {
    counter!("classroom_errors_total",
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string(),
        "code" => code.to_string()
    )
    .increment(1);
}
