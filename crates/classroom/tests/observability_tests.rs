//! Process-wide tracing and metrics installation.
//!
//! Each test installs a global exactly once, so they live in their own
//! test binary.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use classroom::observability::{self, metrics};
use common::config::ObservabilityConfig;
use std::time::Duration;

#[test]
fn test_tracing_installs_once() {
    let config = ObservabilityConfig {
        log_level: "debug".to_string(),
        json_logs: true,
    };

    observability::init_tracing(&config).unwrap();
    tracing::info!(target: "classroom.actor", "subscriber installed");

    assert!(observability::init_tracing(&ObservabilityConfig::default()).is_err());
}

#[test]
fn test_prometheus_recorder_renders_classroom_metrics() {
    let handle = metrics::init_metrics_recorder().unwrap();

    metrics::record_session_transition("created");
    metrics::record_join("teacher", None, Duration::from_millis(120));
    metrics::record_bind_outcome("remote", "video", "playing");

    let rendered = handle.render();
    assert!(rendered.contains("classroom_session_transitions_total"));
    assert!(rendered.contains("classroom_join_duration_seconds_bucket"));
    assert!(rendered.contains(r#"target="remote""#));

    assert!(metrics::init_metrics_recorder().is_err());
}
