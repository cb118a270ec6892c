//! Cleanup coordinator.
//!
//! Runs on every exit path: explicit leave, teacher stop, every handle
//! dropped, cancellation, and a failed join. Steps run in a fixed order and
//! are independent: a failure is recorded in the report and the remaining
//! steps still run. Nothing is retried.

use super::binder::{RenderBinder, SurfaceHost};
use super::registry::RemoteParticipantRegistry;
use super::role::RoleController;
use crate::engine::MediaEngine;
use crate::models::Session;
use crate::observability::metrics;
use crate::services::SessionLifecycle;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Teardown steps that can fail, in execution order. Releasing surfaces and
/// removing listeners cannot fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownStep {
    ReleaseTracks,
    LeaveChannel,
    EndSession,
}

impl TeardownStep {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TeardownStep::ReleaseTracks => "release_tracks",
            TeardownStep::LeaveChannel => "leave_channel",
            TeardownStep::EndSession => "end_session",
        }
    }
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownFailure {
    pub step: TeardownStep,
    pub message: String,
}

/// What teardown accomplished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub tracks_released: usize,
    pub channel_left: bool,
    pub session_ended: bool,
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    fn fail(&mut self, step: TeardownStep, message: String) {
        warn!(target: "classroom.cleanup", step = %step, error = %message, "Teardown step failed");
        metrics::record_teardown_failure(step.as_str());
        self.failures.push(TeardownFailure { step, message });
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// How far the engine join got before teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// Join never called. Leave is skipped.
    NotAttempted,
    /// Join returned an error. Leave is still called in case the engine got
    /// partway in; its failure is logged, not reported.
    JoinFailed,
    Joined,
}

impl ChannelState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChannelState::NotAttempted => "not_attempted",
            ChannelState::JoinFailed => "join_failed",
            ChannelState::Joined => "joined",
        }
    }
}

/// Components torn down together.
pub struct TeardownTarget<'a> {
    pub role: &'a mut RoleController,
    pub registry: &'a mut RemoteParticipantRegistry,
    pub binder: &'a mut RenderBinder,
    pub channel: ChannelState,
    /// Session to end, set only for the owning teacher.
    pub end_session: Option<&'a Session>,
}

pub struct CleanupCoordinator {
    engine: Arc<dyn MediaEngine>,
    surfaces: Arc<dyn SurfaceHost>,
    lifecycle: Arc<SessionLifecycle>,
}

impl CleanupCoordinator {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        surfaces: Arc<dyn SurfaceHost>,
        lifecycle: Arc<SessionLifecycle>,
    ) -> Self {
        Self {
            engine,
            surfaces,
            lifecycle,
        }
    }

    /// Release everything `target` holds.
    #[instrument(skip_all, name = "classroom.cleanup.teardown", fields(channel = target.channel.as_str()))]
    pub async fn teardown(&self, target: TeardownTarget<'_>) -> TeardownReport {
        let mut report = TeardownReport::default();

        // 1. Surfaces, then local tracks (stop before close)
        target.binder.clear(self.surfaces.as_ref());
        let released = target.role.release_all();
        report.tracks_released = released.released;
        for failure in released.failures {
            report.fail(TeardownStep::ReleaseTracks, failure);
        }

        // 2. Listeners, then channel
        target.registry.dispose();
        match target.channel {
            ChannelState::NotAttempted => {}
            ChannelState::JoinFailed => match self.engine.leave().await {
                Ok(()) => report.channel_left = true,
                Err(e) => {
                    debug!(target: "classroom.cleanup", error = %e, "Leave after failed join");
                }
            },
            ChannelState::Joined => match self.engine.leave().await {
                Ok(()) => report.channel_left = true,
                Err(e) => report.fail(TeardownStep::LeaveChannel, e.to_string()),
            },
        }

        // 3. Session record
        if let Some(session) = target.end_session {
            match self.lifecycle.end(session.id).await {
                Ok(_) => report.session_ended = true,
                Err(e) => report.fail(TeardownStep::EndSession, e.to_string()),
            }
        }

        info!(
            target: "classroom.cleanup",
            tracks_released = report.tracks_released,
            channel_left = report.channel_left,
            session_ended = report.session_ended,
            failures = report.failures.len(),
            "Teardown complete"
        );
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coordinator::binder::{BindPolicy, SurfaceKey, SurfaceSize};
    use crate::coordinator::role::{RolePolicy, RoleState};
    use crate::engine::mock::{EngineCall, MockMediaEngine};
    use crate::engine::{EngineError, TrackHandle};
    use crate::models::{Actor, ChannelBinding, ClientRole, MediaKind, SessionStatus};
    use crate::repositories::{InMemoryCourseDirectory, InMemorySessionStore};
    use common::secret::SecretString;
    use common::types::{CourseId, Uid, UserId};

    struct NoSurfaces;

    impl SurfaceHost for NoSurfaces {
        fn dimensions(&self, _surface: &SurfaceKey) -> Option<SurfaceSize> {
            None
        }
        fn attach_video(&self, _surface: &SurfaceKey, _track: &TrackHandle) -> Result<(), String> {
            Ok(())
        }
        fn play_audio(&self, _surface: &SurfaceKey, _track: &TrackHandle) -> Result<(), String> {
            Ok(())
        }
        fn release(&self, _surface: &SurfaceKey, _kind: MediaKind) {}
    }

    struct Fixture {
        engine: Arc<MockMediaEngine>,
        sessions: Arc<InMemorySessionStore>,
        lifecycle: Arc<SessionLifecycle>,
        cleanup: CleanupCoordinator,
        session: Session,
        role: RoleController,
        registry: RemoteParticipantRegistry,
        binder: RenderBinder,
    }

    async fn joined_teacher() -> Fixture {
        let engine = Arc::new(MockMediaEngine::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let courses = Arc::new(InMemoryCourseDirectory::new());
        let course = CourseId::new();
        let teacher = Actor::teacher(UserId::new());
        courses.add_course(course, teacher.user_id);
        let lifecycle = Arc::new(SessionLifecycle::new(sessions.clone(), courses));
        let session = lifecycle.resolve_or_create(course, &teacher).await.unwrap();

        let registry = RemoteParticipantRegistry::new(engine.clone());
        engine
            .join(
                "app",
                &SecretString::from("token"),
                &ChannelBinding {
                    channel_name: session.channel_name.clone(),
                    uid: Uid::from(teacher.user_id),
                    role: ClientRole::Presenter,
                },
            )
            .await
            .unwrap();
        let mut role = RoleController::new(engine.clone(), RolePolicy::teacher());
        role.on_joined().await;

        let cleanup = CleanupCoordinator::new(engine.clone(), Arc::new(NoSurfaces), lifecycle.clone());
        Fixture {
            engine,
            sessions,
            lifecycle,
            cleanup,
            session,
            role,
            registry,
            binder: RenderBinder::new(BindPolicy::default()),
        }
    }

    #[tokio::test]
    async fn test_teacher_teardown_releases_everything_and_ends_session() {
        let mut f = joined_teacher().await;

        let report = f
            .cleanup
            .teardown(TeardownTarget {
                role: &mut f.role,
                registry: &mut f.registry,
                binder: &mut f.binder,
                channel: ChannelState::Joined,
                end_session: Some(&f.session),
            })
            .await;

        assert!(report.is_clean());
        assert_eq!(report.tracks_released, 2);
        assert!(report.channel_left);
        assert!(report.session_ended);
        assert_eq!(f.role.state(), RoleState::Left);
        assert_eq!(f.engine.open_local_tracks(), 0);
        assert!(!f.engine.is_joined());
        assert_eq!(f.engine.listener_count(), 0);
        let stored = f.lifecycle.get(f.session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Ended);
    }

    #[tokio::test]
    async fn test_leave_failure_does_not_block_session_end() {
        let mut f = joined_teacher().await;
        f.engine
            .fail_leave(Some(EngineError::Network("socket closed".to_string())));

        let report = f
            .cleanup
            .teardown(TeardownTarget {
                role: &mut f.role,
                registry: &mut f.registry,
                binder: &mut f.binder,
                channel: ChannelState::Joined,
                end_session: Some(&f.session),
            })
            .await;

        assert!(!report.channel_left);
        assert!(report.session_ended);
        assert_eq!(report.tracks_released, 2);
        assert_eq!(
            report.failures.iter().map(|f| f.step).collect::<Vec<_>>(),
            vec![TeardownStep::LeaveChannel]
        );
        // No retry
        assert_eq!(f.engine.count_calls(|c| *c == EngineCall::Leave), 1);
    }

    #[tokio::test]
    async fn test_store_failure_reported_after_channel_left() {
        let mut f = joined_teacher().await;
        f.sessions.set_failing(true);

        let report = f
            .cleanup
            .teardown(TeardownTarget {
                role: &mut f.role,
                registry: &mut f.registry,
                binder: &mut f.binder,
                channel: ChannelState::Joined,
                end_session: Some(&f.session),
            })
            .await;

        assert!(report.channel_left);
        assert!(!report.session_ended);
        assert_eq!(
            report.failures.iter().map(|f| f.step).collect::<Vec<_>>(),
            vec![TeardownStep::EndSession]
        );
    }

    #[tokio::test]
    async fn test_leave_skipped_when_join_never_attempted() {
        let mut f = joined_teacher().await;

        let report = f
            .cleanup
            .teardown(TeardownTarget {
                role: &mut f.role,
                registry: &mut f.registry,
                binder: &mut f.binder,
                channel: ChannelState::NotAttempted,
                end_session: None,
            })
            .await;

        assert!(!report.channel_left);
        assert!(!report.session_ended);
        assert_eq!(f.engine.count_calls(|c| *c == EngineCall::Leave), 0);
        let calls = f.engine.calls();
        let last_close = calls
            .iter()
            .rposition(|c| matches!(c, EngineCall::CloseTrack(_)))
            .unwrap();
        let listeners_removed = calls
            .iter()
            .position(|c| *c == EngineCall::RemoveAllListeners)
            .unwrap();
        assert!(last_close < listeners_removed);
    }

    #[tokio::test]
    async fn test_failed_join_still_leaves_best_effort() {
        let mut f = joined_teacher().await;
        f.engine
            .fail_leave(Some(EngineError::Rejected("not in channel".to_string())));

        let report = f
            .cleanup
            .teardown(TeardownTarget {
                role: &mut f.role,
                registry: &mut f.registry,
                binder: &mut f.binder,
                channel: ChannelState::JoinFailed,
                end_session: Some(&f.session),
            })
            .await;

        assert_eq!(f.engine.count_calls(|c| *c == EngineCall::Leave), 1);
        assert!(!report.channel_left);
        assert!(report.session_ended);
        assert!(report.is_clean());
    }
}
