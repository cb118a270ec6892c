//! Local participant role controller.
//!
//! One controller serves both teacher and student, parameterized by
//! [`RolePolicy`]. It owns the local track handles and keeps the engine's
//! client role in step with what is published: a track is never published
//! while the role is listener.

use crate::engine::{EngineError, MediaEngine, TrackHandle};
use crate::errors::ClassroomError;
use crate::models::{ClientRole, MediaKind};
use crate::observability::metrics;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a participant behaves in the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolePolicy {
    /// Role requested from the token issuer and used to join.
    pub initial_role: ClientRole,
    /// Create and publish audio and video right after joining.
    pub auto_publish: bool,
    /// Whether the role may switch between listener and presenter.
    pub can_change_role: bool,
}

impl RolePolicy {
    #[must_use]
    pub const fn teacher() -> Self {
        Self {
            initial_role: ClientRole::Presenter,
            auto_publish: true,
            can_change_role: false,
        }
    }

    #[must_use]
    pub const fn student() -> Self {
        Self {
            initial_role: ClientRole::Listener,
            auto_publish: false,
            can_change_role: true,
        }
    }
}

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleState {
    Idle,
    Joined(ClientRole),
    Left,
}

/// Outcome of [`RoleController::release_all`].
#[derive(Debug, Default)]
pub struct ReleaseReport {
    pub released: usize,
    pub failures: Vec<String>,
}

pub struct RoleController {
    engine: Arc<dyn MediaEngine>,
    policy: RolePolicy,
    state: RoleState,
    /// Published local tracks. A track enters only after publish succeeds.
    tracks: BTreeMap<MediaKind, TrackHandle>,
}

impl RoleController {
    pub fn new(engine: Arc<dyn MediaEngine>, policy: RolePolicy) -> Self {
        Self {
            engine,
            policy,
            state: RoleState::Idle,
            tracks: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> RolePolicy {
        self.policy
    }

    #[must_use]
    pub fn state(&self) -> RoleState {
        self.state
    }

    /// Current client role, `None` unless joined.
    #[must_use]
    pub fn role(&self) -> Option<ClientRole> {
        match self.state {
            RoleState::Joined(role) => Some(role),
            RoleState::Idle | RoleState::Left => None,
        }
    }

    #[must_use]
    pub fn is_enabled(&self, kind: MediaKind) -> bool {
        self.tracks.contains_key(&kind)
    }

    /// Kinds currently published, audio first.
    #[must_use]
    pub fn published_kinds(&self) -> Vec<MediaKind> {
        self.tracks.keys().copied().collect()
    }

    #[must_use]
    pub fn local_track(&self, kind: MediaKind) -> Option<&TrackHandle> {
        self.tracks.get(&kind)
    }

    /// Enter `Joined(initial_role)` after the engine join succeeded and, for
    /// auto-publishing policies, open and publish audio and video.
    ///
    /// Per-kind failures are returned, not raised: the participant stays
    /// joined without that medium.
    pub async fn on_joined(&mut self) -> Vec<ClassroomError> {
        self.state = RoleState::Joined(self.policy.initial_role);
        info!(
            target: "classroom.role",
            role = self.policy.initial_role.as_str(),
            "Joined channel"
        );

        let mut failures = Vec::new();
        if self.policy.auto_publish {
            for kind in MediaKind::ALL {
                if let Err(e) = self.enable(kind).await {
                    warn!(target: "classroom.role", kind = %kind, error = %e, "Auto-publish failed");
                    failures.push(e);
                }
            }
        }
        failures
    }

    /// Flip the enabled state of `kind`. Returns the new state.
    pub async fn toggle(&mut self, kind: MediaKind) -> Result<bool, ClassroomError> {
        let enabled = !self.is_enabled(kind);
        self.set_enabled(kind, enabled).await
    }

    /// Idempotently enable or disable `kind`. Returns the resulting state.
    pub async fn set_enabled(
        &mut self,
        kind: MediaKind,
        enabled: bool,
    ) -> Result<bool, ClassroomError> {
        if self.role().is_none() {
            return Err(ClassroomError::NotJoined);
        }
        if self.is_enabled(kind) == enabled {
            return Ok(enabled);
        }
        if enabled {
            self.enable(kind).await?;
            Ok(true)
        } else {
            self.disable(kind).await;
            Ok(false)
        }
    }

    /// Upgrade (if needed), create, publish. Rolls the role back on any
    /// failure after the upgrade.
    async fn enable(&mut self, kind: MediaKind) -> Result<(), ClassroomError> {
        let mut upgraded = false;
        if self.role() == Some(ClientRole::Listener) {
            if !self.policy.can_change_role {
                return Err(ClassroomError::Publish(
                    "role change not permitted".to_string(),
                ));
            }
            if let Err(e) = self.engine.set_client_role(ClientRole::Presenter).await {
                metrics::record_role_change(ClientRole::Presenter.as_str(), "error");
                return Err(ClassroomError::Publish(format!("role upgrade rejected: {e}")));
            }
            metrics::record_role_change(ClientRole::Presenter.as_str(), "success");
            self.state = RoleState::Joined(ClientRole::Presenter);
            upgraded = true;
            debug!(target: "classroom.role", kind = %kind, "Upgraded to presenter");
        }

        let handle = match self.engine.create_local_track(kind).await {
            Ok(handle) => handle,
            Err(e) => {
                let status = if e.is_device_failure() { "device_error" } else { "error" };
                metrics::record_publish(kind.as_str(), status);
                self.rollback(upgraded).await;
                return Err(map_create_error(kind, e));
            }
        };

        if let Err(e) = self.engine.publish(&handle).await {
            metrics::record_publish(kind.as_str(), "error");
            self.discard(&handle);
            self.rollback(upgraded).await;
            return Err(ClassroomError::Publish(e.to_string()));
        }

        metrics::record_publish(kind.as_str(), "success");
        info!(target: "classroom.role", kind = %kind, "Local track published");
        self.tracks.insert(kind, handle);
        Ok(())
    }

    /// Unpublish, stop, close, then downgrade if nothing is published.
    async fn disable(&mut self, kind: MediaKind) {
        let Some(handle) = self.tracks.remove(&kind) else {
            return;
        };

        if let Err(e) = self.engine.unpublish(&handle).await {
            warn!(target: "classroom.role", kind = %kind, error = %e, "Unpublish failed, closing track anyway");
        }
        self.discard(&handle);
        info!(target: "classroom.role", kind = %kind, "Local track disabled");

        if self.policy.can_change_role
            && self.role() == Some(ClientRole::Presenter)
            && self.published_kinds().is_empty()
        {
            self.downgrade().await;
        }
    }

    async fn rollback(&mut self, upgraded: bool) {
        if upgraded && self.published_kinds().is_empty() {
            self.downgrade().await;
            metrics::record_role_change(ClientRole::Presenter.as_str(), "rolled_back");
        }
    }

    async fn downgrade(&mut self) {
        match self.engine.set_client_role(ClientRole::Listener).await {
            Ok(()) => {
                metrics::record_role_change(ClientRole::Listener.as_str(), "success");
                self.state = RoleState::Joined(ClientRole::Listener);
                debug!(target: "classroom.role", "Downgraded to listener");
            }
            Err(e) => {
                // Local role keeps tracking what the engine last accepted
                metrics::record_role_change(ClientRole::Listener.as_str(), "error");
                warn!(target: "classroom.role", error = %e, "Downgrade to listener rejected");
            }
        }
    }

    /// Stop then close a track, logging failures.
    fn discard(&self, handle: &TrackHandle) {
        if let Err(e) = self.engine.stop_track(handle) {
            warn!(target: "classroom.role", kind = %handle.kind, error = %e, "Stop track failed");
        }
        if let Err(e) = self.engine.close_track(handle) {
            warn!(target: "classroom.role", kind = %handle.kind, error = %e, "Close track failed");
        }
    }

    /// Stop then close every local track regardless of publish state and
    /// forget the references. The controller ends in [`RoleState::Left`].
    pub fn release_all(&mut self) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        for (kind, handle) in std::mem::take(&mut self.tracks) {
            let stopped = self.engine.stop_track(&handle);
            let closed = self.engine.close_track(&handle);
            match stopped.and(closed) {
                Ok(()) => report.released += 1,
                Err(e) => report.failures.push(format!("{kind}: {e}")),
            }
        }
        self.state = RoleState::Left;
        report
    }
}

fn map_create_error(kind: MediaKind, error: EngineError) -> ClassroomError {
    if error.is_device_failure() {
        ClassroomError::Device {
            kind,
            reason: error.to_string(),
        }
    } else {
        ClassroomError::Publish(error.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::engine::mock::{EngineCall, MockMediaEngine};
    use crate::models::ChannelBinding;
    use common::secret::SecretString;
    use common::types::Uid;

    async fn joined(policy: RolePolicy) -> (Arc<MockMediaEngine>, RoleController) {
        let engine = Arc::new(MockMediaEngine::new());
        engine
            .join(
                "app",
                &SecretString::from("token"),
                &ChannelBinding {
                    channel_name: "course_c_1".to_string(),
                    uid: Uid::from("local"),
                    role: policy.initial_role,
                },
            )
            .await
            .unwrap();
        let controller = RoleController::new(engine.clone(), policy);
        (engine, controller)
    }

    #[tokio::test]
    async fn test_teacher_publishes_both_kinds_on_join() {
        let (engine, mut controller) = joined(RolePolicy::teacher()).await;

        let failures = controller.on_joined().await;

        assert!(failures.is_empty());
        assert_eq!(controller.state(), RoleState::Joined(ClientRole::Presenter));
        assert_eq!(controller.published_kinds(), vec![MediaKind::Audio, MediaKind::Video]);
        assert_eq!(engine.published_kinds().len(), 2);
    }

    #[tokio::test]
    async fn test_teacher_camera_denied_stays_joined_with_audio() {
        let (engine, mut controller) = joined(RolePolicy::teacher()).await;
        engine.fail_device(
            MediaKind::Video,
            Some(EngineError::DevicePermission("camera blocked".to_string())),
        );

        let failures = controller.on_joined().await;

        assert!(matches!(
            failures.as_slice(),
            [ClassroomError::Device {
                kind: MediaKind::Video,
                ..
            }]
        ));
        assert_eq!(controller.role(), Some(ClientRole::Presenter));
        assert_eq!(controller.published_kinds(), vec![MediaKind::Audio]);
        // No retry loop
        assert_eq!(
            engine.count_calls(|c| *c == EngineCall::CreateTrack(MediaKind::Video)),
            1
        );
    }

    #[tokio::test]
    async fn test_student_joins_silently() {
        let (engine, mut controller) = joined(RolePolicy::student()).await;

        assert!(controller.on_joined().await.is_empty());

        assert_eq!(controller.role(), Some(ClientRole::Listener));
        assert!(controller.published_kinds().is_empty());
        assert_eq!(engine.count_calls(|c| matches!(c, EngineCall::CreateTrack(_))), 0);
    }

    #[tokio::test]
    async fn test_camera_toggle_on_then_off_restores_listener() {
        let (engine, mut controller) = joined(RolePolicy::student()).await;
        controller.on_joined().await;

        assert!(controller.toggle(MediaKind::Video).await.unwrap());
        assert_eq!(controller.role(), Some(ClientRole::Presenter));
        assert_eq!(engine.client_role(), Some(ClientRole::Presenter));

        assert!(!controller.toggle(MediaKind::Video).await.unwrap());
        assert_eq!(controller.role(), Some(ClientRole::Listener));
        assert_eq!(engine.client_role(), Some(ClientRole::Listener));
        assert!(engine.published_kinds().is_empty());
        assert_eq!(engine.open_local_tracks(), 0);
    }

    #[tokio::test]
    async fn test_unpublish_precedes_downgrade() {
        let (engine, mut controller) = joined(RolePolicy::student()).await;
        controller.on_joined().await;
        controller.set_enabled(MediaKind::Audio, true).await.unwrap();

        controller.set_enabled(MediaKind::Audio, false).await.unwrap();

        let calls = engine.calls();
        let unpublish = calls
            .iter()
            .position(|c| matches!(c, EngineCall::Unpublish(_)))
            .unwrap();
        let downgrade = calls
            .iter()
            .rposition(|c| *c == EngineCall::SetClientRole(ClientRole::Listener))
            .unwrap();
        assert!(unpublish < downgrade);
    }

    #[tokio::test]
    async fn test_unpublish_failure_still_closes_track_and_downgrades() {
        let (engine, mut controller) = joined(RolePolicy::student()).await;
        controller.on_joined().await;
        controller.set_enabled(MediaKind::Video, true).await.unwrap();
        engine.fail_unpublish(Some(EngineError::Network("socket closed".to_string())));

        let enabled = controller.set_enabled(MediaKind::Video, false).await.unwrap();

        assert!(!enabled);
        assert!(!controller.is_enabled(MediaKind::Video));
        assert!(controller.local_track(MediaKind::Video).is_none());
        assert_eq!(engine.open_local_tracks(), 0);
        assert_eq!(engine.count_calls(|c| matches!(c, EngineCall::StopTrack(_))), 1);
        assert_eq!(controller.role(), Some(ClientRole::Listener));
        assert_eq!(engine.client_role(), Some(ClientRole::Listener));
    }

    #[tokio::test]
    async fn test_keeps_presenter_while_another_track_is_published() {
        let (_engine, mut controller) = joined(RolePolicy::student()).await;
        controller.on_joined().await;
        controller.set_enabled(MediaKind::Audio, true).await.unwrap();
        controller.set_enabled(MediaKind::Video, true).await.unwrap();

        controller.set_enabled(MediaKind::Video, false).await.unwrap();

        assert_eq!(controller.role(), Some(ClientRole::Presenter));
        assert_eq!(controller.published_kinds(), vec![MediaKind::Audio]);
    }

    #[tokio::test]
    async fn test_publish_failure_rolls_back_to_listener() {
        let (engine, mut controller) = joined(RolePolicy::student()).await;
        controller.on_joined().await;
        engine.fail_publish(Some(EngineError::Rejected("gateway".to_string())));

        let result = controller.set_enabled(MediaKind::Video, true).await;

        assert!(matches!(result, Err(ClassroomError::Publish(_))));
        assert_eq!(controller.role(), Some(ClientRole::Listener));
        assert_eq!(engine.client_role(), Some(ClientRole::Listener));
        assert_eq!(engine.open_local_tracks(), 0);
        assert!(!controller.is_enabled(MediaKind::Video));
    }

    #[tokio::test]
    async fn test_device_failure_rolls_back_to_listener() {
        let (engine, mut controller) = joined(RolePolicy::student()).await;
        controller.on_joined().await;
        engine.fail_device(
            MediaKind::Audio,
            Some(EngineError::DeviceUnavailable("no microphone".to_string())),
        );

        let result = controller.toggle(MediaKind::Audio).await;

        assert!(matches!(
            result,
            Err(ClassroomError::Device {
                kind: MediaKind::Audio,
                ..
            })
        ));
        assert_eq!(engine.client_role(), Some(ClientRole::Listener));
    }

    #[tokio::test]
    async fn test_rejected_upgrade_leaves_listener() {
        let (engine, mut controller) = joined(RolePolicy::student()).await;
        controller.on_joined().await;
        engine.fail_role_change(
            ClientRole::Presenter,
            Some(EngineError::Rejected("no permission".to_string())),
        );

        let result = controller.toggle(MediaKind::Video).await;

        assert!(matches!(result, Err(ClassroomError::Publish(_))));
        assert_eq!(controller.role(), Some(ClientRole::Listener));
        assert_eq!(engine.count_calls(|c| matches!(c, EngineCall::CreateTrack(_))), 0);
    }

    #[tokio::test]
    async fn test_set_enabled_is_idempotent() {
        let (engine, mut controller) = joined(RolePolicy::student()).await;
        controller.on_joined().await;

        controller.set_enabled(MediaKind::Audio, true).await.unwrap();
        controller.set_enabled(MediaKind::Audio, true).await.unwrap();
        controller.set_enabled(MediaKind::Video, false).await.unwrap();

        assert_eq!(engine.count_calls(|c| matches!(c, EngineCall::Publish(_))), 1);
    }

    #[tokio::test]
    async fn test_media_commands_require_join() {
        let engine = Arc::new(MockMediaEngine::new());
        let mut controller = RoleController::new(engine, RolePolicy::student());

        let result = controller.toggle(MediaKind::Audio).await;
        assert!(matches!(result, Err(ClassroomError::NotJoined)));
    }

    #[tokio::test]
    async fn test_release_all_stops_and_closes_everything() {
        let (engine, mut controller) = joined(RolePolicy::teacher()).await;
        controller.on_joined().await;

        let report = controller.release_all();

        assert_eq!(report.released, 2);
        assert!(report.failures.is_empty());
        assert_eq!(controller.state(), RoleState::Left);
        assert!(controller.local_track(MediaKind::Video).is_none());
        assert_eq!(engine.open_local_tracks(), 0);
        assert!(matches!(
            controller.toggle(MediaKind::Audio).await,
            Err(ClassroomError::NotJoined)
        ));
    }
}
