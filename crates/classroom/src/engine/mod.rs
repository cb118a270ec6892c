//! Media engine seam.
//!
//! The real-time media SDK is an external collaborator: it owns transport,
//! codecs and device capture. The coordinator only drives it through
//! [`MediaEngine`] and consumes its notifications through a typed
//! [`EventSubscription`].
//!
//! [`mock`] provides an in-memory engine with failure injection for tests.

pub mod mock;

use crate::models::{ChannelBinding, ClientRole, MediaKind};
use async_trait::async_trait;
use common::secret::SecretString;
use common::types::Uid;
use thiserror::Error;
use tokio::sync::mpsc;

/// Engine-side failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Camera or microphone permission denied by the user or platform.
    #[error("device permission denied: {0}")]
    DevicePermission(String),

    /// Device missing or busy.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Engine refused the operation (permissions, invalid state).
    #[error("rejected: {0}")]
    Rejected(String),

    /// Network or gateway failure.
    #[error("network: {0}")]
    Network(String),
}

impl EngineError {
    /// Whether the failure comes from local capture hardware.
    #[must_use]
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            EngineError::DevicePermission(_) | EngineError::DeviceUnavailable(_)
        )
    }
}

/// Opaque reference to an engine track (local or remote).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackHandle {
    pub id: String,
    pub kind: MediaKind,
}

/// Channel membership notifications emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    UserJoined { uid: Uid },
    UserLeft { uid: Uid },
    UserPublished { uid: Uid, kind: MediaKind },
    UserUnpublished { uid: Uid, kind: MediaKind },
}

impl EngineEvent {
    /// Remote participant the event concerns.
    #[must_use]
    pub fn uid(&self) -> &Uid {
        match self {
            EngineEvent::UserJoined { uid }
            | EngineEvent::UserLeft { uid }
            | EngineEvent::UserPublished { uid, .. }
            | EngineEvent::UserUnpublished { uid, .. } => uid,
        }
    }

    /// Event name as a metric label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineEvent::UserJoined { .. } => "user_joined",
            EngineEvent::UserLeft { .. } => "user_left",
            EngineEvent::UserPublished { .. } => "user_published",
            EngineEvent::UserUnpublished { .. } => "user_unpublished",
        }
    }
}

/// Typed listener registration for engine notifications.
///
/// Engine callbacks cannot await, so the channel is unbounded: dropping a
/// membership notification would desynchronize the registry.
#[derive(Debug)]
pub struct EventSubscription {
    receiver: mpsc::UnboundedReceiver<EngineEvent>,
}

impl EventSubscription {
    /// Create a connected sender/subscription pair. Engines keep the sender
    /// and push from their callbacks.
    #[must_use]
    pub fn channel() -> (mpsc::UnboundedSender<EngineEvent>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { receiver })
    }

    /// Wait for the next notification. `None` once the engine dropped its
    /// sender or the subscription was closed.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        self.receiver.recv().await
    }

    /// Stop accepting notifications. Already queued events are discarded.
    pub fn close(&mut self) {
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
    }
}

/// Operations the coordinator needs from the media SDK.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Join the channel described by `binding` using `token`.
    async fn join(
        &self,
        app_id: &str,
        token: &SecretString,
        binding: &ChannelBinding,
    ) -> Result<(), EngineError>;

    /// Leave the current channel.
    async fn leave(&self) -> Result<(), EngineError>;

    /// Change the local publish permission.
    async fn set_client_role(&self, role: ClientRole) -> Result<(), EngineError>;

    /// Open the camera or microphone.
    async fn create_local_track(&self, kind: MediaKind) -> Result<TrackHandle, EngineError>;

    async fn publish(&self, track: &TrackHandle) -> Result<(), EngineError>;

    async fn unpublish(&self, track: &TrackHandle) -> Result<(), EngineError>;

    /// Stop capture/playback for a local track. Must precede `close_track`.
    fn stop_track(&self, track: &TrackHandle) -> Result<(), EngineError>;

    /// Release the device behind a local track.
    fn close_track(&self, track: &TrackHandle) -> Result<(), EngineError>;

    /// Subscribe to a remote participant's media. The returned handle may be
    /// `None` when the payload is not retrievable yet.
    async fn subscribe(&self, uid: &Uid, kind: MediaKind)
        -> Result<Option<TrackHandle>, EngineError>;

    /// Kinds the engine already reports as published by `uid`.
    fn remote_published_kinds(&self, uid: &Uid) -> Vec<MediaKind>;

    /// Current payload for a subscribed remote track, if retrievable.
    fn remote_track(&self, uid: &Uid, kind: MediaKind) -> Option<TrackHandle>;

    /// Register a listener for membership notifications.
    fn events(&self) -> EventSubscription;

    /// Drop every listener registered through [`MediaEngine::events`].
    fn remove_all_listeners(&self);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_delivers_in_order() {
        let (sender, mut subscription) = EventSubscription::channel();
        sender
            .send(EngineEvent::UserJoined {
                uid: Uid::from("t1"),
            })
            .unwrap();
        sender
            .send(EngineEvent::UserPublished {
                uid: Uid::from("t1"),
                kind: MediaKind::Video,
            })
            .unwrap();

        assert_eq!(subscription.recv().await.unwrap().as_str(), "user_joined");
        assert_eq!(
            subscription.recv().await.unwrap().as_str(),
            "user_published"
        );
    }

    #[tokio::test]
    async fn test_closed_subscription_rejects_new_events() {
        let (sender, mut subscription) = EventSubscription::channel();
        sender
            .send(EngineEvent::UserLeft {
                uid: Uid::from("s1"),
            })
            .unwrap();

        subscription.close();

        assert!(sender
            .send(EngineEvent::UserJoined {
                uid: Uid::from("s2")
            })
            .is_err());
        assert!(subscription.recv().await.is_none());
    }

    #[test]
    fn test_device_failure_classification() {
        assert!(EngineError::DevicePermission("camera".to_string()).is_device_failure());
        assert!(EngineError::DeviceUnavailable("busy".to_string()).is_device_failure());
        assert!(!EngineError::Rejected("role".to_string()).is_device_failure());
    }
}
