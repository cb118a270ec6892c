//! Messages for the classroom task.
//!
//! Commands arrive over `tokio::sync::mpsc`; replies use
//! `tokio::sync::oneshot` for request-reply semantics.

use super::binder::SurfaceKey;
use super::cleanup::TeardownReport;
use super::registry::RemoteParticipant;
use crate::errors::ClassroomError;
use crate::models::{ActorRole, ClientRole, MediaKind};
use common::types::{SessionId, Uid};
use serde::Serialize;
use tokio::sync::oneshot;

/// Messages sent to `ClassroomActor`.
#[derive(Debug)]
pub enum ClassroomMessage {
    /// Flip camera or microphone. Replies with the new enabled state.
    ToggleMedia {
        kind: MediaKind,
        respond_to: oneshot::Sender<Result<bool, ClassroomError>>,
    },

    /// Idempotently enable or disable a medium.
    SetMedia {
        kind: MediaKind,
        enabled: bool,
        respond_to: oneshot::Sender<Result<bool, ClassroomError>>,
    },

    /// A render surface was mounted or resized.
    SurfaceMounted {
        surface: SurfaceKey,
        respond_to: oneshot::Sender<()>,
    },

    GetState {
        respond_to: oneshot::Sender<ClassroomState>,
    },

    /// Leave the classroom. Replies once teardown finished.
    Leave {
        respond_to: oneshot::Sender<TeardownReport>,
    },

    /// End the classroom for everyone (teacher only).
    StopClassroom {
        respond_to: oneshot::Sender<Result<TeardownReport, ClassroomError>>,
    },
}

impl ClassroomMessage {
    /// Reject a message that arrived after the classroom stopped.
    pub(crate) fn reject(self) {
        match self {
            ClassroomMessage::ToggleMedia { respond_to, .. }
            | ClassroomMessage::SetMedia { respond_to, .. } => {
                let _ = respond_to.send(Err(ClassroomError::NotJoined));
            }
            ClassroomMessage::StopClassroom { respond_to } => {
                let _ = respond_to.send(Err(ClassroomError::NotJoined));
            }
            // Dropping the sender surfaces as NotJoined on the handle side
            ClassroomMessage::SurfaceMounted { .. }
            | ClassroomMessage::GetState { .. }
            | ClassroomMessage::Leave { .. } => {}
        }
    }
}

/// Observable classroom state for the local participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassroomState {
    pub session_id: SessionId,
    pub channel_name: String,
    pub local_uid: Uid,
    pub actor_role: ActorRole,
    pub client_role: Option<ClientRole>,
    /// Local kinds currently published.
    pub published: Vec<MediaKind>,
    /// Local camera preview is rendering.
    pub local_preview_playing: bool,
    /// Remote participants sorted by uid.
    pub remote: Vec<RemoteParticipant>,
}
