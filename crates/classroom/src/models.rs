//! Domain types shared by the coordinator components.

use chrono::{DateTime, Utc};
use common::types::{CourseId, SessionId, Uid, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Persisted status of a classroom session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Teacher has started the classroom; participants may join.
    Live,
    /// Classroom is over. Terminal.
    Ended,
}

impl SessionStatus {
    /// Returns the status as stored in the database.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Live => "live",
            SessionStatus::Ended => "ended",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(SessionStatus::Live),
            "ended" => Ok(SessionStatus::Ended),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// One live-classroom instance tied to a course and its teacher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub course_id: CourseId,
    pub teacher_id: UserId,
    pub channel_name: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Whether the session is still accepting participants.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.status == SessionStatus::Live
    }
}

/// Marketplace role of the user opening a classroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Teacher,
    Student,
}

impl ActorRole {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Teacher => "teacher",
            ActorRole::Student => "student",
        }
    }
}

/// The user opening a classroom view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Actor {
    pub user_id: UserId,
    pub role: ActorRole,
}

impl Actor {
    #[must_use]
    pub fn teacher(user_id: UserId) -> Self {
        Self {
            user_id,
            role: ActorRole::Teacher,
        }
    }

    #[must_use]
    pub fn student(user_id: UserId) -> Self {
        Self {
            user_id,
            role: ActorRole::Student,
        }
    }

    #[must_use]
    pub fn is_teacher(&self) -> bool {
        self.role == ActorRole::Teacher
    }
}

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Both kinds, audio first.
    pub const ALL: [MediaKind; 2] = [MediaKind::Audio, MediaKind::Video];

    /// Returns the kind as a metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel role controlling whether the local participant may publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// May publish local tracks.
    Presenter,
    /// Subscribe-only.
    Listener,
}

impl ClientRole {
    /// Wire value understood by the token issuer (1 = publisher, 2 = subscriber).
    #[must_use]
    pub const fn token_role(&self) -> u8 {
        match self {
            ClientRole::Presenter => 1,
            ClientRole::Listener => 2,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ClientRole::Presenter => "presenter",
            ClientRole::Listener => "listener",
        }
    }
}

/// Availability of a remote track, from notification to confirmed playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackAvailability {
    /// Engine reported the publish; payload may not be retrievable yet.
    Announced,
    /// Payload retrievable and surface ready; playback requested.
    Bound,
    /// Playback confirmed.
    Playing,
}

/// The (channel, uid, role) tuple handed to both the token issuer and the
/// engine join call. Building it once keeps the two consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBinding {
    pub channel_name: String,
    pub uid: Uid,
    pub role: ClientRole,
}
