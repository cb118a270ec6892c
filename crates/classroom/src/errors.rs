//! Classroom coordinator error types.
//!
//! Errors map to stable numeric codes for the UI layer. Internal details are
//! logged but never returned through `client_message`.

use crate::models::MediaKind;
use thiserror::Error;

/// Classroom coordinator error type.
///
/// Codes:
/// - `Credential`: `UNAUTHORIZED` (2)
/// - `AccessDenied`: `FORBIDDEN` (3)
/// - `NoActiveSession`, `SessionNotFound`: `NOT_FOUND` (4)
/// - `NotJoined`: `INVALID_STATE` (5)
/// - `Join`, `Store`, `Config`, `Internal`: `INTERNAL_ERROR` (6)
/// - `Device`, `Publish`, `Subscribe`, `BindTimeout`: `MEDIA_ERROR` (8)
#[derive(Debug, Error)]
pub enum ClassroomError {
    /// Actor is neither the owning teacher nor an enrolled student.
    #[error("Access denied")]
    AccessDenied,

    /// Student tried to join a course with no live session.
    #[error("No active session for course")]
    NoActiveSession,

    /// Token issuer failed or rejected the request.
    #[error("Credential error: {0}")]
    Credential(String),

    /// Media engine rejected the channel join.
    #[error("Join error: {0}")]
    Join(String),

    /// Camera or microphone unavailable.
    #[error("Device error ({kind}): {reason}")]
    Device { kind: MediaKind, reason: String },

    /// Engine rejected a publish or role change.
    #[error("Publish error: {0}")]
    Publish(String),

    /// Engine rejected a remote subscription.
    #[error("Subscribe error: {0}")]
    Subscribe(String),

    /// Render binder exhausted its attempts.
    #[error("Bind timeout for {target} ({kind}) after {attempts} attempts")]
    BindTimeout {
        target: String,
        kind: MediaKind,
        attempts: u32,
    },

    /// Session id unknown to the store.
    #[error("Session not found")]
    SessionNotFound,

    /// Media command issued before join completed or after leave.
    #[error("Not joined to a classroom channel")]
    NotJoined,

    /// Persistence failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (actor mailbox closed, response dropped).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClassroomError {
    /// Returns the numeric code for this error.
    pub fn error_code(&self) -> i32 {
        match self {
            ClassroomError::Credential(_) => 2, // UNAUTHORIZED
            ClassroomError::AccessDenied => 3,  // FORBIDDEN
            ClassroomError::NoActiveSession | ClassroomError::SessionNotFound => 4, // NOT_FOUND
            ClassroomError::NotJoined => 5,     // INVALID_STATE
            ClassroomError::Join(_)
            | ClassroomError::Store(_)
            | ClassroomError::Config(_)
            | ClassroomError::Internal(_) => 6, // INTERNAL_ERROR
            ClassroomError::Device { .. }
            | ClassroomError::Publish(_)
            | ClassroomError::Subscribe(_)
            | ClassroomError::BindTimeout { .. } => 8, // MEDIA_ERROR
        }
    }

    /// Whether this error aborts the join flow.
    ///
    /// Per-track media failures are contained to the participant and never
    /// end the classroom.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ClassroomError::Device { .. }
                | ClassroomError::Publish(_)
                | ClassroomError::Subscribe(_)
                | ClassroomError::BindTimeout { .. }
                | ClassroomError::NotJoined
        )
    }

    /// Short label for metrics (bounded cardinality).
    pub fn label(&self) -> &'static str {
        match self {
            ClassroomError::AccessDenied => "access_denied",
            ClassroomError::NoActiveSession => "no_active_session",
            ClassroomError::Credential(_) => "credential",
            ClassroomError::Join(_) => "join",
            ClassroomError::Device { .. } => "device",
            ClassroomError::Publish(_) => "publish",
            ClassroomError::Subscribe(_) => "subscribe",
            ClassroomError::BindTimeout { .. } => "bind_timeout",
            ClassroomError::SessionNotFound => "session_not_found",
            ClassroomError::NotJoined => "not_joined",
            ClassroomError::Store(_) => "store",
            ClassroomError::Config(_) => "config",
            ClassroomError::Internal(_) => "internal",
        }
    }

    /// Returns a user-safe message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            ClassroomError::AccessDenied => "You do not have access to this classroom".to_string(),
            ClassroomError::NoActiveSession => {
                "The teacher has not started this classroom yet".to_string()
            }
            ClassroomError::Credential(_) => {
                "Could not obtain classroom credentials, please try again".to_string()
            }
            ClassroomError::Join(_) => "Could not connect to the classroom".to_string(),
            ClassroomError::Device { kind, .. } => match kind {
                MediaKind::Audio => "Microphone is unavailable".to_string(),
                MediaKind::Video => "Camera is unavailable".to_string(),
            },
            ClassroomError::Publish(_) => "Could not share your media".to_string(),
            ClassroomError::Subscribe(_) | ClassroomError::BindTimeout { .. } => {
                "Some participant media could not be displayed".to_string()
            }
            ClassroomError::SessionNotFound => "Classroom not found".to_string(),
            ClassroomError::NotJoined => "You are not connected to the classroom".to_string(),
            ClassroomError::Store(_) | ClassroomError::Config(_) | ClassroomError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(ClassroomError::Credential("401".to_string()).error_code(), 2);
        assert_eq!(ClassroomError::AccessDenied.error_code(), 3);
        assert_eq!(ClassroomError::NoActiveSession.error_code(), 4);
        assert_eq!(ClassroomError::SessionNotFound.error_code(), 4);
        assert_eq!(ClassroomError::NotJoined.error_code(), 5);
        assert_eq!(ClassroomError::Store("down".to_string()).error_code(), 6);
        assert_eq!(ClassroomError::Join("rejected".to_string()).error_code(), 6);
        assert_eq!(
            ClassroomError::Device {
                kind: MediaKind::Video,
                reason: "denied".to_string()
            }
            .error_code(),
            8
        );
        assert_eq!(
            ClassroomError::BindTimeout {
                target: "local".to_string(),
                kind: MediaKind::Video,
                attempts: 5
            }
            .error_code(),
            8
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ClassroomError::AccessDenied.is_fatal());
        assert!(ClassroomError::NoActiveSession.is_fatal());
        assert!(ClassroomError::Credential("timeout".to_string()).is_fatal());
        assert!(!ClassroomError::Publish("rejected".to_string()).is_fatal());
        assert!(!ClassroomError::Subscribe("rejected".to_string()).is_fatal());
        assert!(!ClassroomError::Device {
            kind: MediaKind::Audio,
            reason: "busy".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let store_err = ClassroomError::Store("connection refused at 10.0.0.7:5432".to_string());
        assert!(!store_err.client_message().contains("10.0.0.7"));
        assert_eq!(store_err.client_message(), "An internal error occurred");

        let credential_err = ClassroomError::Credential("issuer returned 401".to_string());
        assert!(!credential_err.client_message().contains("401"));
    }

    #[test]
    fn test_access_denied_does_not_say_which_check_failed() {
        let message = ClassroomError::AccessDenied.client_message();
        assert!(!message.contains("enroll"));
        assert!(!message.contains("owner"));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!(
                "{}",
                ClassroomError::Device {
                    kind: MediaKind::Video,
                    reason: "permission denied".to_string()
                }
            ),
            "Device error (video): permission denied"
        );
        assert_eq!(
            format!("{}", ClassroomError::Store("timeout".to_string())),
            "Store error: timeout"
        );
    }
}
