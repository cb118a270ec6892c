//! Session lifecycle manager.
//!
//! Sole writer of session records. Side effects are limited to the session
//! record and the course's live flag.

use crate::config::DEFAULT_CHANNEL_PREFIX;
use crate::errors::ClassroomError;
use crate::models::{Actor, ActorRole, Session, SessionStatus};
use crate::observability::metrics;
use crate::repositories::{CourseDirectory, SessionStore};
use chrono::Utc;
use common::types::{CourseId, SessionId};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct SessionLifecycle {
    sessions: Arc<dyn SessionStore>,
    courses: Arc<dyn CourseDirectory>,
    channel_prefix: String,
}

impl SessionLifecycle {
    pub fn new(sessions: Arc<dyn SessionStore>, courses: Arc<dyn CourseDirectory>) -> Self {
        Self {
            sessions,
            courses,
            channel_prefix: DEFAULT_CHANNEL_PREFIX.to_string(),
        }
    }

    #[must_use]
    pub fn with_channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.channel_prefix = prefix.into();
        self
    }

    /// Return the live session for `course_id`, creating one when the actor
    /// is the owning teacher and none exists.
    ///
    /// # Errors
    ///
    /// - `NoActiveSession`: student and no live session
    /// - `AccessDenied`: teacher who does not own the course
    /// - `Store`: persistence failure
    #[instrument(
        skip_all,
        name = "classroom.lifecycle.resolve_or_create",
        fields(course_id = %course_id, role = actor.role.as_str())
    )]
    pub async fn resolve_or_create(
        &self,
        course_id: CourseId,
        actor: &Actor,
    ) -> Result<Session, ClassroomError> {
        if let Some(session) = self.sessions.find_live(course_id).await? {
            debug!(target: "classroom.lifecycle", session_id = %session.id, "Live session found");
            return Ok(session);
        }

        match actor.role {
            ActorRole::Student => return Err(ClassroomError::NoActiveSession),
            ActorRole::Teacher => {
                if !self.courses.is_owner(course_id, actor.user_id).await? {
                    warn!(target: "classroom.lifecycle", "Non-owner attempted to start classroom");
                    return Err(ClassroomError::AccessDenied);
                }
            }
        }

        let started_at = Utc::now();
        let session = Session {
            id: SessionId::new(),
            course_id,
            teacher_id: actor.user_id,
            channel_name: format!(
                "{}_{}_{}",
                self.channel_prefix,
                course_id,
                started_at.timestamp_millis()
            ),
            status: SessionStatus::Live,
            started_at,
            ended_at: None,
        };

        if !self.sessions.insert_live(&session).await? {
            // A concurrent creator won; join theirs
            debug!(target: "classroom.lifecycle", "Lost session creation race");
            return self
                .sessions
                .find_live(course_id)
                .await?
                .ok_or_else(|| {
                    ClassroomError::Store("live session vanished after conflict".to_string())
                });
        }

        self.courses.set_live(course_id, true).await?;
        metrics::record_session_transition("created");
        info!(
            target: "classroom.lifecycle",
            session_id = %session.id,
            channel = %session.channel_name,
            "Session started"
        );
        Ok(session)
    }

    /// Teacher must own the course; student must be enrolled.
    ///
    /// # Errors
    ///
    /// `AccessDenied` without saying which check failed, or `Store`.
    #[instrument(
        skip_all,
        name = "classroom.lifecycle.verify_access",
        fields(session_id = %session.id, role = actor.role.as_str())
    )]
    pub async fn verify_access(&self, session: &Session, actor: &Actor) -> Result<(), ClassroomError> {
        let allowed = match actor.role {
            ActorRole::Teacher => {
                self.courses
                    .is_owner(session.course_id, actor.user_id)
                    .await?
            }
            ActorRole::Student => {
                self.courses
                    .is_enrolled(session.course_id, actor.user_id)
                    .await?
            }
        };

        if allowed {
            Ok(())
        } else {
            warn!(target: "classroom.lifecycle", "Access denied");
            Err(ClassroomError::AccessDenied)
        }
    }

    /// End a session. Idempotent: an ended session is returned unchanged.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` or `Store`.
    #[instrument(skip_all, name = "classroom.lifecycle.end", fields(session_id = %session_id))]
    pub async fn end(&self, session_id: SessionId) -> Result<Session, ClassroomError> {
        let current = self.get(session_id).await?;
        if !current.is_live() {
            metrics::record_session_transition("already_ended");
            debug!(target: "classroom.lifecycle", "Session already ended");
            return Ok(current);
        }

        let ended = self
            .sessions
            .mark_ended(session_id, Utc::now())
            .await?
            .ok_or(ClassroomError::SessionNotFound)?;
        self.courses.set_live(ended.course_id, false).await?;

        metrics::record_session_transition("ended");
        info!(target: "classroom.lifecycle", course_id = %ended.course_id, "Session ended");
        Ok(ended)
    }

    /// Read the persisted record.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` or `Store`.
    pub async fn get(&self, session_id: SessionId) -> Result<Session, ClassroomError> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or(ClassroomError::SessionNotFound)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::repositories::{InMemoryCourseDirectory, InMemorySessionStore};
    use common::types::UserId;

    struct Fixture {
        sessions: Arc<InMemorySessionStore>,
        courses: Arc<InMemoryCourseDirectory>,
        lifecycle: SessionLifecycle,
        course: CourseId,
        teacher: Actor,
        student: Actor,
    }

    fn fixture() -> Fixture {
        let sessions = Arc::new(InMemorySessionStore::new());
        let courses = Arc::new(InMemoryCourseDirectory::new());
        let course = CourseId::new();
        let teacher = Actor::teacher(UserId::new());
        let student = Actor::student(UserId::new());
        courses.add_course(course, teacher.user_id);
        courses.enroll(course, student.user_id);
        let lifecycle = SessionLifecycle::new(sessions.clone(), courses.clone());
        Fixture {
            sessions,
            courses,
            lifecycle,
            course,
            teacher,
            student,
        }
    }

    #[tokio::test]
    async fn test_teacher_creates_live_session() {
        let f = fixture();

        let session = f
            .lifecycle
            .resolve_or_create(f.course, &f.teacher)
            .await
            .unwrap();

        assert!(session.is_live());
        assert_eq!(session.teacher_id, f.teacher.user_id);
        assert!(session
            .channel_name
            .starts_with(&format!("course_{}_", f.course)));
        let millis = session.channel_name.rsplit('_').next().unwrap();
        assert_eq!(
            millis.parse::<i64>().unwrap(),
            session.started_at.timestamp_millis()
        );
        assert!(f.courses.is_live(f.course));
    }

    #[tokio::test]
    async fn test_second_resolve_returns_same_session() {
        let f = fixture();
        let first = f
            .lifecycle
            .resolve_or_create(f.course, &f.teacher)
            .await
            .unwrap();

        let teacher_again = f
            .lifecycle
            .resolve_or_create(f.course, &f.teacher)
            .await
            .unwrap();
        let student = f
            .lifecycle
            .resolve_or_create(f.course, &f.student)
            .await
            .unwrap();

        assert_eq!(first.id, teacher_again.id);
        assert_eq!(first.id, student.id);
        assert_eq!(f.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_student_without_live_session() {
        let f = fixture();

        let result = f.lifecycle.resolve_or_create(f.course, &f.student).await;

        assert!(matches!(result, Err(ClassroomError::NoActiveSession)));
        assert!(f.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_non_owner_teacher_cannot_create() {
        let f = fixture();
        let stranger = Actor::teacher(UserId::new());

        let result = f.lifecycle.resolve_or_create(f.course, &stranger).await;

        assert!(matches!(result, Err(ClassroomError::AccessDenied)));
        assert!(!f.courses.is_live(f.course));
    }

    #[tokio::test]
    async fn test_lost_race_returns_winner() {
        let f = fixture();
        let winner = Session {
            id: SessionId::new(),
            course_id: f.course,
            teacher_id: f.teacher.user_id,
            channel_name: format!("course_{}_1", f.course),
            status: SessionStatus::Live,
            started_at: Utc::now(),
            ended_at: None,
        };
        f.sessions.race_next_insert(winner.clone());

        let session = f
            .lifecycle
            .resolve_or_create(f.course, &f.teacher)
            .await
            .unwrap();

        assert_eq!(session.id, winner.id);
        assert_eq!(f.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_verify_access() {
        let f = fixture();
        let session = f
            .lifecycle
            .resolve_or_create(f.course, &f.teacher)
            .await
            .unwrap();

        f.lifecycle.verify_access(&session, &f.teacher).await.unwrap();
        f.lifecycle.verify_access(&session, &f.student).await.unwrap();

        let outsider = Actor::student(UserId::new());
        let result = f.lifecycle.verify_access(&session, &outsider).await;
        assert!(matches!(result, Err(ClassroomError::AccessDenied)));

        let other_teacher = Actor::teacher(UserId::new());
        let result = f.lifecycle.verify_access(&session, &other_teacher).await;
        assert!(matches!(result, Err(ClassroomError::AccessDenied)));
    }

    #[tokio::test]
    async fn test_end_twice_matches_end_once() {
        let f = fixture();
        let session = f
            .lifecycle
            .resolve_or_create(f.course, &f.teacher)
            .await
            .unwrap();

        let once = f.lifecycle.end(session.id).await.unwrap();
        let twice = f.lifecycle.end(session.id).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(once.status, SessionStatus::Ended);
        assert!(once.ended_at.is_some());
        assert!(!f.courses.is_live(f.course));
        assert_eq!(f.lifecycle.get(session.id).await.unwrap(), once);
    }

    #[tokio::test]
    async fn test_end_unknown_session() {
        let f = fixture();
        let result = f.lifecycle.end(SessionId::new()).await;
        assert!(matches!(result, Err(ClassroomError::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_new_session_after_end_gets_fresh_channel() {
        let f = fixture();
        let first = f
            .lifecycle
            .resolve_or_create(f.course, &f.teacher)
            .await
            .unwrap();
        f.lifecycle.end(first.id).await.unwrap();

        let second = f
            .lifecycle
            .resolve_or_create(f.course, &f.teacher)
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert!(second.is_live());
    }

    #[tokio::test]
    async fn test_custom_channel_prefix() {
        let f = fixture();
        let lifecycle = SessionLifecycle::new(f.sessions.clone(), f.courses.clone())
            .with_channel_prefix("lesson");

        let session = lifecycle
            .resolve_or_create(f.course, &f.teacher)
            .await
            .unwrap();

        assert!(session.channel_name.starts_with("lesson_"));
    }
}
