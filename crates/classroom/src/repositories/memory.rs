//! In-process stores.
//!
//! Same contracts as the Postgres implementations, including one live
//! session per course. Both stores can be switched to fail every call to
//! exercise error paths.

use super::{CourseDirectory, SessionStore};
use crate::errors::ClassroomError;
use crate::models::{Session, SessionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{CourseId, SessionId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn unavailable() -> ClassroomError {
    ClassroomError::Store("store unavailable".to_string())
}

#[derive(Default)]
struct SessionTable {
    sessions: HashMap<SessionId, Session>,
    /// Inserted just before the next `insert_live`, simulating a concurrent
    /// creator winning the race.
    competitor: Option<Session>,
}

impl SessionTable {
    fn live_for(&self, course_id: CourseId) -> Option<&Session> {
        self.sessions
            .values()
            .find(|s| s.course_id == course_id && s.is_live())
    }
}

/// In-memory [`SessionStore`].
#[derive(Default)]
pub struct InMemorySessionStore {
    table: Mutex<SessionTable>,
    failing: AtomicBool,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> Result<MutexGuard<'_, SessionTable>, ClassroomError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.table.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Make every call fail with a store error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Have `session` appear right before the next insert.
    pub fn race_next_insert(&self, session: Session) {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .competitor = Some(session);
    }

    /// Number of stored sessions, live or ended.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sessions
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn find_live(&self, course_id: CourseId) -> Result<Option<Session>, ClassroomError> {
        Ok(self.table()?.live_for(course_id).cloned())
    }

    async fn insert_live(&self, session: &Session) -> Result<bool, ClassroomError> {
        let mut table = self.table()?;
        if let Some(competitor) = table.competitor.take() {
            table.sessions.insert(competitor.id, competitor);
        }
        if table.live_for(session.course_id).is_some() {
            return Ok(false);
        }
        table.sessions.insert(session.id, session.clone());
        Ok(true)
    }

    async fn get(&self, session_id: SessionId) -> Result<Option<Session>, ClassroomError> {
        Ok(self.table()?.sessions.get(&session_id).cloned())
    }

    async fn mark_ended(
        &self,
        session_id: SessionId,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<Session>, ClassroomError> {
        let mut table = self.table()?;
        Ok(table.sessions.get_mut(&session_id).map(|session| {
            session.status = SessionStatus::Ended;
            session.ended_at = session.ended_at.or(Some(ended_at));
            session.clone()
        }))
    }
}

#[derive(Default)]
struct CourseTable {
    owners: HashMap<CourseId, UserId>,
    enrollments: HashSet<(CourseId, UserId)>,
    live: HashSet<CourseId>,
}

/// In-memory [`CourseDirectory`].
#[derive(Default)]
pub struct InMemoryCourseDirectory {
    table: Mutex<CourseTable>,
    failing: AtomicBool,
}

impl InMemoryCourseDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> Result<MutexGuard<'_, CourseTable>, ClassroomError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.table.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn table_unchecked(&self) -> MutexGuard<'_, CourseTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_course(&self, course_id: CourseId, teacher_id: UserId) {
        self.table_unchecked().owners.insert(course_id, teacher_id);
    }

    pub fn enroll(&self, course_id: CourseId, student_id: UserId) {
        self.table_unchecked()
            .enrollments
            .insert((course_id, student_id));
    }

    #[must_use]
    pub fn is_live(&self, course_id: CourseId) -> bool {
        self.table_unchecked().live.contains(&course_id)
    }

    /// Make every call fail with a store error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CourseDirectory for InMemoryCourseDirectory {
    async fn is_owner(&self, course_id: CourseId, user_id: UserId) -> Result<bool, ClassroomError> {
        Ok(self.table()?.owners.get(&course_id) == Some(&user_id))
    }

    async fn is_enrolled(
        &self,
        course_id: CourseId,
        user_id: UserId,
    ) -> Result<bool, ClassroomError> {
        Ok(self.table()?.enrollments.contains(&(course_id, user_id)))
    }

    async fn set_live(&self, course_id: CourseId, live: bool) -> Result<(), ClassroomError> {
        let mut table = self.table()?;
        if live {
            table.live.insert(course_id);
        } else {
            table.live.remove(&course_id);
        }
        Ok(())
    }
}
