//! Persistence seams for the classroom coordinator.
//!
//! The session lifecycle manager is the only writer of session records.
//! Courses and enrollments belong to the marketplace backend; the coordinator
//! only reads ownership/enrollment and flips the course's live flag.
//!
//! - [`sessions::PgSessionStore`], [`courses::PgCourseDirectory`]: Postgres
//! - [`memory`]: in-process stores for tests and local runs

pub mod courses;
pub mod memory;
pub mod sessions;

pub use courses::PgCourseDirectory;
pub use memory::{InMemoryCourseDirectory, InMemorySessionStore};
pub use sessions::PgSessionStore;

use crate::errors::ClassroomError;
use crate::models::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::config::DatabaseConfig;
use common::secret::ExposeSecret;
use common::types::{CourseId, SessionId, UserId};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{error, info};

/// Pool acquire timeout in seconds.
const DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;

/// Open the Postgres pool and apply pending migrations.
///
/// # Errors
///
/// `ClassroomError::Store` if the database is unreachable or a migration
/// fails.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, ClassroomError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(DB_ACQUIRE_TIMEOUT_SECS))
        .connect(config.postgres_url.expose_secret())
        .await
        .map_err(|e| {
            error!(target: "classroom.repo", error = %e, "Failed to connect to database");
            ClassroomError::Store(format!("connect: {e}"))
        })?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            error!(target: "classroom.repo", error = %e, "Migration failed");
            ClassroomError::Store(format!("migrate: {e}"))
        })?;

    info!(
        target: "classroom.repo",
        max_connections = config.max_connections,
        "Database pool ready"
    );
    Ok(pool)
}

/// Session record persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The live session for a course, if any.
    async fn find_live(&self, course_id: CourseId) -> Result<Option<Session>, ClassroomError>;

    /// Insert a live session. Returns `false` without writing when the
    /// course already has one.
    async fn insert_live(&self, session: &Session) -> Result<bool, ClassroomError>;

    async fn get(&self, session_id: SessionId) -> Result<Option<Session>, ClassroomError>;

    /// Set status to ended. An existing `ended_at` is preserved.
    /// Returns the updated record, `None` if the id is unknown.
    async fn mark_ended(
        &self,
        session_id: SessionId,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<Session>, ClassroomError>;
}

/// Course ownership, enrollment and live flag.
#[async_trait]
pub trait CourseDirectory: Send + Sync {
    async fn is_owner(&self, course_id: CourseId, user_id: UserId) -> Result<bool, ClassroomError>;

    async fn is_enrolled(
        &self,
        course_id: CourseId,
        user_id: UserId,
    ) -> Result<bool, ClassroomError>;

    async fn set_live(&self, course_id: CourseId, live: bool) -> Result<(), ClassroomError>;
}
