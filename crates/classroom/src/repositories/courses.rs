//! Postgres course directory.

use super::CourseDirectory;
use crate::errors::ClassroomError;
use crate::observability::metrics;
use async_trait::async_trait;
use common::types::{CourseId, UserId};
use sqlx::PgPool;
use std::time::Instant;
use tracing::instrument;

/// Reads `courses` and `enrollments`, writes `courses.is_live`.
#[derive(Clone)]
pub struct PgCourseDirectory {
    pool: PgPool,
}

impl PgCourseDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(
        &self,
        operation: &str,
        sql: &str,
        course_id: CourseId,
        user_id: UserId,
    ) -> Result<bool, ClassroomError> {
        let start = Instant::now();
        let found: Option<i32> = sqlx::query_scalar(sql)
            .bind(course_id.0)
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                metrics::record_db_query(operation, "error", start.elapsed());
                ClassroomError::Store(e.to_string())
            })?;
        metrics::record_db_query(operation, "success", start.elapsed());
        Ok(found.is_some())
    }
}

#[async_trait]
impl CourseDirectory for PgCourseDirectory {
    #[instrument(skip_all, name = "classroom.repo.is_owner", fields(course_id = %course_id))]
    async fn is_owner(&self, course_id: CourseId, user_id: UserId) -> Result<bool, ClassroomError> {
        self.exists(
            "course_is_owner",
            "SELECT 1 FROM courses WHERE course_id = $1 AND teacher_id = $2",
            course_id,
            user_id,
        )
        .await
    }

    #[instrument(skip_all, name = "classroom.repo.is_enrolled", fields(course_id = %course_id))]
    async fn is_enrolled(
        &self,
        course_id: CourseId,
        user_id: UserId,
    ) -> Result<bool, ClassroomError> {
        self.exists(
            "course_is_enrolled",
            "SELECT 1 FROM enrollments WHERE course_id = $1 AND student_id = $2",
            course_id,
            user_id,
        )
        .await
    }

    #[instrument(skip_all, name = "classroom.repo.set_live", fields(course_id = %course_id, live = live))]
    async fn set_live(&self, course_id: CourseId, live: bool) -> Result<(), ClassroomError> {
        let start = Instant::now();
        sqlx::query("UPDATE courses SET is_live = $2, updated_at = NOW() WHERE course_id = $1")
            .bind(course_id.0)
            .bind(live)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                metrics::record_db_query("course_set_live", "error", start.elapsed());
                ClassroomError::Store(e.to_string())
            })?;
        metrics::record_db_query("course_set_live", "success", start.elapsed());
        Ok(())
    }
}
