//! Postgres session store.
//!
//! # Security
//!
//! - All queries use parameterized statements
//! - One live session per course is enforced by the
//!   `classroom_sessions_one_live_per_course` partial unique index; inserts
//!   use `ON CONFLICT DO NOTHING` so a lost race is not an error

use super::SessionStore;
use crate::errors::ClassroomError;
use crate::models::{Session, SessionStatus};
use crate::observability::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{CourseId, SessionId, UserId};
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;

const SESSION_COLUMNS: &str =
    "session_id, course_id, teacher_id, channel_name, status, started_at, ended_at";

/// Session store backed by the `classroom_sessions` table.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Time a query and map its error.
async fn timed<T, F>(operation: &str, query: F) -> Result<T, ClassroomError>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    let start = Instant::now();
    match query.await {
        Ok(value) => {
            metrics::record_db_query(operation, "success", start.elapsed());
            Ok(value)
        }
        Err(e) => {
            metrics::record_db_query(operation, "error", start.elapsed());
            tracing::error!(target: "classroom.repo", operation, error = %e, "Query failed");
            Err(ClassroomError::Store(e.to_string()))
        }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    #[instrument(skip_all, name = "classroom.repo.find_live", fields(course_id = %course_id))]
    async fn find_live(&self, course_id: CourseId) -> Result<Option<Session>, ClassroomError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM classroom_sessions \
             WHERE course_id = $1 AND status = 'live'"
        );
        let row = timed(
            "find_live_session",
            sqlx::query(&sql)
                .bind(course_id.0)
                .fetch_optional(&self.pool),
        )
        .await?;
        row.map(map_row_to_session).transpose()
    }

    #[instrument(skip_all, name = "classroom.repo.insert_live", fields(session_id = %session.id))]
    async fn insert_live(&self, session: &Session) -> Result<bool, ClassroomError> {
        let result = timed(
            "insert_live_session",
            sqlx::query(
                r#"
                INSERT INTO classroom_sessions (
                    session_id, course_id, teacher_id, channel_name, status, started_at
                )
                VALUES ($1, $2, $3, $4, 'live', $5)
                ON CONFLICT (course_id) WHERE status = 'live' DO NOTHING
                "#,
            )
            .bind(session.id.0)
            .bind(session.course_id.0)
            .bind(session.teacher_id.0)
            .bind(&session.channel_name)
            .bind(session.started_at)
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip_all, name = "classroom.repo.get", fields(session_id = %session_id))]
    async fn get(&self, session_id: SessionId) -> Result<Option<Session>, ClassroomError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM classroom_sessions WHERE session_id = $1");
        let row = timed(
            "get_session",
            sqlx::query(&sql)
                .bind(session_id.0)
                .fetch_optional(&self.pool),
        )
        .await?;
        row.map(map_row_to_session).transpose()
    }

    #[instrument(skip_all, name = "classroom.repo.mark_ended", fields(session_id = %session_id))]
    async fn mark_ended(
        &self,
        session_id: SessionId,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<Session>, ClassroomError> {
        let sql = format!(
            "UPDATE classroom_sessions \
             SET status = 'ended', ended_at = COALESCE(ended_at, $2) \
             WHERE session_id = $1 \
             RETURNING {SESSION_COLUMNS}"
        );
        let row = timed(
            "mark_session_ended",
            sqlx::query(&sql)
                .bind(session_id.0)
                .bind(ended_at)
                .fetch_optional(&self.pool),
        )
        .await?;
        row.map(map_row_to_session).transpose()
    }
}

/// Map a `classroom_sessions` row.
fn map_row_to_session(row: sqlx::postgres::PgRow) -> Result<Session, ClassroomError> {
    let status: String = row.get("status");
    Ok(Session {
        id: SessionId(row.get("session_id")),
        course_id: CourseId(row.get("course_id")),
        teacher_id: UserId(row.get("teacher_id")),
        channel_name: row.get("channel_name"),
        status: status
            .parse::<SessionStatus>()
            .map_err(ClassroomError::Store)?,
        started_at: row.get("started_at"),
        ended_at: row.get("ended_at"),
    })
}
