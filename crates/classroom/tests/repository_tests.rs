//! Postgres session store and course directory.
//!
//! Each test gets a fresh database with the workspace migrations applied.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use classroom::models::{Session, SessionStatus};
use classroom::repositories::{CourseDirectory, PgCourseDirectory, PgSessionStore, SessionStore};
use common::types::{CourseId, SessionId, UserId};
use sqlx::PgPool;

async fn insert_course(pool: &PgPool, teacher_id: UserId) -> Result<CourseId, anyhow::Error> {
    let course_id = CourseId::new();
    sqlx::query("INSERT INTO courses (course_id, teacher_id) VALUES ($1, $2)")
        .bind(course_id.0)
        .bind(teacher_id.0)
        .execute(pool)
        .await?;
    Ok(course_id)
}

async fn enroll(
    pool: &PgPool,
    course_id: CourseId,
    student_id: UserId,
) -> Result<(), anyhow::Error> {
    sqlx::query("INSERT INTO enrollments (course_id, student_id) VALUES ($1, $2)")
        .bind(course_id.0)
        .bind(student_id.0)
        .execute(pool)
        .await?;
    Ok(())
}

async fn course_is_live(pool: &PgPool, course_id: CourseId) -> Result<bool, anyhow::Error> {
    let live: bool = sqlx::query_scalar("SELECT is_live FROM courses WHERE course_id = $1")
        .bind(course_id.0)
        .fetch_one(pool)
        .await?;
    Ok(live)
}

/// Whole seconds so the value survives Postgres microsecond precision.
fn started_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap()
}

fn live_session(course_id: CourseId, teacher_id: UserId) -> Session {
    Session {
        id: SessionId::new(),
        course_id,
        teacher_id,
        channel_name: format!("course_{}_{}", course_id.0, started_at().timestamp_millis()),
        status: SessionStatus::Live,
        started_at: started_at(),
        ended_at: None,
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_insert_live_then_find_live(pool: PgPool) -> Result<(), anyhow::Error> {
    let teacher = UserId::new();
    let course_id = insert_course(&pool, teacher).await?;
    let store = PgSessionStore::new(pool);
    let session = live_session(course_id, teacher);

    assert!(store.insert_live(&session).await?);

    let found = store.find_live(course_id).await?;
    assert_eq!(found, Some(session.clone()));
    assert_eq!(store.get(session.id).await?, Some(session));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_second_live_session_is_not_inserted(pool: PgPool) -> Result<(), anyhow::Error> {
    let teacher = UserId::new();
    let course_id = insert_course(&pool, teacher).await?;
    let store = PgSessionStore::new(pool);
    let first = live_session(course_id, teacher);
    let second = live_session(course_id, teacher);

    assert!(store.insert_live(&first).await?);
    assert!(!store.insert_live(&second).await?);

    let found = store.find_live(course_id).await?.unwrap();
    assert_eq!(found.id, first.id);
    assert!(store.get(second.id).await?.is_none());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_mark_ended_twice_keeps_first_end_time(pool: PgPool) -> Result<(), anyhow::Error> {
    let teacher = UserId::new();
    let course_id = insert_course(&pool, teacher).await?;
    let store = PgSessionStore::new(pool);
    let session = live_session(course_id, teacher);
    store.insert_live(&session).await?;
    let first_end = started_at() + Duration::minutes(45);

    let ended = store.mark_ended(session.id, first_end).await?.unwrap();
    let again = store
        .mark_ended(session.id, first_end + Duration::minutes(5))
        .await?
        .unwrap();

    assert_eq!(ended.status, SessionStatus::Ended);
    assert_eq!(ended.ended_at, Some(first_end));
    assert_eq!(again.ended_at, Some(first_end));
    assert!(store.find_live(course_id).await?.is_none());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_new_live_session_allowed_after_end(pool: PgPool) -> Result<(), anyhow::Error> {
    let teacher = UserId::new();
    let course_id = insert_course(&pool, teacher).await?;
    let store = PgSessionStore::new(pool);
    let first = live_session(course_id, teacher);
    store.insert_live(&first).await?;
    store
        .mark_ended(first.id, started_at() + Duration::hours(1))
        .await?;

    let second = live_session(course_id, teacher);
    assert!(store.insert_live(&second).await?);

    assert_eq!(store.find_live(course_id).await?.unwrap().id, second.id);
    // Ended record is kept
    assert_eq!(
        store.get(first.id).await?.unwrap().status,
        SessionStatus::Ended
    );

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_mark_ended_unknown_session(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = PgSessionStore::new(pool);

    let result = store.mark_ended(SessionId::new(), started_at()).await?;

    assert!(result.is_none());

    Ok(())
}

// ============================================================================
// Courses
// ============================================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_ownership_and_enrollment(pool: PgPool) -> Result<(), anyhow::Error> {
    let teacher = UserId::new();
    let student = UserId::new();
    let outsider = UserId::new();
    let course_id = insert_course(&pool, teacher).await?;
    enroll(&pool, course_id, student).await?;
    let directory = PgCourseDirectory::new(pool);

    assert!(directory.is_owner(course_id, teacher).await?);
    assert!(!directory.is_owner(course_id, student).await?);
    assert!(directory.is_enrolled(course_id, student).await?);
    assert!(!directory.is_enrolled(course_id, outsider).await?);
    assert!(!directory.is_enrolled(course_id, teacher).await?);
    assert!(!directory.is_owner(CourseId::new(), teacher).await?);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_set_live_flips_course_flag(pool: PgPool) -> Result<(), anyhow::Error> {
    let course_id = insert_course(&pool, UserId::new()).await?;
    let directory = PgCourseDirectory::new(pool.clone());
    assert!(!course_is_live(&pool, course_id).await?);

    directory.set_live(course_id, true).await?;
    assert!(course_is_live(&pool, course_id).await?);

    directory.set_live(course_id, false).await?;
    assert!(!course_is_live(&pool, course_id).await?);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_closed_pool_maps_to_store_error(pool: PgPool) -> Result<(), anyhow::Error> {
    let teacher = UserId::new();
    let course_id = insert_course(&pool, teacher).await?;
    let directory = PgCourseDirectory::new(pool.clone());
    let store = PgSessionStore::new(pool.clone());
    pool.close().await;

    assert!(matches!(
        directory.is_owner(course_id, teacher).await,
        Err(classroom::ClassroomError::Store(_))
    ));
    assert!(matches!(
        store.find_live(course_id).await,
        Err(classroom::ClassroomError::Store(_))
    ));

    Ok(())
}
