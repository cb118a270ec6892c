//! Classroom test harness.
//!
//! Wires in-memory stores, a mock token issuer and one
//! [`MockMediaEngine`] per participant into [`ClassroomDeps`]. Each
//! participant gets its own engine and surfaces, as each would run its own
//! client; tests relay one participant's publishes into another's engine.

use crate::fixtures::TestCourse;
use crate::surfaces::RecordingSurfaces;
use classroom::coordinator::{BindPolicy, ClassroomState, TeardownReport};
use classroom::engine::mock::MockMediaEngine;
use classroom::models::{Actor, Session};
use classroom::repositories::{InMemoryCourseDirectory, InMemorySessionStore};
use classroom::services::token_issuer::mock::MockTokenIssuer;
use classroom::services::SessionLifecycle;
use classroom::{ClassroomActor, ClassroomDeps, ClassroomError, ClassroomHandle};
use common::types::Uid;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One joined participant with its own engine and surfaces.
pub struct TestParticipant {
    pub actor: Actor,
    pub uid: Uid,
    pub handle: ClassroomHandle,
    pub task: JoinHandle<TeardownReport>,
    pub media_errors: Vec<ClassroomError>,
    pub engine: Arc<MockMediaEngine>,
    pub surfaces: Arc<RecordingSurfaces>,
    pub cancel_token: CancellationToken,
}

impl TestParticipant {
    /// Current classroom state.
    ///
    /// # Panics
    ///
    /// If the classroom task has exited.
    pub async fn state(&self) -> ClassroomState {
        self.handle.get_state().await.unwrap()
    }
}

pub struct ClassroomHarness {
    pub course: TestCourse,
    pub sessions: Arc<InMemorySessionStore>,
    pub courses: Arc<InMemoryCourseDirectory>,
    pub lifecycle: Arc<SessionLifecycle>,
    pub tokens: Arc<MockTokenIssuer>,
    pub bind_policy: BindPolicy,
}

impl ClassroomHarness {
    /// Course with one enrolled student and an accepting token issuer.
    #[must_use]
    pub fn new() -> Self {
        Self::build(TestCourse::new(), MockTokenIssuer::accepting())
    }

    /// Token issuer that fails every request.
    #[must_use]
    pub fn with_failing_tokens(reason: &str) -> Self {
        Self::build(TestCourse::new(), MockTokenIssuer::failing(reason))
    }

    #[must_use]
    pub fn with_course(course: TestCourse) -> Self {
        Self::build(course, MockTokenIssuer::accepting())
    }

    fn build(course: TestCourse, tokens: MockTokenIssuer) -> Self {
        let sessions = Arc::new(InMemorySessionStore::new());
        let courses = Arc::new(InMemoryCourseDirectory::new());
        course.install(&courses);
        let lifecycle = Arc::new(SessionLifecycle::new(sessions.clone(), courses.clone()));
        Self {
            course,
            sessions,
            courses,
            lifecycle,
            tokens: Arc::new(tokens),
            bind_policy: BindPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_bind_policy(mut self, policy: BindPolicy) -> Self {
        self.bind_policy = policy;
        self
    }

    /// Deps for one participant.
    #[must_use]
    pub fn deps(
        &self,
        engine: Arc<MockMediaEngine>,
        surfaces: Arc<RecordingSurfaces>,
    ) -> ClassroomDeps {
        ClassroomDeps {
            lifecycle: self.lifecycle.clone(),
            tokens: self.tokens.clone(),
            engine,
            surfaces,
            bind_policy: self.bind_policy,
        }
    }

    /// Join with a fresh engine and a mounted local preview.
    ///
    /// # Errors
    ///
    /// Whatever [`ClassroomActor::join`] returns.
    pub async fn join(&self, actor: Actor) -> Result<TestParticipant, ClassroomError> {
        self.join_with(
            actor,
            Arc::new(MockMediaEngine::new()),
            Arc::new(RecordingSurfaces::with_local_preview()),
        )
        .await
    }

    /// Join with a caller-configured engine and surfaces.
    ///
    /// # Errors
    ///
    /// Whatever [`ClassroomActor::join`] returns.
    pub async fn join_with(
        &self,
        actor: Actor,
        engine: Arc<MockMediaEngine>,
        surfaces: Arc<RecordingSurfaces>,
    ) -> Result<TestParticipant, ClassroomError> {
        let cancel_token = CancellationToken::new();
        let joined = ClassroomActor::join(
            self.deps(engine.clone(), surfaces.clone()),
            self.course.course_id,
            actor,
            cancel_token.clone(),
        )
        .await?;

        Ok(TestParticipant {
            actor,
            uid: Uid::from(actor.user_id),
            handle: joined.handle,
            task: joined.task,
            media_errors: joined.media_errors,
            engine,
            surfaces,
            cancel_token,
        })
    }

    /// The live session for the course, if any.
    ///
    /// # Panics
    ///
    /// If the store fails.
    pub async fn live_session(&self) -> Option<Session> {
        match self
            .lifecycle
            .resolve_or_create(self.course.course_id, &TestCourse::outsider())
            .await
        {
            Ok(session) => Some(session),
            Err(ClassroomError::NoActiveSession) => None,
            Err(e) => panic!("store failed: {e}"),
        }
    }
}

impl Default for ClassroomHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Let spawned classroom tasks drain ready work. Use with a paused clock.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
