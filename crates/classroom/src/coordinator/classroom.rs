//! `ClassroomActor`: one task per joined classroom.
//!
//! The actor owns the role controller, the remote participant registry and
//! the render binder, and processes in a single `select!` loop:
//! - user commands (mailbox)
//! - engine notifications (registry subscription)
//! - render bind deadlines
//!
//! Engine calls are awaited inside the loop. Notifications arriving
//! meanwhile queue in the subscription, so handlers never interleave.
//!
//! The task ends on leave, teacher stop, cancellation, or when every
//! [`ClassroomHandle`] is dropped, and always runs teardown before exiting.

use super::binder::{
    BindOutcome, BindPolicy, BindState, BindTarget, RenderBinder, SurfaceHost, SurfaceKey,
    TrackSource,
};
use super::cleanup::{ChannelState, CleanupCoordinator, TeardownReport, TeardownTarget};
use super::messages::{ClassroomMessage, ClassroomState};
use super::registry::{RegistryChange, RemoteParticipantRegistry};
use super::role::{RoleController, RolePolicy};
use crate::config::Config;
use crate::engine::{EngineEvent, MediaEngine, TrackHandle};
use crate::errors::ClassroomError;
use crate::models::{Actor, ChannelBinding, MediaKind, Session, TrackAvailability};
use crate::observability::metrics;
use crate::repositories::{self, PgCourseDirectory, PgSessionStore};
use crate::services::{HttpTokenIssuer, SessionLifecycle, TokenIssuer};
use common::types::{CourseId, SessionId, Uid};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Mailbox capacity per classroom.
const CLASSROOM_CHANNEL_BUFFER: usize = 32;

/// Collaborators shared by every classroom.
#[derive(Clone)]
pub struct ClassroomDeps {
    pub lifecycle: Arc<SessionLifecycle>,
    pub tokens: Arc<dyn TokenIssuer>,
    pub engine: Arc<dyn MediaEngine>,
    pub surfaces: Arc<dyn SurfaceHost>,
    pub bind_policy: BindPolicy,
}

impl ClassroomDeps {
    /// Postgres stores and the HTTP token issuer configured by `config`.
    ///
    /// # Errors
    ///
    /// `Config` when no database is configured or the HTTP client cannot be
    /// built, `Store` when the database is unreachable.
    pub async fn from_config(
        config: &Config,
        engine: Arc<dyn MediaEngine>,
        surfaces: Arc<dyn SurfaceHost>,
    ) -> Result<Self, ClassroomError> {
        let database = config
            .database
            .as_ref()
            .ok_or_else(|| ClassroomError::Config("DATABASE_URL is not set".to_string()))?;
        let pool = repositories::connect(database).await?;

        let lifecycle = SessionLifecycle::new(
            Arc::new(PgSessionStore::new(pool.clone())),
            Arc::new(PgCourseDirectory::new(pool)),
        )
        .with_channel_prefix(config.channel_prefix.clone());

        Ok(Self {
            lifecycle: Arc::new(lifecycle),
            tokens: Arc::new(HttpTokenIssuer::from_config(config)?),
            engine,
            surfaces,
            bind_policy: config.bind_policy(),
        })
    }
}

/// A successfully joined classroom.
pub struct JoinedClassroom {
    pub handle: ClassroomHandle,
    /// Resolves with the teardown report once the classroom task exits.
    pub task: JoinHandle<TeardownReport>,
    /// Non-fatal media failures from joining (e.g. camera denied).
    pub media_errors: Vec<ClassroomError>,
}

/// Handle to a running classroom. Cheap to clone; dropping every clone
/// counts as navigating away.
#[derive(Clone, Debug)]
pub struct ClassroomHandle {
    sender: mpsc::Sender<ClassroomMessage>,
    cancel_token: CancellationToken,
    session_id: SessionId,
    channel_name: String,
}

impl ClassroomHandle {
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// Whether the classroom task has exited.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Cancel the classroom task. Teardown still runs.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ClassroomMessage,
    ) -> Result<T, ClassroomError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| ClassroomError::NotJoined)?;
        rx.await.map_err(|_| {
            // A stopped classroom drops queued replies after closing its mailbox
            if self.sender.is_closed() {
                ClassroomError::NotJoined
            } else {
                ClassroomError::Internal("classroom dropped the reply".to_string())
            }
        })
    }

    /// Flip camera or microphone. Returns the new enabled state.
    pub async fn toggle_media(&self, kind: MediaKind) -> Result<bool, ClassroomError> {
        self.request(|respond_to| ClassroomMessage::ToggleMedia { kind, respond_to })
            .await?
    }

    /// Idempotently enable or disable a medium. Returns the resulting state.
    pub async fn set_media(&self, kind: MediaKind, enabled: bool) -> Result<bool, ClassroomError> {
        self.request(|respond_to| ClassroomMessage::SetMedia {
            kind,
            enabled,
            respond_to,
        })
        .await?
    }

    /// Report that a render surface is mounted (or was resized).
    pub async fn surface_mounted(&self, surface: SurfaceKey) -> Result<(), ClassroomError> {
        self.request(|respond_to| ClassroomMessage::SurfaceMounted {
            surface,
            respond_to,
        })
        .await
    }

    pub async fn get_state(&self) -> Result<ClassroomState, ClassroomError> {
        self.request(|respond_to| ClassroomMessage::GetState { respond_to })
            .await
    }

    /// Leave the classroom and wait for teardown. A teacher leaving ends the
    /// session.
    pub async fn leave(&self) -> Result<TeardownReport, ClassroomError> {
        self.request(|respond_to| ClassroomMessage::Leave { respond_to })
            .await
    }

    /// End the classroom. Teacher only; students get `AccessDenied`.
    pub async fn stop_classroom(&self) -> Result<TeardownReport, ClassroomError> {
        self.request(|respond_to| ClassroomMessage::StopClassroom { respond_to })
            .await?
    }
}

/// Why the loop ended.
enum Exit {
    Leave(oneshot::Sender<TeardownReport>),
    Stop(oneshot::Sender<Result<TeardownReport, ClassroomError>>),
    HandlesDropped,
    Cancelled,
}

impl Exit {
    fn as_str(&self) -> &'static str {
        match self {
            Exit::Leave(_) => "leave",
            Exit::Stop(_) => "stop",
            Exit::HandlesDropped => "handles_dropped",
            Exit::Cancelled => "cancelled",
        }
    }
}

/// Current payloads for the binder: the local camera from the role
/// controller, remote tracks from the engine.
struct ClassroomTracks<'a> {
    role: &'a RoleController,
    engine: &'a dyn MediaEngine,
}

impl TrackSource for ClassroomTracks<'_> {
    fn track(&self, target: &BindTarget, kind: MediaKind) -> Option<TrackHandle> {
        match target {
            BindTarget::Local => self.role.local_track(kind).cloned(),
            BindTarget::Remote(uid) => self.engine.remote_track(uid, kind),
        }
    }
}

pub struct ClassroomActor {
    receiver: mpsc::Receiver<ClassroomMessage>,
    cancel_token: CancellationToken,
    session: Session,
    actor: Actor,
    local_uid: Uid,
    engine: Arc<dyn MediaEngine>,
    surfaces: Arc<dyn SurfaceHost>,
    role: RoleController,
    registry: RemoteParticipantRegistry,
    binder: RenderBinder,
    cleanup: CleanupCoordinator,
    /// Set for the owning teacher: teardown ends the session.
    owns_session: bool,
}

impl ClassroomActor {
    /// Open the classroom for `course_id` as `actor`.
    ///
    /// Resolves (or, for the owning teacher, creates) the session, checks
    /// access, obtains a credential for the channel binding, joins, and
    /// spawns the classroom task. Any fatal failure runs cleanup before
    /// returning; a teacher's session is ended in that case.
    ///
    /// # Errors
    ///
    /// `NoActiveSession`, `AccessDenied`, `Credential`, `Join` or `Store`.
    #[instrument(
        skip_all,
        name = "classroom.join",
        fields(course_id = %course_id, role = actor.role.as_str())
    )]
    pub async fn join(
        deps: ClassroomDeps,
        course_id: CourseId,
        actor: Actor,
        cancel_token: CancellationToken,
    ) -> Result<JoinedClassroom, ClassroomError> {
        let start = std::time::Instant::now();
        let result = Self::establish(deps, course_id, actor, cancel_token).await;

        let error_type = result.as_ref().err().map(ClassroomError::label);
        metrics::record_join(actor.role.as_str(), error_type, start.elapsed());
        if let Err(e) = &result {
            metrics::record_error("join", e.label(), e.error_code());
            warn!(target: "classroom.actor", error = %e, "Join failed");
        }
        result
    }

    async fn establish(
        deps: ClassroomDeps,
        course_id: CourseId,
        actor: Actor,
        cancel_token: CancellationToken,
    ) -> Result<JoinedClassroom, ClassroomError> {
        let session = deps.lifecycle.resolve_or_create(course_id, &actor).await?;
        deps.lifecycle.verify_access(&session, &actor).await?;

        let policy = if actor.is_teacher() {
            RolePolicy::teacher()
        } else {
            RolePolicy::student()
        };
        let binding = ChannelBinding {
            channel_name: session.channel_name.clone(),
            uid: Uid::from(actor.user_id),
            role: policy.initial_role,
        };

        // Listener first so nothing emitted during join is missed
        let mut registry = RemoteParticipantRegistry::new(deps.engine.clone());
        let mut role = RoleController::new(deps.engine.clone(), policy);
        let mut binder = RenderBinder::new(deps.bind_policy);
        let cleanup = CleanupCoordinator::new(
            deps.engine.clone(),
            deps.surfaces.clone(),
            deps.lifecycle.clone(),
        );
        let owns_session = actor.is_teacher();

        let joined = match deps.tokens.issue(&binding).await {
            Ok(credential) => deps
                .engine
                .join(&credential.app_id, &credential.token, &binding)
                .await
                .map_err(|e| {
                    (
                        ChannelState::JoinFailed,
                        ClassroomError::Join(e.to_string()),
                    )
                }),
            Err(e) => Err((ChannelState::NotAttempted, e)),
        };

        if let Err((channel, e)) = joined {
            let report = cleanup
                .teardown(TeardownTarget {
                    role: &mut role,
                    registry: &mut registry,
                    binder: &mut binder,
                    channel,
                    end_session: owns_session.then_some(&session),
                })
                .await;
            debug!(target: "classroom.actor", failures = report.failures.len(), "Cleanup after failed join");
            return Err(e);
        }

        let media_errors = role.on_joined().await;
        for e in &media_errors {
            metrics::record_error("join_media", e.label(), e.error_code());
        }

        let (sender, receiver) = mpsc::channel(CLASSROOM_CHANNEL_BUFFER);
        let handle = ClassroomHandle {
            sender,
            cancel_token: cancel_token.clone(),
            session_id: session.id,
            channel_name: session.channel_name.clone(),
        };

        let mut classroom = ClassroomActor {
            receiver,
            cancel_token,
            session,
            actor,
            local_uid: binding.uid,
            engine: deps.engine,
            surfaces: deps.surfaces,
            role,
            registry,
            binder,
            cleanup,
            owns_session,
        };
        classroom.sync_local_preview();

        info!(
            target: "classroom.actor",
            session_id = %classroom.session.id,
            channel = %classroom.session.channel_name,
            role = classroom.actor.role.as_str(),
            "Joined classroom"
        );

        let task = tokio::spawn(classroom.run());
        Ok(JoinedClassroom {
            handle,
            task,
            media_errors,
        })
    }

    async fn run(mut self) -> TeardownReport {
        let mut events_open = true;

        let exit = loop {
            let deadline = self.binder.next_deadline();

            tokio::select! {
                () = self.cancel_token.cancelled() => break Exit::Cancelled,

                msg = self.receiver.recv() => match msg {
                    Some(ClassroomMessage::Leave { respond_to }) => break Exit::Leave(respond_to),
                    Some(ClassroomMessage::StopClassroom { respond_to }) => {
                        if self.actor.is_teacher() {
                            break Exit::Stop(respond_to);
                        }
                        warn!(target: "classroom.actor", "Student attempted to stop classroom");
                        let _ = respond_to.send(Err(ClassroomError::AccessDenied));
                    }
                    Some(message) => self.handle_message(message).await,
                    None => break Exit::HandlesDropped,
                },

                event = self.registry.next_event(), if events_open => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        warn!(target: "classroom.actor", "Engine event stream closed");
                        events_open = false;
                    }
                },

                () = sleep_until(deadline) => self.poll_binder(),
            }
        };

        info!(target: "classroom.actor", reason = exit.as_str(), "Classroom exiting");

        // Nothing queued behind the exit is served
        self.receiver.close();
        while let Ok(message) = self.receiver.try_recv() {
            message.reject();
        }

        let report = self
            .cleanup
            .teardown(TeardownTarget {
                role: &mut self.role,
                registry: &mut self.registry,
                binder: &mut self.binder,
                channel: ChannelState::Joined,
                end_session: self.owns_session.then_some(&self.session),
            })
            .await;

        match exit {
            Exit::Leave(respond_to) => {
                let _ = respond_to.send(report.clone());
            }
            Exit::Stop(respond_to) => {
                let _ = respond_to.send(Ok(report.clone()));
            }
            Exit::HandlesDropped | Exit::Cancelled => {}
        }
        report
    }

    async fn handle_message(&mut self, message: ClassroomMessage) {
        match message {
            ClassroomMessage::ToggleMedia { kind, respond_to } => {
                let result = self.role.toggle(kind).await;
                self.after_media_change("toggle_media", &result);
                let _ = respond_to.send(result);
            }
            ClassroomMessage::SetMedia {
                kind,
                enabled,
                respond_to,
            } => {
                let result = self.role.set_enabled(kind, enabled).await;
                self.after_media_change("set_media", &result);
                let _ = respond_to.send(result);
            }
            ClassroomMessage::SurfaceMounted {
                surface,
                respond_to,
            } => {
                let restarted = self.binder.restart_surface(&surface, Instant::now());
                debug!(target: "classroom.actor", ?surface, restarted, "Surface mounted");
                let _ = respond_to.send(());
            }
            ClassroomMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.state());
            }
            // Exit messages are handled by the loop
            ClassroomMessage::Leave { .. } | ClassroomMessage::StopClassroom { .. } => {}
        }
    }

    fn after_media_change(&mut self, operation: &str, result: &Result<bool, ClassroomError>) {
        if let Err(e) = result {
            metrics::record_error(operation, e.label(), e.error_code());
            warn!(target: "classroom.actor", operation, error = %e, "Media change failed");
        }
        self.sync_local_preview();
    }

    /// Bind the local camera preview while video is published.
    fn sync_local_preview(&mut self) {
        let publishing = self.role.is_enabled(MediaKind::Video);
        let bound = self
            .binder
            .state(&BindTarget::Local, MediaKind::Video)
            .is_some();
        if publishing && !bound {
            self.binder.schedule(
                BindTarget::Local,
                MediaKind::Video,
                Instant::now(),
                self.surfaces.as_ref(),
            );
        } else if !publishing && bound {
            self.binder
                .cancel(&BindTarget::Local, MediaKind::Video, self.surfaces.as_ref());
        }
    }

    async fn handle_event(&mut self, event: EngineEvent) {
        let applied = self.registry.apply(event).await;
        for e in &applied.failures {
            metrics::record_error("subscribe", e.label(), e.error_code());
        }

        let now = Instant::now();
        for change in applied.changes {
            match change {
                RegistryChange::Announced { uid, kind } => {
                    self.binder
                        .schedule(BindTarget::Remote(uid), kind, now, self.surfaces.as_ref());
                }
                RegistryChange::Withdrawn { uid, kind } => {
                    self.binder
                        .cancel(&BindTarget::Remote(uid), kind, self.surfaces.as_ref());
                }
                RegistryChange::Purged { uid } => {
                    self.binder
                        .cancel_target(&BindTarget::Remote(uid), self.surfaces.as_ref());
                }
            }
        }
    }

    fn poll_binder(&mut self) {
        let tracks = ClassroomTracks {
            role: &self.role,
            engine: self.engine.as_ref(),
        };
        let outcomes = self
            .binder
            .poll(Instant::now(), &tracks, self.surfaces.as_ref());

        for outcome in outcomes {
            match outcome {
                BindOutcome::Playing {
                    target: BindTarget::Remote(uid),
                    kind,
                } => {
                    self.registry.mark(&uid, kind, TrackAvailability::Playing);
                }
                BindOutcome::Bound {
                    target: BindTarget::Remote(uid),
                    kind,
                } => {
                    self.registry.mark(&uid, kind, TrackAvailability::Bound);
                }
                BindOutcome::GaveUp {
                    target,
                    kind,
                    attempts,
                } => {
                    let e = ClassroomError::BindTimeout {
                        target: target.to_string(),
                        kind,
                        attempts,
                    };
                    metrics::record_error("bind", e.label(), e.error_code());
                }
                BindOutcome::Playing { .. } | BindOutcome::Bound { .. } => {}
            }
        }
    }

    fn state(&self) -> ClassroomState {
        ClassroomState {
            session_id: self.session.id,
            channel_name: self.session.channel_name.clone(),
            local_uid: self.local_uid.clone(),
            actor_role: self.actor.role,
            client_role: self.role.role(),
            published: self.role.published_kinds(),
            local_preview_playing: self.binder.state(&BindTarget::Local, MediaKind::Video)
                == Some(BindState::Playing),
            remote: self.registry.snapshot(),
        }
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
