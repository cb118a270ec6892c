//! In-memory media engine for tests.
//!
//! Records every call in order, enforces the engine's publish permission
//! (a listener cannot publish) and lets tests simulate remote participants
//! and inject failures at runtime.

use super::{EngineError, EngineEvent, EventSubscription, MediaEngine, TrackHandle};
use crate::models::{ChannelBinding, ClientRole, MediaKind};
use async_trait::async_trait;
use common::secret::SecretString;
use common::types::Uid;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Engine call as recorded by [`MockMediaEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Join { channel_name: String, uid: Uid, role: ClientRole },
    Leave,
    SetClientRole(ClientRole),
    CreateTrack(MediaKind),
    Publish(String),
    Unpublish(String),
    StopTrack(String),
    CloseTrack(String),
    Subscribe { uid: Uid, kind: MediaKind },
    RemoveAllListeners,
}

#[derive(Debug, Clone, Copy, Default)]
struct LocalTrackRecord {
    stopped: bool,
    closed: bool,
}

#[derive(Debug, Default)]
struct MockEngineState {
    calls: Vec<EngineCall>,
    joined: Option<ChannelBinding>,
    client_role: Option<ClientRole>,
    next_track: u64,
    local_tracks: BTreeMap<String, LocalTrackRecord>,
    published: BTreeSet<String>,
    remote_published: HashMap<Uid, BTreeSet<MediaKind>>,
    payload_ready: HashSet<(Uid, MediaKind)>,
    subscribed: HashSet<(Uid, MediaKind)>,
    listeners: Vec<mpsc::UnboundedSender<EngineEvent>>,
    delayed_payloads: bool,
    join_failure: Option<EngineError>,
    leave_failure: Option<EngineError>,
    publish_failure: Option<EngineError>,
    unpublish_failure: Option<EngineError>,
    subscribe_failure: Option<EngineError>,
    role_failures: HashMap<ClientRole, EngineError>,
    device_failures: HashMap<MediaKind, EngineError>,
}

/// Mock media engine.
#[derive(Debug, Default)]
pub struct MockMediaEngine {
    state: Mutex<MockEngineState>,
}

impl MockMediaEngine {
    /// Engine that accepts every operation and delivers payloads immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine whose remote payloads only become retrievable after
    /// [`MockMediaEngine::deliver_payload`].
    #[must_use]
    pub fn with_delayed_payloads() -> Self {
        let engine = Self::default();
        engine.state().delayed_payloads = true;
        engine
    }

    fn state(&self) -> MutexGuard<'_, MockEngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Failure injection
    // ------------------------------------------------------------------

    pub fn fail_join(&self, error: Option<EngineError>) {
        self.state().join_failure = error;
    }

    pub fn fail_leave(&self, error: Option<EngineError>) {
        self.state().leave_failure = error;
    }

    pub fn fail_publish(&self, error: Option<EngineError>) {
        self.state().publish_failure = error;
    }

    pub fn fail_unpublish(&self, error: Option<EngineError>) {
        self.state().unpublish_failure = error;
    }

    pub fn fail_subscribe(&self, error: Option<EngineError>) {
        self.state().subscribe_failure = error;
    }

    /// Make role changes *to* `role` fail.
    pub fn fail_role_change(&self, role: ClientRole, error: Option<EngineError>) {
        let mut state = self.state();
        match error {
            Some(error) => {
                state.role_failures.insert(role, error);
            }
            None => {
                state.role_failures.remove(&role);
            }
        }
    }

    /// Make opening the camera or microphone fail.
    pub fn fail_device(&self, kind: MediaKind, error: Option<EngineError>) {
        let mut state = self.state();
        match error {
            Some(error) => {
                state.device_failures.insert(kind, error);
            }
            None => {
                state.device_failures.remove(&kind);
            }
        }
    }

    // ------------------------------------------------------------------
    // Remote participant simulation
    // ------------------------------------------------------------------

    fn emit(state: &mut MockEngineState, event: &EngineEvent) {
        state
            .listeners
            .retain(|listener| listener.send(event.clone()).is_ok());
    }

    pub fn remote_join(&self, uid: impl Into<Uid>) {
        let uid = uid.into();
        let mut state = self.state();
        state.remote_published.entry(uid.clone()).or_default();
        Self::emit(&mut state, &EngineEvent::UserJoined { uid });
    }

    /// Record a remote publication without notifying listeners (the remote
    /// side published before the local side subscribed).
    pub fn preload_publication(&self, uid: impl Into<Uid>, kind: MediaKind) {
        let uid = uid.into();
        let mut state = self.state();
        state
            .remote_published
            .entry(uid.clone())
            .or_default()
            .insert(kind);
        if !state.delayed_payloads {
            state.payload_ready.insert((uid, kind));
        }
    }

    pub fn remote_publish(&self, uid: impl Into<Uid>, kind: MediaKind) {
        let uid = uid.into();
        self.preload_publication(uid.clone(), kind);
        let mut state = self.state();
        Self::emit(&mut state, &EngineEvent::UserPublished { uid, kind });
    }

    pub fn remote_unpublish(&self, uid: impl Into<Uid>, kind: MediaKind) {
        let uid = uid.into();
        let mut state = self.state();
        if let Some(kinds) = state.remote_published.get_mut(&uid) {
            kinds.remove(&kind);
        }
        state.payload_ready.remove(&(uid.clone(), kind));
        state.subscribed.remove(&(uid.clone(), kind));
        Self::emit(&mut state, &EngineEvent::UserUnpublished { uid, kind });
    }

    pub fn remote_leave(&self, uid: impl Into<Uid>) {
        let uid = uid.into();
        let mut state = self.state();
        state.remote_published.remove(&uid);
        state.payload_ready.retain(|(owner, _)| owner != &uid);
        state.subscribed.retain(|(owner, _)| owner != &uid);
        Self::emit(&mut state, &EngineEvent::UserLeft { uid });
    }

    /// Push a raw event to listeners without touching engine state.
    pub fn emit_raw(&self, event: EngineEvent) {
        let mut state = self.state();
        Self::emit(&mut state, &event);
    }

    /// Make a delayed remote payload retrievable.
    pub fn deliver_payload(&self, uid: impl Into<Uid>, kind: MediaKind) {
        self.state().payload_ready.insert((uid.into(), kind));
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state().calls.clone()
    }

    #[must_use]
    pub fn count_calls(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }

    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.state().joined.is_some()
    }

    #[must_use]
    pub fn joined_binding(&self) -> Option<ChannelBinding> {
        self.state().joined.clone()
    }

    #[must_use]
    pub fn client_role(&self) -> Option<ClientRole> {
        self.state().client_role
    }

    /// Kinds of local tracks currently published.
    #[must_use]
    pub fn published_kinds(&self) -> BTreeSet<MediaKind> {
        self.state()
            .published
            .iter()
            .filter_map(|id| kind_of_local(id))
            .collect()
    }

    /// Local tracks created and not yet closed.
    #[must_use]
    pub fn open_local_tracks(&self) -> usize {
        self.state()
            .local_tracks
            .values()
            .filter(|record| !record.closed)
            .count()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }
}

fn local_track_id(seq: u64, kind: MediaKind) -> String {
    format!("local-{kind}-{seq}")
}

fn kind_of_local(id: &str) -> Option<MediaKind> {
    if id.starts_with("local-audio-") {
        Some(MediaKind::Audio)
    } else if id.starts_with("local-video-") {
        Some(MediaKind::Video)
    } else {
        None
    }
}

fn remote_track_handle(uid: &Uid, kind: MediaKind) -> TrackHandle {
    TrackHandle {
        id: format!("remote-{uid}-{kind}"),
        kind,
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    async fn join(
        &self,
        _app_id: &str,
        _token: &SecretString,
        binding: &ChannelBinding,
    ) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::Join {
            channel_name: binding.channel_name.clone(),
            uid: binding.uid.clone(),
            role: binding.role,
        });
        if let Some(error) = state.join_failure.clone() {
            return Err(error);
        }
        state.joined = Some(binding.clone());
        state.client_role = Some(binding.role);
        Ok(())
    }

    async fn leave(&self) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::Leave);
        if let Some(error) = state.leave_failure.clone() {
            return Err(error);
        }
        state.joined = None;
        state.client_role = None;
        state.published.clear();
        state.subscribed.clear();
        Ok(())
    }

    async fn set_client_role(&self, role: ClientRole) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::SetClientRole(role));
        if state.joined.is_none() {
            return Err(EngineError::Rejected("not in a channel".to_string()));
        }
        if let Some(error) = state.role_failures.get(&role).cloned() {
            return Err(error);
        }
        state.client_role = Some(role);
        Ok(())
    }

    async fn create_local_track(&self, kind: MediaKind) -> Result<TrackHandle, EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::CreateTrack(kind));
        if let Some(error) = state.device_failures.get(&kind).cloned() {
            return Err(error);
        }
        state.next_track += 1;
        let id = local_track_id(state.next_track, kind);
        state
            .local_tracks
            .insert(id.clone(), LocalTrackRecord::default());
        Ok(TrackHandle { id, kind })
    }

    async fn publish(&self, track: &TrackHandle) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::Publish(track.id.clone()));
        if let Some(error) = state.publish_failure.clone() {
            return Err(error);
        }
        if state.client_role != Some(ClientRole::Presenter) {
            return Err(EngineError::Rejected(
                "listener role cannot publish".to_string(),
            ));
        }
        state.published.insert(track.id.clone());
        Ok(())
    }

    async fn unpublish(&self, track: &TrackHandle) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::Unpublish(track.id.clone()));
        if let Some(error) = state.unpublish_failure.clone() {
            return Err(error);
        }
        state.published.remove(&track.id);
        Ok(())
    }

    fn stop_track(&self, track: &TrackHandle) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::StopTrack(track.id.clone()));
        match state.local_tracks.get_mut(&track.id) {
            Some(record) => {
                record.stopped = true;
                Ok(())
            }
            None => Err(EngineError::Rejected("unknown track".to_string())),
        }
    }

    fn close_track(&self, track: &TrackHandle) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::CloseTrack(track.id.clone()));
        match state.local_tracks.get_mut(&track.id) {
            Some(record) if record.stopped => {
                record.closed = true;
                state.published.remove(&track.id);
                Ok(())
            }
            Some(_) => Err(EngineError::Rejected(
                "track must be stopped before close".to_string(),
            )),
            None => Err(EngineError::Rejected("unknown track".to_string())),
        }
    }

    async fn subscribe(
        &self,
        uid: &Uid,
        kind: MediaKind,
    ) -> Result<Option<TrackHandle>, EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::Subscribe {
            uid: uid.clone(),
            kind,
        });
        if let Some(error) = state.subscribe_failure.clone() {
            return Err(error);
        }
        let published = state
            .remote_published
            .get(uid)
            .is_some_and(|kinds| kinds.contains(&kind));
        if !published {
            return Err(EngineError::Rejected(format!(
                "{uid} has not published {kind}"
            )));
        }
        state.subscribed.insert((uid.clone(), kind));
        if state.payload_ready.contains(&(uid.clone(), kind)) {
            Ok(Some(remote_track_handle(uid, kind)))
        } else {
            Ok(None)
        }
    }

    fn remote_published_kinds(&self, uid: &Uid) -> Vec<MediaKind> {
        self.state()
            .remote_published
            .get(uid)
            .map(|kinds| kinds.iter().copied().collect())
            .unwrap_or_default()
    }

    fn remote_track(&self, uid: &Uid, kind: MediaKind) -> Option<TrackHandle> {
        let state = self.state();
        let key = (uid.clone(), kind);
        (state.subscribed.contains(&key) && state.payload_ready.contains(&key))
            .then(|| remote_track_handle(uid, kind))
    }

    fn events(&self) -> EventSubscription {
        let (sender, subscription) = EventSubscription::channel();
        self.state().listeners.push(sender);
        subscription
    }

    fn remove_all_listeners(&self) {
        let mut state = self.state();
        state.calls.push(EngineCall::RemoveAllListeners);
        state.listeners.clear();
    }
}
