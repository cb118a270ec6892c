//! Remote participant registry.
//!
//! Maps remote uid to the tracks it has announced, built from engine
//! notifications. Rendering is not its concern: each change is reported as
//! a [`RegistryChange`] for the binder to act on.
//!
//! Handlers are idempotent against duplicate and reordered notifications.
//! A publish for an unknown uid registers it, since the engine only reports
//! publishes for users already in the channel.

use crate::engine::{EngineEvent, EventSubscription, MediaEngine};
use crate::errors::ClassroomError;
use crate::models::{MediaKind, TrackAvailability};
use crate::observability::metrics;
use common::types::Uid;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the binder needs to know after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    /// Track (re)announced: (re)start binding.
    Announced { uid: Uid, kind: MediaKind },
    /// Track gone: cancel binding.
    Withdrawn { uid: Uid, kind: MediaKind },
    /// Participant gone with all its tracks.
    Purged { uid: Uid },
}

/// Result of applying one notification.
#[derive(Debug, Default)]
pub struct Applied {
    pub changes: Vec<RegistryChange>,
    /// Non-fatal subscribe failures.
    pub failures: Vec<ClassroomError>,
}

/// Snapshot entry for one remote participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteParticipant {
    pub uid: Uid,
    pub tracks: Vec<(MediaKind, TrackAvailability)>,
}

pub struct RemoteParticipantRegistry {
    engine: Arc<dyn MediaEngine>,
    subscription: Option<EventSubscription>,
    participants: BTreeMap<Uid, BTreeMap<MediaKind, TrackAvailability>>,
}

impl RemoteParticipantRegistry {
    /// Register the engine listener. Create this before joining so no
    /// notification is missed.
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        let subscription = engine.events();
        Self {
            engine,
            subscription: Some(subscription),
            participants: BTreeMap::new(),
        }
    }

    /// Next queued notification. `None` once disposed or the engine dropped
    /// its side.
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.recv().await,
            None => None,
        }
    }

    /// Apply one engine notification.
    pub async fn apply(&mut self, event: EngineEvent) -> Applied {
        metrics::record_engine_event(event.as_str());
        let applied = match event {
            EngineEvent::UserJoined { uid } => self.joined(uid).await,
            EngineEvent::UserLeft { uid } => self.left(&uid),
            EngineEvent::UserPublished { uid, kind } => self.published(uid, kind).await,
            EngineEvent::UserUnpublished { uid, kind } => self.unpublished(&uid, kind),
        };
        metrics::set_remote_participants(self.participants.len());
        applied
    }

    /// Subscribe to `kind`, then record it as announced whether or not the
    /// payload is retrievable yet.
    ///
    /// A duplicate publish for a track already bound or playing changes
    /// nothing. One for a track still `Announced` re-subscribes and restarts
    /// binding, which is how a given-up bind gets another round.
    pub async fn published(&mut self, uid: Uid, kind: MediaKind) -> Applied {
        let mut applied = Applied::default();
        if matches!(
            self.availability(&uid, kind),
            Some(TrackAvailability::Bound | TrackAvailability::Playing)
        ) {
            debug!(target: "classroom.registry", uid = %uid, kind = %kind, "Duplicate publish ignored");
            return applied;
        }
        match self.engine.subscribe(&uid, kind).await {
            Ok(payload) => {
                metrics::record_subscribe(kind.as_str(), "success");
                debug!(
                    target: "classroom.registry",
                    uid = %uid,
                    kind = %kind,
                    payload_ready = payload.is_some(),
                    "Track announced"
                );
                self.participants
                    .entry(uid.clone())
                    .or_default()
                    .insert(kind, TrackAvailability::Announced);
                applied.changes.push(RegistryChange::Announced { uid, kind });
            }
            Err(e) => {
                metrics::record_subscribe(kind.as_str(), "error");
                warn!(target: "classroom.registry", uid = %uid, kind = %kind, error = %e, "Subscribe failed");
                applied.failures.push(ClassroomError::Subscribe(e.to_string()));
            }
        }
        applied
    }

    /// Drop one track; the participant stays listed.
    pub fn unpublished(&mut self, uid: &Uid, kind: MediaKind) -> Applied {
        let mut applied = Applied::default();
        if let Some(tracks) = self.participants.get_mut(uid) {
            if tracks.remove(&kind).is_some() {
                debug!(target: "classroom.registry", uid = %uid, kind = %kind, "Track withdrawn");
                applied.changes.push(RegistryChange::Withdrawn {
                    uid: uid.clone(),
                    kind,
                });
            }
        }
        applied
    }

    /// Register `uid` and pick up anything it already publishes.
    pub async fn joined(&mut self, uid: Uid) -> Applied {
        let known = self.participants.entry(uid.clone()).or_default().clone();
        if known.is_empty() {
            info!(target: "classroom.registry", uid = %uid, "Participant joined");
        }

        let mut applied = Applied::default();
        for kind in self.engine.remote_published_kinds(&uid) {
            if known.contains_key(&kind) {
                continue;
            }
            let result = self.published(uid.clone(), kind).await;
            applied.changes.extend(result.changes);
            applied.failures.extend(result.failures);
        }
        applied
    }

    /// Forget `uid` and all of its tracks.
    pub fn left(&mut self, uid: &Uid) -> Applied {
        let mut applied = Applied::default();
        if self.participants.remove(uid).is_some() {
            info!(target: "classroom.registry", uid = %uid, "Participant left");
            applied
                .changes
                .push(RegistryChange::Purged { uid: uid.clone() });
        }
        applied
    }

    /// Binder feedback. Ignored when the entry no longer exists.
    pub fn mark(&mut self, uid: &Uid, kind: MediaKind, availability: TrackAvailability) -> bool {
        match self
            .participants
            .get_mut(uid)
            .and_then(|tracks| tracks.get_mut(&kind))
        {
            Some(current) => {
                *current = availability;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn availability(&self, uid: &Uid, kind: MediaKind) -> Option<TrackAvailability> {
        self.participants
            .get(uid)
            .and_then(|tracks| tracks.get(&kind))
            .copied()
    }

    /// Participants sorted by uid, tracks audio first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RemoteParticipant> {
        self.participants
            .iter()
            .map(|(uid, tracks)| RemoteParticipant {
                uid: uid.clone(),
                tracks: tracks.iter().map(|(k, a)| (*k, *a)).collect(),
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Remove engine listeners, close the subscription and clear state.
    pub fn dispose(&mut self) {
        self.engine.remove_all_listeners();
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
        self.participants.clear();
        metrics::set_remote_participants(0);
    }
}
