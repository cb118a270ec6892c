//! Render binder.
//!
//! Reconciles "track is available" with "surface is mounted and sized". Each
//! (target, kind) pair is an explicit state machine driven by [`RenderBinder::poll`]
//! with a caller-supplied clock, so the binder owns no timers. The classroom
//! task sleeps until [`RenderBinder::next_deadline`] and polls again.

use crate::config::{DEFAULT_BIND_MAX_ATTEMPTS, DEFAULT_BIND_RETRY_INTERVAL_MS};
use crate::engine::TrackHandle;
use crate::models::MediaKind;
use crate::observability::metrics;
use common::types::Uid;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Attempt budget and spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindPolicy {
    pub max_attempts: u32,
    pub retry_interval: Duration,
}

impl Default for BindPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_BIND_MAX_ATTEMPTS,
            retry_interval: Duration::from_millis(DEFAULT_BIND_RETRY_INTERVAL_MS),
        }
    }
}

/// Whose media is being rendered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindTarget {
    /// Local camera preview.
    Local,
    Remote(Uid),
}

impl BindTarget {
    /// Surface the target renders into.
    #[must_use]
    pub fn surface(&self) -> SurfaceKey {
        match self {
            BindTarget::Local => SurfaceKey::LocalPreview,
            BindTarget::Remote(uid) => SurfaceKey::Participant(uid.clone()),
        }
    }

    /// Metric label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            BindTarget::Local => "local",
            BindTarget::Remote(_) => "remote",
        }
    }
}

impl fmt::Display for BindTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindTarget::Local => f.write_str("local"),
            BindTarget::Remote(uid) => write!(f, "remote:{uid}"),
        }
    }
}

/// Identifies a render surface (a mounted container in the UI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SurfaceKey {
    LocalPreview,
    Participant(Uid),
}

/// Measured size of a mounted surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    /// Non-zero in both dimensions.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// UI side of rendering.
pub trait SurfaceHost: Send + Sync {
    /// Size of a mounted surface, `None` when not mounted.
    fn dimensions(&self, surface: &SurfaceKey) -> Option<SurfaceSize>;

    /// Start rendering `track` into `surface`.
    fn attach_video(&self, surface: &SurfaceKey, track: &TrackHandle) -> Result<(), String>;

    /// Start audio playback of `track`. `surface` only identifies the owner.
    fn play_audio(&self, surface: &SurfaceKey, track: &TrackHandle) -> Result<(), String>;

    /// Stop whatever `kind` is playing on `surface`.
    fn release(&self, surface: &SurfaceKey, kind: MediaKind);
}

/// Where the binder fetches current track payloads from.
pub trait TrackSource {
    fn track(&self, target: &BindTarget, kind: MediaKind) -> Option<TrackHandle>;
}

/// Per-entry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    Pending {
        attempts: u32,
        next_attempt_at: Instant,
    },
    Playing,
    GaveUp {
        attempts: u32,
    },
}

/// Result of one attempt, reported by [`RenderBinder::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// Playback started.
    Playing { target: BindTarget, kind: MediaKind },
    /// Payload and surface were ready but playback failed; will retry.
    Bound { target: BindTarget, kind: MediaKind },
    /// Attempt budget exhausted.
    GaveUp {
        target: BindTarget,
        kind: MediaKind,
        attempts: u32,
    },
}

/// Why an attempt did not start playback.
enum Miss {
    NoPayload,
    NoSurface,
    Playback(String),
}

impl fmt::Display for Miss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Miss::NoPayload => f.write_str("payload not retrievable"),
            Miss::NoSurface => f.write_str("surface not mounted or zero-sized"),
            Miss::Playback(reason) => write!(f, "playback failed: {reason}"),
        }
    }
}

/// Bind state machines keyed by (target, kind).
#[derive(Debug)]
pub struct RenderBinder {
    policy: BindPolicy,
    entries: BTreeMap<(BindTarget, MediaKind), BindState>,
}

impl RenderBinder {
    #[must_use]
    pub fn new(policy: BindPolicy) -> Self {
        Self {
            policy,
            entries: BTreeMap::new(),
        }
    }

    /// (Re)start binding. An entry already playing is released first.
    pub fn schedule(
        &mut self,
        target: BindTarget,
        kind: MediaKind,
        now: Instant,
        host: &dyn SurfaceHost,
    ) {
        if self.entries.get(&(target.clone(), kind)) == Some(&BindState::Playing) {
            host.release(&target.surface(), kind);
        }
        debug!(target: "classroom.binder", bind_target = %target, kind = %kind, "Bind scheduled");
        self.entries.insert(
            (target, kind),
            BindState::Pending {
                attempts: 0,
                next_attempt_at: now,
            },
        );
    }

    /// Drop an entry, releasing playback if it was playing.
    pub fn cancel(&mut self, target: &BindTarget, kind: MediaKind, host: &dyn SurfaceHost) {
        if let Some(state) = self.entries.remove(&(target.clone(), kind)) {
            if state == BindState::Playing {
                host.release(&target.surface(), kind);
            }
            debug!(target: "classroom.binder", bind_target = %target, kind = %kind, "Bind cancelled");
        }
    }

    /// Drop every entry of `target`.
    pub fn cancel_target(&mut self, target: &BindTarget, host: &dyn SurfaceHost) {
        for kind in MediaKind::ALL {
            self.cancel(target, kind, host);
        }
    }

    /// A surface was (re)mounted: restart pending and given-up entries that
    /// render into it. Entries already playing are left alone.
    ///
    /// Returns the number of restarted entries.
    pub fn restart_surface(&mut self, surface: &SurfaceKey, now: Instant) -> usize {
        let mut restarted = 0;
        for ((target, _), state) in &mut self.entries {
            if &target.surface() != surface || *state == BindState::Playing {
                continue;
            }
            *state = BindState::Pending {
                attempts: 0,
                next_attempt_at: now,
            };
            restarted += 1;
        }
        restarted
    }

    /// Run every attempt due at `now`.
    pub fn poll(
        &mut self,
        now: Instant,
        tracks: &dyn TrackSource,
        host: &dyn SurfaceHost,
    ) -> Vec<BindOutcome> {
        let mut outcomes = Vec::new();
        let policy = self.policy;

        for ((target, kind), state) in &mut self.entries {
            let BindState::Pending {
                attempts,
                next_attempt_at,
            } = *state
            else {
                continue;
            };
            if next_attempt_at > now {
                continue;
            }

            let attempts = attempts + 1;
            match attempt(target, *kind, tracks, host) {
                Ok(()) => {
                    debug!(
                        target: "classroom.binder",
                        bind_target = %target,
                        kind = %kind,
                        attempts,
                        "Playback started"
                    );
                    metrics::record_bind_outcome(target.label(), kind.as_str(), "playing");
                    *state = BindState::Playing;
                    outcomes.push(BindOutcome::Playing {
                        target: target.clone(),
                        kind: *kind,
                    });
                    continue;
                }
                Err(miss) => {
                    debug!(
                        target: "classroom.binder",
                        bind_target = %target,
                        kind = %kind,
                        attempts,
                        reason = %miss,
                        "Bind attempt missed"
                    );
                    if matches!(miss, Miss::Playback(_)) {
                        outcomes.push(BindOutcome::Bound {
                            target: target.clone(),
                            kind: *kind,
                        });
                    }
                }
            }

            if attempts >= policy.max_attempts {
                warn!(
                    target: "classroom.binder",
                    bind_target = %target,
                    kind = %kind,
                    attempts,
                    "Bind gave up, waiting for re-publish or surface mount"
                );
                metrics::record_bind_outcome(target.label(), kind.as_str(), "gave_up");
                *state = BindState::GaveUp { attempts };
                outcomes.push(BindOutcome::GaveUp {
                    target: target.clone(),
                    kind: *kind,
                    attempts,
                });
            } else {
                *state = BindState::Pending {
                    attempts,
                    next_attempt_at: now + policy.retry_interval,
                };
            }
        }

        outcomes
    }

    /// Earliest pending attempt, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .values()
            .filter_map(|state| match state {
                BindState::Pending {
                    next_attempt_at, ..
                } => Some(*next_attempt_at),
                _ => None,
            })
            .min()
    }

    #[must_use]
    pub fn state(&self, target: &BindTarget, kind: MediaKind) -> Option<BindState> {
        self.entries.get(&(target.clone(), kind)).copied()
    }

    /// Release all playback and forget every entry.
    pub fn clear(&mut self, host: &dyn SurfaceHost) -> usize {
        let released = self
            .entries
            .iter()
            .filter(|(_, state)| **state == BindState::Playing)
            .map(|((target, kind), _)| host.release(&target.surface(), *kind))
            .count();
        self.entries.clear();
        released
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn attempt(
    target: &BindTarget,
    kind: MediaKind,
    tracks: &dyn TrackSource,
    host: &dyn SurfaceHost,
) -> Result<(), Miss> {
    let track = tracks.track(target, kind).ok_or(Miss::NoPayload)?;
    let surface = target.surface();

    match kind {
        MediaKind::Video => {
            let visible = host
                .dimensions(&surface)
                .is_some_and(|size| size.is_visible());
            if !visible {
                return Err(Miss::NoSurface);
            }
            host.attach_video(&surface, &track).map_err(Miss::Playback)
        }
        // Audio has no visual footprint, so only the payload gates it
        MediaKind::Audio => host.play_audio(&surface, &track).map_err(Miss::Playback),
    }
}
