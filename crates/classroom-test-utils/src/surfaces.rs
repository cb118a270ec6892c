//! Recording surface host.
//!
//! Stands in for the UI: tests mount and resize surfaces, make playback
//! fail, and inspect what was attached and released.

use classroom::coordinator::{SurfaceHost, SurfaceKey, SurfaceSize};
use classroom::engine::TrackHandle;
use classroom::models::MediaKind;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct SurfaceState {
    sizes: HashMap<SurfaceKey, SurfaceSize>,
    playing: HashSet<(SurfaceKey, MediaKind)>,
    attached: Vec<(SurfaceKey, MediaKind, String)>,
    released: Vec<(SurfaceKey, MediaKind)>,
    playback_failures: HashMap<SurfaceKey, String>,
}

#[derive(Debug, Default)]
pub struct RecordingSurfaces {
    state: Mutex<SurfaceState>,
}

impl RecordingSurfaces {
    /// No surface mounted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Local preview mounted at 320x240.
    #[must_use]
    pub fn with_local_preview() -> Self {
        let surfaces = Self::new();
        surfaces.mount(SurfaceKey::LocalPreview, 320, 240);
        surfaces
    }

    /// Mount or resize a surface. Zero dimensions model a hidden container.
    pub fn mount(&self, surface: SurfaceKey, width: u32, height: u32) {
        self.state
            .lock()
            .unwrap()
            .sizes
            .insert(surface, SurfaceSize { width, height });
    }

    pub fn unmount(&self, surface: &SurfaceKey) {
        self.state.lock().unwrap().sizes.remove(surface);
    }

    /// Make playback on `surface` fail with `reason`, or succeed again.
    pub fn fail_playback(&self, surface: SurfaceKey, reason: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        match reason {
            Some(reason) => {
                state.playback_failures.insert(surface, reason.to_string());
            }
            None => {
                state.playback_failures.remove(&surface);
            }
        }
    }

    /// Whether `kind` is currently playing on `surface`.
    #[must_use]
    pub fn is_playing(&self, surface: &SurfaceKey, kind: MediaKind) -> bool {
        self.state
            .lock()
            .unwrap()
            .playing
            .contains(&(surface.clone(), kind))
    }

    /// Number of (surface, kind) pairs currently playing.
    #[must_use]
    pub fn playing_count(&self) -> usize {
        self.state.lock().unwrap().playing.len()
    }

    /// Every successful attach as (surface, kind, track id), in order.
    #[must_use]
    pub fn attached(&self) -> Vec<(SurfaceKey, MediaKind, String)> {
        self.state.lock().unwrap().attached.clone()
    }

    #[must_use]
    pub fn released(&self) -> Vec<(SurfaceKey, MediaKind)> {
        self.state.lock().unwrap().released.clone()
    }

    fn start(&self, surface: &SurfaceKey, track: &TrackHandle) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = state.playback_failures.get(surface) {
            return Err(reason.clone());
        }
        state.playing.insert((surface.clone(), track.kind));
        state
            .attached
            .push((surface.clone(), track.kind, track.id.clone()));
        Ok(())
    }
}

impl SurfaceHost for RecordingSurfaces {
    fn dimensions(&self, surface: &SurfaceKey) -> Option<SurfaceSize> {
        self.state.lock().unwrap().sizes.get(surface).copied()
    }

    fn attach_video(&self, surface: &SurfaceKey, track: &TrackHandle) -> Result<(), String> {
        self.start(surface, track)
    }

    fn play_audio(&self, surface: &SurfaceKey, track: &TrackHandle) -> Result<(), String> {
        self.start(surface, track)
    }

    fn release(&self, surface: &SurfaceKey, kind: MediaKind) {
        let mut state = self.state.lock().unwrap();
        state.playing.remove(&(surface.clone(), kind));
        state.released.push((surface.clone(), kind));
    }
}
