use crate::catalog::{Album, Catalog, Track};
use crate::protocol::PlayerSnapshot;
use crate::timeline::Timeline;
use crate::volume::VolumeState;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Everything the player knows.  Lives for one session; nothing is persisted.
#[derive(Debug, Clone, Default)]
pub struct PlayerState {
    /// Monotonic revision counter, incremented on every change.
    pub rev: u64,
    pub catalog: Catalog,
    pub current: Option<Track>,
    pub playing: bool,
    pub loading: bool,
    pub timeline: Timeline,
    pub volume: VolumeState,
}

impl PlayerState {
    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            track: self.current.clone(),
            album: self
                .current
                .as_ref()
                .and_then(|t| self.catalog.album_for(t))
                .cloned(),
            playing: self.playing,
            loading: self.loading,
            time: self.timeline.clone(),
            volume: self.volume.volume,
            muted: self.volume.muted,
            song_count: self.catalog.songs.len(),
            album_count: self.catalog.albums.len(),
        }
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_ref().map(|t| t.id.as_str())
    }
}

/// Shared handle over [`PlayerState`].  The coordinator is the only writer;
/// the control API and tests read snapshots.
pub struct StateManager {
    state: Arc<RwLock<PlayerState>>,
}

impl StateManager {
    pub fn new(volume: f32) -> Self {
        let state = PlayerState {
            rev: 1,
            loading: true,
            volume: VolumeState::new(volume),
            ..PlayerState::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub async fn get_state(&self) -> PlayerState {
        self.state.read().await.clone()
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        self.state.read().await.snapshot()
    }

    pub async fn catalog(&self) -> Catalog {
        self.state.read().await.catalog.clone()
    }

    pub async fn set_songs(&self, songs: Vec<Track>) {
        let mut state = self.state.write().await;
        state.catalog.songs = songs;
        state.rev += 1;
    }

    pub async fn set_albums(&self, albums: Vec<Album>) {
        let mut state = self.state.write().await;
        state.catalog.albums = albums;
        state.rev += 1;
    }

    /// Switch the current track.  Clears the timeline; the output reports
    /// fresh metadata for the new file.
    pub async fn set_current(&self, track: Track) {
        let mut state = self.state.write().await;
        state.current = Some(track);
        state.timeline = Timeline::default();
        state.rev += 1;
    }

    /// Set the playing flag.  Refused (returns `false`) when asked to play
    /// with no current track.
    pub async fn set_playing(&self, playing: bool) -> bool {
        let mut state = self.state.write().await;
        if playing && state.current.is_none() {
            return false;
        }
        state.playing = playing;
        state.rev += 1;
        true
    }

    pub async fn set_loading(&self, loading: bool) {
        let mut state = self.state.write().await;
        state.loading = loading;
        state.rev += 1;
    }

    pub async fn set_volume(&self, volume: VolumeState) {
        let mut state = self.state.write().await;
        state.volume = volume;
        state.rev += 1;
    }

    pub async fn on_metadata(&self, duration: f64) {
        let mut state = self.state.write().await;
        state.timeline.on_metadata(duration);
        state.rev += 1;
    }

    pub async fn on_progress(&self, position: f64, duration: f64) -> bool {
        let mut state = self.state.write().await;
        let changed = state.timeline.on_progress(position, duration);
        if changed {
            state.rev += 1;
        }
        changed
    }
}
