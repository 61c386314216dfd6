use serde::{Deserialize, Serialize};

use crate::catalog::{Album, Track};
use crate::timeline::Timeline;

/// Intents sent to the playback coordinator by front-ends and the control API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Click on a track row: switch to it, or toggle it when already current.
    SelectTrack { id: String },
    Play,
    Pause,
    Next,
    Prev,
    /// Seek to a fraction (0..=1) of the track's duration.
    SeekFraction { fraction: f64 },
    Volume { value: f32 },
    ToggleMute,
    /// Fetch songs and albums (subject to the fetch cooldown).
    LoadCatalog,
}

/// Read-only view of the player handed to presentation consumers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub track: Option<Track>,
    /// Album the current track belongs to, when the catalog has it.
    pub album: Option<Album>,
    pub playing: bool,
    pub loading: bool,
    pub time: Timeline,
    pub volume: f32,
    pub muted: bool,
    pub song_count: usize,
    pub album_count: usize,
}
