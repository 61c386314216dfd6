//! Volume / mute state machine.
//!
//! Two stored values drive it: the current `volume` and the volume saved when
//! mute was toggled on.  Rules:
//!
//! - `set_level(0)` mutes; `set_level(x > 0)` while muted unmutes.
//! - `toggle_mute()` on: save current volume, volume becomes 0.
//! - `toggle_mute()` off: restore the saved volume, or the default when
//!   nothing non-zero was saved.

use serde::{Deserialize, Serialize};

pub const DEFAULT_VOLUME: f32 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeState {
    pub volume: f32,
    pub muted: bool,
    pub muted_prior_volume: Option<f32>,
}

impl VolumeState {
    pub fn new(volume: f32) -> Self {
        Self {
            volume: volume.clamp(0.0, 1.0),
            muted: false,
            muted_prior_volume: None,
        }
    }

    /// Level that should reach the audio output.
    pub fn output_level(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    /// Returns `false` (and changes nothing) for NaN input.
    pub fn set_level(&mut self, level: f32) -> bool {
        if level.is_nan() {
            return false;
        }
        let level = level.clamp(0.0, 1.0);
        self.volume = level;
        if level == 0.0 {
            self.muted = true;
        } else if self.muted {
            self.muted = false;
        }
        true
    }

    pub fn toggle_mute(&mut self) {
        if self.muted {
            let restored = self
                .muted_prior_volume
                .filter(|v| *v > 0.0)
                .unwrap_or(DEFAULT_VOLUME);
            self.volume = restored;
            self.muted = false;
        } else {
            self.muted_prior_volume = Some(self.volume);
            self.volume = 0.0;
            self.muted = true;
        }
    }
}

impl Default for VolumeState {
    fn default() -> Self {
        Self::new(DEFAULT_VOLUME)
    }
}
