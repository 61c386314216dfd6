//! Display-side time derivations: `m:ss` clock pairs and seek-bar fill.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A minute / zero-padded second pair as rendered in the player bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTime {
    pub minute: u64,
    pub second: String,
}

impl ClockTime {
    /// Floor `secs` into minutes and seconds.  Non-finite or negative input
    /// renders as `0:00`.
    pub fn from_secs(secs: f64) -> Self {
        let total = if secs.is_finite() && secs > 0.0 {
            secs.floor() as u64
        } else {
            0
        };
        Self {
            minute: total / 60,
            second: format!("{:02}", total % 60),
        }
    }
}

impl Default for ClockTime {
    fn default() -> Self {
        Self::from_secs(0.0)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.minute, self.second)
    }
}

/// Seek-bar fill in percent, or `None` while the duration is unknown.
pub fn progress_percent(position: f64, duration: f64) -> Option<f64> {
    if !duration.is_finite() || duration <= 0.0 || !position.is_finite() {
        return None;
    }
    Some(position / duration * 100.0)
}

/// Current/total clock pair plus seek-bar fill for the loaded track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub current: ClockTime,
    pub total: ClockTime,
    pub progress_percent: f64,
    /// Raw duration in seconds; `None` until metadata has loaded.
    pub duration_secs: Option<f64>,
}

impl Timeline {
    pub fn on_metadata(&mut self, duration: f64) {
        self.total = ClockTime::from_secs(duration);
        self.duration_secs = duration.is_finite().then_some(duration);
    }

    /// Apply a time-progress tick.  Ignored while `duration` is not a number,
    /// matching a media element that has not loaded metadata yet.
    pub fn on_progress(&mut self, position: f64, duration: f64) -> bool {
        let Some(percent) = progress_percent(position, duration) else {
            return false;
        };
        self.current = ClockTime::from_secs(position);
        self.total = ClockTime::from_secs(duration);
        self.progress_percent = percent;
        self.duration_secs = Some(duration);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_time_padding() {
        assert_eq!(ClockTime::from_secs(65.0).to_string(), "1:05");
        assert_eq!(ClockTime::from_secs(125.0).to_string(), "2:05");
        assert_eq!(ClockTime::from_secs(59.99).to_string(), "0:59");
        assert_eq!(ClockTime::from_secs(600.0).to_string(), "10:00");
        assert_eq!(ClockTime::from_secs(71.5).second, "11");
    }

    #[test]
    fn test_clock_time_invalid_input() {
        assert_eq!(ClockTime::from_secs(f64::NAN).to_string(), "0:00");
        assert_eq!(ClockTime::from_secs(-3.0).to_string(), "0:00");
        assert_eq!(ClockTime::from_secs(f64::INFINITY).to_string(), "0:00");
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(30.0, 120.0), Some(25.0));
        assert_eq!(progress_percent(30.0, f64::NAN), None);
        assert_eq!(progress_percent(30.0, 0.0), None);
    }

    #[test]
    fn test_timeline_ignores_progress_without_duration() {
        let mut t = Timeline::default();
        assert!(!t.on_progress(12.0, f64::NAN));
        assert_eq!(t, Timeline::default());

        assert!(t.on_progress(90.0, 180.0));
        assert_eq!(t.current.to_string(), "1:30");
        assert_eq!(t.total.to_string(), "3:00");
        assert_eq!(t.progress_percent, 50.0);
        assert_eq!(t.duration_secs, Some(180.0));
    }

    #[test]
    fn test_timeline_metadata_sets_total_only() {
        let mut t = Timeline::default();
        t.on_metadata(245.0);
        assert_eq!(t.total.to_string(), "4:05");
        assert_eq!(t.current.to_string(), "0:00");
        assert_eq!(t.duration_secs, Some(245.0));
    }
}
