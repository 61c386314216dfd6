//! Time-window guards: the catalog fetch cooldown and the repeat-click filter.
//!
//! Both take `now` from the caller so the player can drive them from tokio's
//! clock (and tests can pause it).

use std::time::Duration;
use tokio::time::Instant;

pub const FETCH_COOLDOWN: Duration = Duration::from_secs(5);
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Suppresses fetch attempts closer together than `cooldown`.
#[derive(Debug, Clone)]
pub struct FetchThrottle {
    cooldown: Duration,
    last_attempt: Option<Instant>,
}

impl FetchThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_attempt: None,
        }
    }

    /// Record an attempt at `now` unless one happened within the cooldown.
    /// Returns whether the caller may go ahead.
    pub fn try_begin(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_attempt {
            if now.saturating_duration_since(last) < self.cooldown {
                return false;
            }
        }
        self.last_attempt = Some(now);
        true
    }

    /// Record an attempt without checking the cooldown (scheduled retries).
    pub fn force_begin(&mut self, now: Instant) {
        self.last_attempt = Some(now);
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }
}

impl Default for FetchThrottle {
    fn default() -> Self {
        Self::new(FETCH_COOLDOWN)
    }
}

/// Detects an accidental second click on the same track.
#[derive(Debug, Clone)]
pub struct ClickDebounce {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl ClickDebounce {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Register a click on `id` at `now` and report whether it repeats the
    /// previous click inside the window.  The click is recorded either way.
    pub fn register(&mut self, id: &str, now: Instant) -> bool {
        let repeat = match &self.last {
            Some((last_id, at)) => {
                last_id == id && now.saturating_duration_since(*at) < self.window
            }
            None => false,
        };
        self.last = Some((id.to_string(), now));
        repeat
    }
}

impl Default for ClickDebounce {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_blocks_inside_cooldown() {
        let t0 = Instant::now();
        let mut throttle = FetchThrottle::default();
        assert!(throttle.try_begin(t0));
        assert!(!throttle.try_begin(t0 + Duration::from_millis(4999)));
        assert_eq!(throttle.last_attempt(), Some(t0));
        assert!(throttle.try_begin(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_force_begin_resets_window() {
        let t0 = Instant::now();
        let mut throttle = FetchThrottle::default();
        assert!(throttle.try_begin(t0));
        throttle.force_begin(t0 + Duration::from_secs(1));
        assert!(!throttle.try_begin(t0 + Duration::from_secs(5)));
        assert!(throttle.try_begin(t0 + Duration::from_secs(6)));
    }

    #[test]
    fn test_debounce_same_id_inside_window() {
        let t0 = Instant::now();
        let mut d = ClickDebounce::default();
        assert!(!d.register("a", t0));
        assert!(d.register("a", t0 + Duration::from_millis(300)));
        assert!(!d.register("a", t0 + Duration::from_millis(900)));
    }

    #[test]
    fn test_debounce_different_id_is_never_repeat() {
        let t0 = Instant::now();
        let mut d = ClickDebounce::default();
        assert!(!d.register("a", t0));
        assert!(!d.register("b", t0 + Duration::from_millis(10)));
        assert!(d.register("b", t0 + Duration::from_millis(20)));
    }

    #[test]
    fn test_debounce_records_ignored_click() {
        let t0 = Instant::now();
        let mut d = ClickDebounce::default();
        d.register("a", t0);
        assert!(d.register("a", t0 + Duration::from_millis(400)));
        // Window now runs from the ignored click.
        assert!(d.register("a", t0 + Duration::from_millis(800)));
    }
}
