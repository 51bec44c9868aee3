//! Restart rate limiting.

use std::time::Duration;

use tokio::time::Instant;

/// Lets a trigger through only if the previous one is older than the window.
///
/// The first trigger always passes.
#[derive(Debug, Clone)]
pub struct Cooldown {
    window: Duration,
    last: Option<Instant>,
}

impl Cooldown {
    /// Creates a cooldown with the given window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Returns true and records `now` if the window has passed since the
    /// last accepted trigger (strictly longer than the window).
    pub fn try_trigger(&mut self, now: Instant) -> bool {
        let ready = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.window,
        };
        if ready {
            self.last = Some(now);
        }
        ready
    }

    /// The configured window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// When the last trigger was accepted.
    #[must_use]
    pub fn last_trigger(&self) -> Option<Instant> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_trigger_passes() {
        let mut cooldown = Cooldown::new(Duration::from_secs(10));
        assert!(cooldown.last_trigger().is_none());
        assert!(cooldown.try_trigger(Instant::now()));
        assert!(cooldown.last_trigger().is_some());
    }

    #[test]
    fn test_window_boundary_is_exclusive() {
        let mut cooldown = Cooldown::new(Duration::from_secs(10));
        let start = Instant::now();

        assert!(cooldown.try_trigger(start));
        assert!(!cooldown.try_trigger(start + Duration::from_secs(5)));
        assert!(!cooldown.try_trigger(start + Duration::from_secs(10)));
        assert!(cooldown.try_trigger(start + Duration::from_millis(10_001)));
    }

    #[test]
    fn test_suppressed_trigger_does_not_extend_window() {
        let mut cooldown = Cooldown::new(Duration::from_secs(10));
        let start = Instant::now();

        assert!(cooldown.try_trigger(start));
        assert!(!cooldown.try_trigger(start + Duration::from_secs(9)));
        // Measured from the accepted trigger, not the suppressed one.
        assert!(cooldown.try_trigger(start + Duration::from_secs(11)));
    }

    #[test]
    fn test_zero_window_only_blocks_same_instant() {
        let mut cooldown = Cooldown::new(Duration::ZERO);
        let start = Instant::now();

        assert!(cooldown.try_trigger(start));
        assert!(!cooldown.try_trigger(start));
        assert!(cooldown.try_trigger(start + Duration::from_millis(1)));
    }
}
