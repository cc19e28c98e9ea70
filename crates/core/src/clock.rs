//! Wall-clock abstraction for scheduling decisions.
//!
//! Runners compare job due times against `Clock::now()`. The production clock
//! anchors a UTC timestamp to tokio's monotonic `Instant`: readings never go
//! backwards when the system clock is adjusted, and they follow tokio's paused
//! clock in tests.

use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync + core::fmt::Debug + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Monotonic UTC clock anchored at construction time.
#[derive(Debug, Clone)]
pub struct TimeAnchorClock {
    wall: DateTime<Utc>,
    instant: tokio::time::Instant,
}

impl TimeAnchorClock {
    pub fn new() -> Self {
        Self {
            wall: Utc::now(),
            instant: tokio::time::Instant::now(),
        }
    }

    fn to_utc(&self, instant: tokio::time::Instant) -> DateTime<Utc> {
        let elapsed = instant.saturating_duration_since(self.instant);
        self.wall + chrono::Duration::from_std(elapsed).unwrap_or_default()
    }
}

impl Default for TimeAnchorClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TimeAnchorClock {
    fn now(&self) -> DateTime<Utc> {
        self.to_utc(tokio::time::Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn anchored_clock_follows_paused_tokio_time() {
        let clock = TimeAnchorClock::new();
        let before = clock.now();

        tokio::time::advance(Duration::from_secs(90)).await;

        let after = clock.now();
        assert_eq!((after - before).num_seconds(), 90);
    }
}
