//! Time utilities and constants for ConvertPal.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Timing constants.
pub mod constants {
    use super::Duration;

    /// Maximum age of a cached rate table (30 minutes).
    pub fn rate_ttl() -> Duration {
        Duration::seconds(1800)
    }

    /// Upper bound on a single feed request (10 seconds).
    pub fn fetch_timeout() -> Duration {
        Duration::seconds(10)
    }
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current wall-clock timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Source of the current time for TTL decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock that never goes backwards.
///
/// If the system clock is stepped back, the last observed instant is
/// returned until real time catches up again.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: Mutex<Option<Timestamp>>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let mut last = self.last.lock();
        let current = match *last {
            Some(prev) => now().max(prev),
            None => now(),
        };
        *last = Some(current);
        current
    }
}

/// Manually driven clock for tests.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<Timestamp>,
}

#[cfg(any(test, feature = "test-utils"))]
impl ManualClock {
    /// Start at the given instant.
    pub fn new(start: Timestamp) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Start at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(now())
    }

    /// Move the clock forward. Negative durations are ignored.
    pub fn advance(&self, by: Duration) {
        if by > Duration::zero() {
            *self.current.lock() += by;
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.lock()
    }
}

/// Age of `since` relative to `at`, never negative.
pub fn age(since: Timestamp, at: Timestamp) -> Duration {
    let age = at.signed_duration_since(since);
    if age < Duration::zero() {
        Duration::zero()
    } else {
        age
    }
}

/// Duration extensions for convenient construction.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}
