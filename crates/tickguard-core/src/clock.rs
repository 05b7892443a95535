//! Monotonic time and bounded random jitter.

use std::time::Duration;

use tokio::time::Instant;

/// Current monotonic instant.
///
/// All timing in the crate goes through tokio's clock so that spacing, backoff
/// and cache expiry are measured against the same source.
pub fn now() -> Instant {
    Instant::now()
}

/// Inclusive range of extra delay added on top of a fixed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    pub min: Duration,
    pub max: Duration,
}

impl Default for Jitter {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(100),
            max: Duration::from_millis(300),
        }
    }
}

impl Jitter {
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// No jitter at all; every sample is zero.
    pub const fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Whether every sample is zero.
    pub fn is_none(self) -> bool {
        self.min.is_zero() && self.max <= self.min
    }

    /// Draws a uniformly distributed delay in `[min, max]` at microsecond
    /// resolution.
    ///
    /// A range with `max <= min` collapses to `min`. Bounds beyond `u64::MAX`
    /// microseconds are clamped there.
    pub fn sample(self) -> Duration {
        let low = whole_micros(self.min);
        let high = whole_micros(self.max);
        if high <= low {
            return self.min;
        }

        Duration::from_micros(fastrand::u64(low..=high))
    }
}

fn whole_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
