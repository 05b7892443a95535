use std::fmt::{Debug, Formatter};
use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter as GovernorLimiter};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::clock::{self, Jitter};

/// Request budget over a rolling window, e.g. 5 calls per 60 seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaConfig {
    pub limit: u32,
    pub window: Duration,
}

/// Dispatch spacing settings for the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Fixed minimum gap between two dispatched calls.
    pub min_interval: Duration,
    /// Extra random gap drawn on every wait.
    pub jitter: Jitter,
    /// Optional window budget enforced on top of the spacing.
    pub quota: Option<QuotaConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            jitter: Jitter::default(),
            quota: None,
        }
    }
}

type QuotaLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Process-wide dispatch gate for the external provider.
///
/// The last dispatch time lives behind one async mutex. A caller holds that
/// mutex for its whole wait, so queued callers are released one at a time and
/// each computes its wait from the time the previous caller actually left.
pub struct RateLimiter {
    min_interval: Duration,
    jitter: Jitter,
    last_dispatch: Mutex<Option<Instant>>,
    quota: Option<QuotaLimiter>,
}

impl Debug for RateLimiter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("min_interval", &self.min_interval)
            .field("jitter", &self.jitter)
            .field("quota", &self.quota.is_some())
            .finish()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            min_interval: config.min_interval,
            jitter: config.jitter,
            last_dispatch: Mutex::new(None),
            quota: config
                .quota
                .and_then(quota_from_window)
                .map(GovernorLimiter::direct),
        }
    }

    /// Waits until one call may be dispatched and records the dispatch.
    ///
    /// Never fails. Returns how long the caller slept on the spacing gate,
    /// excluding time spent queued behind other callers.
    pub async fn acquire(&self) -> Duration {
        let mut last_dispatch = self.last_dispatch.lock().await;

        let mut waited = Duration::ZERO;
        if let Some(previous) = *last_dispatch {
            let spacing = self.min_interval.saturating_add(self.jitter.sample());
            let since_previous = clock::now().saturating_duration_since(previous);
            let remaining = spacing.saturating_sub(since_previous);
            if !remaining.is_zero() {
                waited = remaining;
                debug!(
                    waited_ms = millis(waited),
                    spacing_ms = millis(spacing),
                    "waiting for dispatch slot"
                );
                tokio::time::sleep(remaining).await;
            }
        }

        if let Some(quota) = &self.quota {
            let before = clock::now();
            quota.until_ready().await;
            let quota_wait = before.elapsed();
            if !quota_wait.is_zero() {
                debug!(
                    waited_ms = millis(quota_wait),
                    "waited for provider quota window"
                );
                waited = waited.saturating_add(quota_wait);
            }
        }

        // Stamped after sleeping so the next caller measures from the real dispatch.
        *last_dispatch = Some(clock::now());
        waited
    }

    pub async fn last_dispatch(&self) -> Option<Instant> {
        *self.last_dispatch.lock().await
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn jitter(&self) -> Jitter {
        self.jitter
    }
}

fn quota_from_window(config: QuotaConfig) -> Option<Quota> {
    let limit = config.limit.max(1);
    let burst = NonZeroU32::new(limit)?;

    let seconds_per_cell = (config.window.as_secs_f64() / f64::from(limit)).max(0.001);
    let period = Duration::try_from_secs_f64(seconds_per_cell).ok()?;

    Quota::with_period(period).map(|quota| quota.allow_burst(burst))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
