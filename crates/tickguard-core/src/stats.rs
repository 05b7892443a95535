use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::FailureKind;

/// Lock-free counters shared by the gateway and its retry controller.
#[derive(Debug, Default)]
pub struct GatewayStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    coalesced: AtomicU64,
    dispatches: AtomicU64,
    rate_limited: AtomicU64,
    transient: AtomicU64,
    fatal: AtomicU64,
    exhausted: AtomicU64,
    backoff_ms: AtomicU64,
}

/// Point-in-time copy of [`GatewayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Misses that were served by a concurrent caller's fetch.
    pub coalesced: u64,
    pub dispatches: u64,
    pub rate_limited_failures: u64,
    pub transient_failures: u64,
    pub fatal_failures: u64,
    pub exhausted_calls: u64,
    pub backoff_ms: u64,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, kind: FailureKind) {
        let counter = match kind {
            FailureKind::RateLimited => &self.rate_limited,
            FailureKind::Transient => &self.transient,
            FailureKind::Fatal => &self.fatal,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backoff(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.backoff_ms.fetch_add(millis, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            rate_limited_failures: self.rate_limited.load(Ordering::Relaxed),
            transient_failures: self.transient.load(Ordering::Relaxed),
            fatal_failures: self.fatal.load(Ordering::Relaxed),
            exhausted_calls: self.exhausted.load(Ordering::Relaxed),
            backoff_ms: self.backoff_ms.load(Ordering::Relaxed),
        }
    }
}
