//! Public entry point wrapping upstream calls with cache, retry and throttling.
//!
//! ```text
//! caller ──▶ CallGateway::call(key, fetch)
//!              │
//!              ├─ cache hit ─────────────────────────────▶ value
//!              │
//!              └─ miss ─▶ in-flight gate (per key)
//!                           │
//!                           ├─ filled by a concurrent caller ─▶ value
//!                           │
//!                           └─ RetryController ─▶ RateLimiter ─▶ fetch()
//!                                   │
//!                                   ├─ Ok  ─▶ cache.put ─▶ value
//!                                   └─ Err ─▶ GatewayError (never cached)
//! ```

use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheMode, ResultCache};
use crate::classify::ErrorClassifier;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::key::OperationKey;
use crate::retry::RetryController;
use crate::stats::{GatewayStats, StatsSnapshot};
use crate::throttling::RateLimiter;

/// Cache-fronted, rate-limited, retrying wrapper around upstream calls that
/// produce values of type `T`.
///
/// Share one gateway (behind an `Arc`) between all callers. Gateways for
/// different payload types share the provider limit through
/// [`CallGateway::with_limiter`].
pub struct CallGateway<T> {
    cache: ResultCache<T>,
    retry: RetryController,
    limiter: Arc<RateLimiter>,
    stats: Arc<GatewayStats>,
    inflight: InflightGates,
    dedupe_inflight: bool,
    sweeper: Option<JoinHandle<()>>,
}

impl<T> Debug for CallGateway<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallGateway")
            .field("limiter", &self.limiter)
            .field("retry", self.retry.config())
            .field("dedupe_inflight", &self.dedupe_inflight)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl<T> Drop for CallGateway<T> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for CallGateway<T> {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

impl<T: Clone + Send + Sync + 'static> CallGateway<T> {
    /// Gateway with its own rate limiter.
    pub fn new(config: GatewayConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        Self::with_limiter(config, limiter)
    }

    /// Gateway dispatching through an existing, shared rate limiter.
    ///
    /// `config.rate_limit` is ignored in favor of the limiter's own settings.
    pub fn with_limiter(config: GatewayConfig, limiter: Arc<RateLimiter>) -> Self {
        let stats = Arc::new(GatewayStats::new());
        let classifier = Arc::new(ErrorClassifier::new(&config.classifier));
        let retry = RetryController::with_stats(
            config.retry,
            Arc::clone(&limiter),
            classifier,
            Arc::clone(&stats),
        );
        let cache = ResultCache::new(config.cache.ttl);

        let sweeper = match config.cache.sweep_interval {
            Some(interval) if Handle::try_current().is_ok() => Some(cache.spawn_sweeper(interval)),
            Some(_) => {
                warn!("no tokio runtime at construction, background cache sweep disabled");
                None
            }
            None => None,
        };

        Self {
            cache,
            retry,
            limiter,
            stats,
            inflight: InflightGates::default(),
            dedupe_inflight: config.cache.dedupe_inflight,
            sweeper,
        }
    }

    /// Returns the cached value for `key`, or performs `fetch` under the
    /// retry/throttle policy and caches its success.
    ///
    /// Failures are returned as a classified [`GatewayError`] and never cached.
    pub async fn call<F, Fut, E>(&self, key: &OperationKey, fetch: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.call_with_mode(key, CacheMode::Use, fetch).await
    }

    /// Like [`call`](Self::call) with explicit cache behavior.
    pub async fn call_with_mode<F, Fut, E>(
        &self,
        key: &OperationKey,
        mode: CacheMode,
        fetch: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        match mode {
            CacheMode::Bypass => return self.retry.execute(key, fetch).await,
            CacheMode::Refresh => return self.fetch_and_store(key, fetch).await,
            CacheMode::Use => {}
        }

        if let Some(value) = self.cache.get(key).await {
            self.stats.record_hit();
            debug!(key = %key, "cache hit");
            return Ok(value);
        }

        self.stats.record_miss();
        debug!(key = %key, "cache miss");

        if !self.dedupe_inflight {
            return self.fetch_and_store(key, fetch).await;
        }

        let slot = self.inflight.enter(key);
        let _turn = slot.gate.lock().await;

        // A caller ahead of us on this key may have just filled the cache.
        if let Some(value) = self.cache.get(key).await {
            self.stats.record_coalesced();
            debug!(key = %key, "served by concurrent fetch");
            return Ok(value);
        }

        self.fetch_and_store(key, fetch).await
    }

    async fn fetch_and_store<F, Fut, E>(
        &self,
        key: &OperationKey,
        fetch: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let value = self.retry.execute(key, fetch).await?;
        self.cache.put(key.clone(), value.clone()).await;
        Ok(value)
    }

    /// Drop any cached value for `key` so the next call fetches afresh.
    pub async fn invalidate(&self, key: &OperationKey) -> bool {
        self.cache.invalidate(key).await
    }

    pub fn cache(&self) -> &ResultCache<T> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of keys with a fetch currently in flight or queued.
    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }
}

#[derive(Debug)]
struct InflightEntry {
    gate: Arc<tokio::sync::Mutex<()>>,
    holders: usize,
}

/// Per-key async gates; an entry lives while at least one caller holds a slot.
#[derive(Debug, Default)]
struct InflightGates {
    entries: Mutex<HashMap<OperationKey, InflightEntry>>,
}

impl InflightGates {
    fn enter(&self, key: &OperationKey) -> InflightSlot<'_> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(key.clone()).or_insert_with(|| InflightEntry {
            gate: Arc::new(tokio::sync::Mutex::new(())),
            holders: 0,
        });
        entry.holders += 1;

        InflightSlot {
            gates: self,
            key: key.clone(),
            gate: Arc::clone(&entry.gate),
        }
    }

    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct InflightSlot<'a> {
    gates: &'a InflightGates,
    key: OperationKey,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        let mut entries = self
            .gates
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.holders = entry.holders.saturating_sub(1);
            if entry.holders == 0 {
                entries.remove(&self.key);
            }
        }
    }
}
