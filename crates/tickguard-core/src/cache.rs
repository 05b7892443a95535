//! In-memory TTL cache for successful upstream results.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::clock;
use crate::key::OperationKey;

/// Defines how a gateway call interacts with the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Read from the cache if a non-expired entry is present;
    /// otherwise, fetch from the provider and write the result to the cache. (Default)
    #[default]
    Use,
    /// Always fetch from the provider, bypassing any cached entry,
    /// and write the new result to the cache.
    Refresh,
    /// Always fetch from the provider and do not read from or write to the cache.
    Bypass,
}

/// Cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Lifetime of a stored result. `Duration::ZERO` disables caching; a TTL
    /// past the end of the monotonic clock never expires.
    pub ttl: Duration,
    /// Collapse concurrent misses for the same key into one upstream call.
    pub dedupe_inflight: bool,
    /// Period of the background expiry sweep, if any.
    pub sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            dedupe_inflight: true,
            sweep_interval: None,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    stored_at: Instant,
    /// `None` when `stored_at + ttl` is not representable.
    expires_at: Option<Instant>,
}

impl<T> CacheEntry<T> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}

#[derive(Debug)]
struct CacheInner<T> {
    map: HashMap<OperationKey, CacheEntry<T>>,
    default_ttl: Duration,
}

impl<T: Clone> CacheInner<T> {
    fn new(default_ttl: Duration) -> Self {
        Self {
            map: HashMap::new(),
            default_ttl,
        }
    }

    fn get(&self, key: &OperationKey, now: Instant) -> Lookup<T> {
        match self.map.get(key) {
            Some(entry) if entry.is_live(now) => Lookup::Live(entry.value.clone()),
            Some(_) => Lookup::Expired,
            None => Lookup::Missing,
        }
    }

    fn put(&mut self, key: OperationKey, value: T, ttl_override: Option<Duration>) {
        let ttl = ttl_override.unwrap_or(self.default_ttl);
        let stored_at = clock::now();
        self.map.insert(
            key,
            CacheEntry {
                value,
                stored_at,
                expires_at: stored_at.checked_add(ttl),
            },
        );
    }

    fn remove_if_expired(&mut self, key: &OperationKey, now: Instant) {
        if self.map.get(key).is_some_and(|entry| !entry.is_live(now)) {
            self.map.remove(key);
        }
    }

    fn clear_expired(&mut self) -> usize {
        let now = clock::now();
        let before = self.map.len();
        self.map.retain(|_, entry| entry.is_live(now));
        before - self.map.len()
    }
}

enum Lookup<T> {
    Live(T),
    Expired,
    Missing,
}

/// Thread-safe result cache shared by every caller of a gateway.
///
/// Entries are checked lazily on read: an expired entry is evicted by the read
/// that finds it and is never returned.
#[derive(Debug)]
pub struct ResultCache<T> {
    inner: Arc<RwLock<CacheInner<T>>>,
}

impl<T> Clone for ResultCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ResultCache<T> {
    /// Create a new cache with a default TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner::new(default_ttl))),
        }
    }

    /// Create a cache with a default TTL of 5 minutes.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(300))
    }

    /// Create a disabled cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Get the cached value for `key` if it exists and hasn't expired.
    pub async fn get(&self, key: &OperationKey) -> Option<T> {
        let now = clock::now();
        let lookup = self.inner.read().await.get(key, now);

        match lookup {
            Lookup::Live(value) => Some(value),
            Lookup::Missing => None,
            Lookup::Expired => {
                self.inner.write().await.remove_if_expired(key, now);
                debug!(key = %key, "evicted expired cache entry");
                None
            }
        }
    }

    /// Store `value` under `key` with the default TTL, replacing any previous entry.
    ///
    /// No-op when the cache is disabled.
    pub async fn put(&self, key: OperationKey, value: T) {
        self.put_with_ttl(key, value, None).await;
    }

    /// Store `value` under `key`; `ttl_override` replaces the default TTL.
    pub async fn put_with_ttl(&self, key: OperationKey, value: T, ttl_override: Option<Duration>) {
        let mut store = self.inner.write().await;

        if store.default_ttl.is_zero() {
            return;
        }

        store.put(key, value, ttl_override);
    }

    /// Time at which the live entry for `key` was stored.
    pub async fn stored_at(&self, key: &OperationKey) -> Option<Instant> {
        let now = clock::now();
        let store = self.inner.read().await;
        store
            .map
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.stored_at)
    }

    /// Remove the entry for `key`. Returns whether one was present.
    pub async fn invalidate(&self, key: &OperationKey) -> bool {
        self.inner.write().await.map.remove(key).is_some()
    }

    /// Remove expired entries from the cache. Returns how many were removed.
    pub async fn clear_expired(&self) -> usize {
        self.inner.write().await.clear_expired()
    }

    /// Clear all entries from the cache.
    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    /// Get the number of entries in the cache (including expired entries).
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Check if the cache is disabled (TTL is ZERO).
    pub async fn is_disabled(&self) -> bool {
        self.inner.read().await.default_ttl.is_zero()
    }

    pub async fn ttl(&self) -> Duration {
        self.inner.read().await.default_ttl
    }

    /// Spawn a task that removes expired entries every `interval`.
    ///
    /// The task holds only a weak reference and exits once every handle to
    /// the cache has been dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<RwLock<CacheInner<T>>> = Arc::downgrade(&self.inner);
        let period = interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let removed = inner.write().await.clear_expired();
                if removed > 0 {
                    debug!(removed, "swept expired cache entries");
                }
            }
        })
    }
}
