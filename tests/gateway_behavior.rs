//! Behavior-driven tests for the call gateway
//!
//! These tests verify WHAT a caller observes when going through the gateway:
//! cached values, retries hidden behind one outcome, and timing guarantees.
//! Durations are scaled down from the production defaults.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tickguard_core::{
    CacheConfig, CacheMode, CallGateway, FailureKind, GatewayConfig, Jitter, OperationKey,
    RateLimitConfig, RetryConfig,
};
use tokio::time::Instant;

fn scaled_config(base_backoff: Duration) -> GatewayConfig {
    GatewayConfig {
        rate_limit: RateLimitConfig {
            min_interval: Duration::from_millis(5),
            jitter: Jitter::none(),
            quota: None,
        },
        retry: RetryConfig::exponential(base_backoff, 3),
        cache: CacheConfig {
            ttl: Duration::from_secs(60),
            ..CacheConfig::default()
        },
        ..GatewayConfig::default()
    }
}

// =============================================================================
// Caching
// =============================================================================

#[tokio::test]
async fn when_key_was_fetched_recently_second_call_is_served_from_cache() {
    // Given: A gateway that already fetched a company profile
    let gateway = CallGateway::new(scaled_config(Duration::from_millis(10)));
    let key = OperationKey::symbol("company_info", "TCS");
    let first = gateway
        .call(&key, || async { Ok::<_, String>(String::from("Tata Consultancy Services")) })
        .await
        .expect("first call succeeds");

    // When: The same key is requested with a fetch that would return something else
    let second_fetches = AtomicU32::new(0);
    let second = gateway
        .call(&key, || {
            second_fetches.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(String::from("something else")) }
        })
        .await
        .expect("cached call succeeds");

    // Then: The first value comes back and the second fetch never runs
    assert_eq!(first, second);
    assert_eq!(second_fetches.load(Ordering::SeqCst), 0);
    assert_eq!(gateway.stats().cache_hits, 1);
}

#[tokio::test]
async fn when_cache_hit_occurs_no_dispatch_slot_is_consumed() {
    // Given: A gateway with a long dispatch interval and a warm cache
    let mut config = scaled_config(Duration::from_millis(10));
    config.rate_limit.min_interval = Duration::from_secs(30);
    let gateway = CallGateway::new(config);
    let key = OperationKey::symbol("current_price", "INFY");
    gateway
        .call(&key, || async { Ok::<_, String>(1_520.4_f64) })
        .await
        .expect("warm");

    // When: The key is read again
    let started = Instant::now();
    let value = gateway
        .call(&key, || async { Ok::<_, String>(0.0_f64) })
        .await
        .expect("hit");

    // Then: The hit returns without waiting on the rate limiter
    assert_eq!(value, 1_520.4);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(gateway.stats().dispatches, 1);
}

#[tokio::test]
async fn when_entry_expires_next_call_fetches_again() {
    // Given: A short-lived cache entry
    let mut config = scaled_config(Duration::from_millis(10));
    config.cache.ttl = Duration::from_millis(80);
    let gateway = CallGateway::new(config);
    let key = OperationKey::symbol("current_price", "WIPRO");
    gateway
        .call(&key, || async { Ok::<_, String>(1_u32) })
        .await
        .expect("seed");

    // When: The TTL passes
    tokio::time::sleep(Duration::from_millis(120)).await;
    let value = gateway
        .call(&key, || async { Ok::<_, String>(2_u32) })
        .await
        .expect("refetch");

    // Then: The stale value is not served
    assert_eq!(value, 2);
    assert_eq!(gateway.stats().dispatches, 2);
}

#[tokio::test]
async fn when_refresh_mode_is_requested_cache_is_overwritten() {
    // Given: A cached quote
    let gateway = CallGateway::new(scaled_config(Duration::from_millis(10)));
    let key = OperationKey::symbol("current_price", "HDFCBANK");
    gateway
        .call(&key, || async { Ok::<_, String>(10_u32) })
        .await
        .expect("seed");

    // When: The caller forces a refresh
    let refreshed = gateway
        .call_with_mode(&key, CacheMode::Refresh, || async { Ok::<_, String>(11_u32) })
        .await
        .expect("refresh");

    // Then: Later reads see the refreshed value
    assert_eq!(refreshed, 11);
    let cached = gateway
        .call(&key, || async { Ok::<_, String>(99_u32) })
        .await
        .expect("hit");
    assert_eq!(cached, 11);
}

// =============================================================================
// Retry outcomes
// =============================================================================

#[tokio::test]
async fn when_provider_throttles_twice_call_succeeds_after_backoff() {
    // Given: A provider that rate-limits the first two attempts
    let base_backoff = Duration::from_millis(40);
    let gateway = CallGateway::new(scaled_config(base_backoff));
    let attempts = AtomicU32::new(0);
    let key = OperationKey::symbol("current_price", "TCS");

    // When: The call is made
    let started = Instant::now();
    let value = gateway
        .call(&key, || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt <= 2 {
                    Err(String::from("Too Many Requests. Rate limited. Try after a while."))
                } else {
                    Ok(3_950.25_f64)
                }
            }
        })
        .await;

    // Then: The success is returned after base + 2*base of backoff
    assert_eq!(value, Ok(3_950.25));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() >= base_backoff * 3);

    let stats = gateway.stats();
    assert_eq!(stats.rate_limited_failures, 2);
    assert!((119..=120).contains(&stats.backoff_ms), "backoff_ms={}", stats.backoff_ms);
}

#[tokio::test]
async fn when_provider_always_returns_429_call_reports_exhausted_rate_limit() {
    // Given: A provider that always answers 429
    let gateway: CallGateway<f64> = CallGateway::new(scaled_config(Duration::from_millis(5)));
    let attempts = AtomicU32::new(0);
    let key = OperationKey::symbol("current_price", "SBIN");

    // When: The call is made
    let error = gateway
        .call(&key, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<f64, _>("HTTP 429") }
        })
        .await
        .expect_err("throttled call fails");

    // Then: Exactly three attempts were dispatched and the error says why
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(error.kind(), FailureKind::RateLimited);
    assert!(error.is_exhausted());
    assert_eq!(error.attempts(), 3);
    assert_eq!(error.key(), &key);
    assert_eq!(gateway.stats().dispatches, 3);
    assert_eq!(gateway.stats().exhausted_calls, 1);
}

#[tokio::test]
async fn when_symbol_is_invalid_call_fails_fast_without_backoff() {
    // Given: A gateway with a long backoff and a provider rejecting the symbol
    let gateway: CallGateway<String> = CallGateway::new(scaled_config(Duration::from_secs(5)));
    let attempts = AtomicU32::new(0);
    let key = OperationKey::symbol("company_info", "NOTREAL");

    // When: The call is made
    let started = Instant::now();
    let error = gateway
        .call(&key, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<String, _>("invalid symbol: NOTREAL") }
        })
        .await
        .expect_err("fatal");

    // Then: One attempt, no sleep, a fatal error
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(error.kind(), FailureKind::Fatal);
    assert!(!error.is_exhausted());
    assert_eq!(gateway.stats().backoff_ms, 0);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn when_many_callers_miss_the_same_key_provider_is_called_once() {
    // Given: Several request handlers asking for the same symbol at once
    let gateway = Arc::new(CallGateway::new(scaled_config(Duration::from_millis(10))));
    let fetches = Arc::new(AtomicU32::new(0));
    let key = OperationKey::symbol("company_info", "RELIANCE");

    // When: They all call concurrently
    let mut handles = Vec::new();
    for _ in 0..6 {
        let gateway = Arc::clone(&gateway);
        let fetches = Arc::clone(&fetches);
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            gateway
                .call(&key, || {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    async {
                        tokio::time::sleep(Duration::from_millis(25)).await;
                        Ok::<_, String>(String::from("Reliance Industries"))
                    }
                })
                .await
        }));
    }
    let results = futures::future::join_all(handles).await;

    // Then: Everyone gets the value from a single upstream call
    for result in results {
        assert_eq!(
            result.expect("task completes").expect("success"),
            "Reliance Industries"
        );
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.inflight_len(), 0);
}

#[tokio::test]
async fn when_leader_fails_waiting_callers_make_their_own_attempt() {
    // Given: A provider that rejects the first request only
    let gateway = Arc::new(CallGateway::new(scaled_config(Duration::from_millis(10))));
    let fetches = Arc::new(AtomicU32::new(0));
    let key = OperationKey::symbol("company_info", "ITC");

    // When: Two callers miss concurrently
    let mut handles = Vec::new();
    for _ in 0..2 {
        let gateway = Arc::clone(&gateway);
        let fetches = Arc::clone(&fetches);
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            gateway
                .call(&key, || {
                    let fetch = fetches.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        if fetch == 1 {
                            Err(String::from("malformed response"))
                        } else {
                            Ok(String::from("ITC Ltd"))
                        }
                    }
                })
                .await
        }));
    }
    let results = futures::future::join_all(handles).await;

    // Then: One caller sees the failure, the other fetches successfully
    let outcomes: Vec<_> = results
        .into_iter()
        .map(|result| result.expect("task completes"))
        .collect();
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_err()).count(), 1);
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}
