//! Retry logic with exponential backoff on rate-limit signals.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::classify::{ErrorClassifier, FailureKind};
use crate::error::GatewayError;
use crate::key::OperationKey;
use crate::stats::GatewayStats;
use crate::throttling::RateLimiter;

/// Delay inserted after a rate-limited attempt before the next one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay after every rate-limited attempt.
    Fixed { delay: Duration },
    /// `base * factor^retry`, never longer than `max`.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(2))
    }
}

impl Backoff {
    /// Doubling backoff from `base`, capped at one minute.
    pub const fn exponential(base: Duration) -> Self {
        Self::Exponential {
            base,
            factor: 2.0,
            max: Duration::from_secs(60),
        }
    }

    /// Delay after `retry` earlier rate-limited attempts (0-based).
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential { base, factor, max } => {
                if base.is_zero() {
                    return Duration::ZERO;
                }
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                let scaled = base.as_secs_f64() * factor.powi(exponent);
                Duration::try_from_secs_f64(scaled).map_or(max, |delay| delay.min(max))
            }
        }
    }

    /// Delay before the first retry.
    pub fn base(self) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential { base, .. } => base,
        }
    }
}

/// Configuration for the retry controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per logical call, including the first one.
    pub max_attempts: u32,
    /// Delay strategy after rate-limited attempts.
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    /// Exponential backoff from `base` with `max_attempts` total attempts.
    pub fn exponential(base: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::exponential(base),
        }
    }

    /// Fixed backoff between attempts.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay },
        }
    }

    /// A single attempt, never retried.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before the attempt following the given 1-based `attempt`.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt.saturating_sub(1))
    }
}

/// Drives repeated attempts of one logical operation through the rate limiter.
#[derive(Debug, Clone)]
pub struct RetryController {
    config: RetryConfig,
    limiter: Arc<RateLimiter>,
    classifier: Arc<ErrorClassifier>,
    stats: Arc<GatewayStats>,
}

impl RetryController {
    pub fn new(
        config: RetryConfig,
        limiter: Arc<RateLimiter>,
        classifier: Arc<ErrorClassifier>,
    ) -> Self {
        Self::with_stats(config, limiter, classifier, Arc::new(GatewayStats::new()))
    }

    pub fn with_stats(
        config: RetryConfig,
        limiter: Arc<RateLimiter>,
        classifier: Arc<ErrorClassifier>,
        stats: Arc<GatewayStats>,
    ) -> Self {
        Self {
            config,
            limiter,
            classifier,
            stats,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` until it succeeds, fails fatally, or the attempt budget
    /// is spent.
    ///
    /// Every attempt passes the rate limiter first. Rate-limited failures sleep
    /// `backoff(attempt - 1)` before the next attempt; transient failures go
    /// straight back to the limiter.
    pub async fn execute<T, E, F, Fut>(
        &self,
        key: &OperationKey,
        mut operation: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            self.limiter.acquire().await;
            self.stats.record_dispatch();
            debug!(key = %key, attempt, max_attempts, "dispatching upstream call");

            let failure = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(key = %key, attempt, "upstream call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error.to_string(),
            };

            let kind = self.classifier.classify(&failure);
            self.stats.record_failure(kind);

            if kind == FailureKind::Fatal {
                debug!(key = %key, attempt, error = %failure, "fatal upstream failure, not retrying");
                return Err(GatewayError::fatal(key.clone(), attempt, failure));
            }

            if attempt >= max_attempts {
                warn!(
                    key = %key,
                    attempts = attempt,
                    kind = %kind,
                    error = %failure,
                    "retries exhausted"
                );
                self.stats.record_exhausted();
                return Err(GatewayError::exhausted(key.clone(), kind, attempt, failure));
            }

            if kind == FailureKind::RateLimited {
                let delay = self.config.delay_after_attempt(attempt);
                warn!(
                    key = %key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure,
                    "rate limited by provider, backing off"
                );
                self.stats.record_backoff(delay);
                tokio::time::sleep(delay).await;
            } else {
                info!(key = %key, attempt, error = %failure, "transient upstream failure, retrying");
            }

            attempt += 1;
        }
    }
}
