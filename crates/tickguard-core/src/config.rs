//! Aggregate gateway configuration and process-start overrides.
//!
//! Every setting has a default. [`GatewayConfig::from_env`] layers `TICKGUARD_*`
//! environment variables on top:
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `TICKGUARD_MIN_INTERVAL_MS` | minimum gap between dispatches |
//! | `TICKGUARD_JITTER_MIN_MS` / `TICKGUARD_JITTER_MAX_MS` | jitter range added to each wait |
//! | `TICKGUARD_QUOTA_LIMIT` / `TICKGUARD_QUOTA_WINDOW_SECS` | optional window budget (both required) |
//! | `TICKGUARD_MAX_ATTEMPTS` | attempts per call, including the first |
//! | `TICKGUARD_BASE_BACKOFF_MS` | first rate-limit backoff, doubled per retry |
//! | `TICKGUARD_CACHE_TTL_SECS` | result lifetime, `0` disables caching, huge values never expire |
//! | `TICKGUARD_DEDUPE_INFLIGHT` | `true`/`false`, collapse concurrent misses |
//! | `TICKGUARD_RATE_LIMIT_INDICATORS` | comma-separated, replaces the defaults |
//! | `TICKGUARD_TRANSIENT_INDICATORS` | comma-separated, replaces the defaults |

use std::str::FromStr;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::classify::ClassifierConfig;
use crate::error::ConfigError;
use crate::retry::{Backoff, RetryConfig};
use crate::throttling::{QuotaConfig, RateLimitConfig};

pub const ENV_MIN_INTERVAL_MS: &str = "TICKGUARD_MIN_INTERVAL_MS";
pub const ENV_JITTER_MIN_MS: &str = "TICKGUARD_JITTER_MIN_MS";
pub const ENV_JITTER_MAX_MS: &str = "TICKGUARD_JITTER_MAX_MS";
pub const ENV_QUOTA_LIMIT: &str = "TICKGUARD_QUOTA_LIMIT";
pub const ENV_QUOTA_WINDOW_SECS: &str = "TICKGUARD_QUOTA_WINDOW_SECS";
pub const ENV_MAX_ATTEMPTS: &str = "TICKGUARD_MAX_ATTEMPTS";
pub const ENV_BASE_BACKOFF_MS: &str = "TICKGUARD_BASE_BACKOFF_MS";
pub const ENV_CACHE_TTL_SECS: &str = "TICKGUARD_CACHE_TTL_SECS";
pub const ENV_DEDUPE_INFLIGHT: &str = "TICKGUARD_DEDUPE_INFLIGHT";
pub const ENV_RATE_LIMIT_INDICATORS: &str = "TICKGUARD_RATE_LIMIT_INDICATORS";
pub const ENV_TRANSIENT_INDICATORS: &str = "TICKGUARD_TRANSIENT_INDICATORS";

/// Upper bound for the dispatch interval, jitter and backoff base.
pub const MAX_WAIT: Duration = Duration::from_secs(60 * 60);
/// Upper bound for a quota window.
pub const MAX_QUOTA_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Full configuration surface of a [`CallGateway`](crate::CallGateway).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GatewayConfig {
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub classifier: ClassifierConfig,
}

impl GatewayConfig {
    /// Defaults overridden by `TICKGUARD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable name.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_MIN_INTERVAL_MS)? {
            config.rate_limit.min_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_JITTER_MIN_MS)? {
            config.rate_limit.jitter.min = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_JITTER_MAX_MS)? {
            config.rate_limit.jitter.max = Duration::from_millis(ms);
        }

        let quota_limit = parse_var::<u32, _>(&lookup, ENV_QUOTA_LIMIT)?;
        let quota_window = parse_var::<u64, _>(&lookup, ENV_QUOTA_WINDOW_SECS)?;
        config.rate_limit.quota = match (quota_limit, quota_window) {
            (Some(limit), Some(window)) => Some(QuotaConfig {
                limit,
                window: Duration::from_secs(window),
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "{ENV_QUOTA_LIMIT} and {ENV_QUOTA_WINDOW_SECS} must be set together"
                )))
            }
        };

        if let Some(attempts) = parse_var::<u32, _>(&lookup, ENV_MAX_ATTEMPTS)? {
            config.retry.max_attempts = attempts;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_BASE_BACKOFF_MS)? {
            config.retry.backoff = Backoff::exponential(Duration::from_millis(ms));
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_CACHE_TTL_SECS)? {
            config.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(enabled) = parse_var::<bool, _>(&lookup, ENV_DEDUPE_INFLIGHT)? {
            config.cache.dedupe_inflight = enabled;
        }

        if let Some(list) = lookup(ENV_RATE_LIMIT_INDICATORS) {
            config.classifier.rate_limit_indicators = split_list(&list);
        }
        if let Some(list) = lookup(ENV_TRANSIENT_INDICATORS) {
            config.classifier.transient_indicators = split_list(&list);
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would make the gateway misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(String::from(
                "retry.max_attempts must be at least 1",
            )));
        }

        let jitter = self.rate_limit.jitter;
        if jitter.min > jitter.max {
            return Err(ConfigError::Invalid(format!(
                "jitter min {:?} exceeds max {:?}",
                jitter.min, jitter.max
            )));
        }

        check_wait("rate_limit.min_interval", self.rate_limit.min_interval)?;
        check_wait("rate_limit.jitter.max", jitter.max)?;
        check_wait("retry.backoff base", self.retry.backoff.base())?;

        if let Some(quota) = self.rate_limit.quota {
            if quota.limit == 0 || quota.window.is_zero() {
                return Err(ConfigError::Invalid(String::from(
                    "quota limit and window must both be non-zero",
                )));
            }
            if quota.window > MAX_QUOTA_WINDOW {
                return Err(ConfigError::Invalid(format!(
                    "quota window {:?} exceeds {:?}",
                    quota.window, MAX_QUOTA_WINDOW
                )));
            }
        }

        if self.classifier.rate_limit_indicators.is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "at least one rate-limit indicator is required",
            )));
        }

        Ok(())
    }
}

fn check_wait(setting: &str, value: Duration) -> Result<(), ConfigError> {
    if value > MAX_WAIT {
        return Err(ConfigError::Invalid(format!(
            "{setting} {value:?} exceeds {MAX_WAIT:?}"
        )));
    }
    Ok(())
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };

    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            name,
            value: raw,
            reason: type_hint::<T>(),
        })
}

fn type_hint<T>() -> &'static str {
    let name = std::any::type_name::<T>();
    if name == "bool" {
        "expected true or false"
    } else {
        "expected an unsigned integer"
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = GatewayConfig::default();

        assert_eq!(config.rate_limit.min_interval, Duration::from_secs(1));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay_after_attempt(1), Duration::from_secs(2));
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert!(config.cache.dedupe_inflight);
        assert!(config
            .classifier
            .rate_limit_indicators
            .iter()
            .any(|indicator| indicator == "429"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_lookup_yields_defaults() {
        let config = GatewayConfig::from_lookup(|_| None).expect("valid");

        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = GatewayConfig::from_lookup(lookup_from(&[
            (ENV_MIN_INTERVAL_MS, "1500"),
            (ENV_JITTER_MIN_MS, "0"),
            (ENV_JITTER_MAX_MS, " 50 "),
            (ENV_MAX_ATTEMPTS, "5"),
            (ENV_BASE_BACKOFF_MS, "250"),
            (ENV_CACHE_TTL_SECS, "60"),
            (ENV_DEDUPE_INFLIGHT, "false"),
            (ENV_QUOTA_LIMIT, "5"),
            (ENV_QUOTA_WINDOW_SECS, "60"),
            (ENV_RATE_LIMIT_INDICATORS, "429, slow down ,,"),
        ]))
        .expect("valid");

        assert_eq!(config.rate_limit.min_interval, Duration::from_millis(1500));
        assert_eq!(config.rate_limit.jitter.max, Duration::from_millis(50));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.delay_after_attempt(2), Duration::from_millis(500));
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
        assert!(!config.cache.dedupe_inflight);
        assert_eq!(
            config.rate_limit.quota,
            Some(QuotaConfig {
                limit: 5,
                window: Duration::from_secs(60)
            })
        );
        assert_eq!(
            config.classifier.rate_limit_indicators,
            vec![String::from("429"), String::from("slow down")]
        );
    }

    #[test]
    fn malformed_number_names_the_variable() {
        let error = GatewayConfig::from_lookup(lookup_from(&[(ENV_MAX_ATTEMPTS, "three")]))
            .expect_err("invalid");

        assert_eq!(
            error,
            ConfigError::InvalidValue {
                name: ENV_MAX_ATTEMPTS,
                value: String::from("three"),
                reason: "expected an unsigned integer",
            }
        );
    }

    #[test]
    fn malformed_bool_is_rejected() {
        let error = GatewayConfig::from_lookup(lookup_from(&[(ENV_DEDUPE_INFLIGHT, "yes")]))
            .expect_err("invalid");

        assert!(matches!(
            error,
            ConfigError::InvalidValue {
                reason: "expected true or false",
                ..
            }
        ));
    }

    #[test]
    fn half_specified_quota_is_rejected() {
        let error = GatewayConfig::from_lookup(lookup_from(&[(ENV_QUOTA_LIMIT, "5")]))
            .expect_err("invalid");

        assert!(matches!(error, ConfigError::Invalid(_)));
    }

    #[test]
    fn validate_rejects_inconsistent_settings() {
        let mut config = GatewayConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.rate_limit.jitter.min = Duration::from_secs(1);
        config.rate_limit.jitter.max = Duration::from_millis(1);
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.classifier.rate_limit_indicators.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_waits_are_rejected() {
        for (name, value) in [
            (ENV_MIN_INTERVAL_MS, u64::MAX.to_string()),
            (ENV_JITTER_MAX_MS, u64::MAX.to_string()),
            (ENV_BASE_BACKOFF_MS, u64::MAX.to_string()),
        ] {
            let error = GatewayConfig::from_lookup(lookup_from(&[(name, value.as_str())]))
                .expect_err("oversized wait");
            assert!(matches!(error, ConfigError::Invalid(_)), "{name}: {error}");
        }

        let error = GatewayConfig::from_lookup(lookup_from(&[
            (ENV_QUOTA_LIMIT, "1"),
            (ENV_QUOTA_WINDOW_SECS, "18446744073709551615"),
        ]))
        .expect_err("oversized window");
        assert!(matches!(error, ConfigError::Invalid(_)));
    }

    #[test]
    fn waits_at_the_bound_are_accepted() {
        let hour_ms = MAX_WAIT.as_millis().to_string();
        let config = GatewayConfig::from_lookup(lookup_from(&[
            (ENV_MIN_INTERVAL_MS, hour_ms.as_str()),
            (ENV_JITTER_MAX_MS, hour_ms.as_str()),
        ]))
        .expect("valid");

        assert_eq!(config.rate_limit.min_interval, MAX_WAIT);
    }

    #[test]
    fn unbounded_cache_ttl_is_accepted() {
        let config =
            GatewayConfig::from_lookup(lookup_from(&[(ENV_CACHE_TTL_SECS, "18446744073709551615")]))
                .expect("valid");

        assert_eq!(config.cache.ttl, Duration::from_secs(u64::MAX));
    }
}
