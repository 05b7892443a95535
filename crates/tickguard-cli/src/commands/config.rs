use serde_json::{json, Value};
use tickguard_core::{Backoff, GatewayConfig};

use crate::error::CliError;

use super::CommandOutcome;

pub fn run(config: &GatewayConfig) -> Result<CommandOutcome, CliError> {
    Ok(CommandOutcome::ok(config_view(config)))
}

/// JSON rendering of a config with durations in milliseconds.
pub fn config_view(config: &GatewayConfig) -> Value {
    let quota = config.rate_limit.quota.map(|quota| {
        json!({
            "limit": quota.limit,
            "window_ms": millis(quota.window),
        })
    });

    let backoff = match config.retry.backoff {
        Backoff::Fixed { delay } => json!({
            "strategy": "fixed",
            "delay_ms": millis(delay),
        }),
        Backoff::Exponential { base, factor, max } => json!({
            "strategy": "exponential",
            "base_ms": millis(base),
            "factor": factor,
            "max_ms": millis(max),
        }),
    };

    json!({
        "rate_limit": {
            "min_interval_ms": millis(config.rate_limit.min_interval),
            "jitter_min_ms": millis(config.rate_limit.jitter.min),
            "jitter_max_ms": millis(config.rate_limit.jitter.max),
            "quota": quota,
        },
        "retry": {
            "max_attempts": config.retry.max_attempts,
            "backoff": backoff,
        },
        "cache": {
            "ttl_ms": millis(config.cache.ttl),
            "dedupe_inflight": config.cache.dedupe_inflight,
            "sweep_interval_ms": config.cache.sweep_interval.map(millis),
        },
        "classifier": {
            "rate_limit_indicators": config.classifier.rate_limit_indicators,
            "transient_indicators": config.classifier.transient_indicators,
        },
    })
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_view_reports_documented_values() {
        let view = config_view(&GatewayConfig::default());

        assert_eq!(view["rate_limit"]["min_interval_ms"], 1000);
        assert_eq!(view["rate_limit"]["jitter_min_ms"], 100);
        assert_eq!(view["rate_limit"]["jitter_max_ms"], 300);
        assert!(view["rate_limit"]["quota"].is_null());
        assert_eq!(view["retry"]["max_attempts"], 3);
        assert_eq!(view["retry"]["backoff"]["base_ms"], 2000);
        assert_eq!(view["cache"]["ttl_ms"], 300_000);
        assert_eq!(view["classifier"]["rate_limit_indicators"][0], "429");
    }
}
