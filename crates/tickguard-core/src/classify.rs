//! Failure classification for upstream call errors.
//!
//! The provider reports throttling only through message text, so classification
//! is substring matching over a lowercased failure description:
//!
//! | Kind | Matched by | Retry behavior |
//! |------|------------|----------------|
//! | [`FailureKind::RateLimited`] | rate-limit indicators (`429`, `too many requests`, ...) | retry after exponential backoff |
//! | [`FailureKind::Transient`] | network indicators (`timed out`, `connection reset`, ...) | retry at the next dispatch slot |
//! | [`FailureKind::Fatal`] | anything else | no retry |
//!
//! Rate-limit indicators win over transient ones, so `"429: upstream timed out"`
//! is rate limited.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Classified outcome of a failed upstream attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimited,
    Transient,
    Fatal,
}

impl FailureKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
            Self::Fatal => "fatal",
        }
    }

    pub const fn retryable(self) -> bool {
        !matches!(self, Self::Fatal)
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_RATE_LIMIT_INDICATORS: &[&str] = &[
    "429",
    "too many requests",
    "rate limit",
    "throttled",
    "quota exceeded",
];

pub const DEFAULT_TRANSIENT_INDICATORS: &[&str] = &[
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "connection aborted",
    "connection closed",
    "broken pipe",
    "temporarily unavailable",
    "service unavailable",
    "bad gateway",
    "gateway timeout",
    "network unreachable",
    "dns error",
];

/// Indicator substrings used by [`ErrorClassifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    pub rate_limit_indicators: Vec<String>,
    pub transient_indicators: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rate_limit_indicators: to_owned_list(DEFAULT_RATE_LIMIT_INDICATORS),
            transient_indicators: to_owned_list(DEFAULT_TRANSIENT_INDICATORS),
        }
    }
}

fn to_owned_list(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

/// Pure, total mapping from failure descriptions to [`FailureKind`].
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rate_limit: Vec<String>,
    transient: Vec<String>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

impl ErrorClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            rate_limit: normalize(&config.rate_limit_indicators),
            transient: normalize(&config.transient_indicators),
        }
    }

    /// Classifies a failure description. Unrecognized input is [`FailureKind::Fatal`].
    pub fn classify(&self, description: &str) -> FailureKind {
        let lowered = description.to_lowercase();

        if contains_any(&lowered, &self.rate_limit) {
            FailureKind::RateLimited
        } else if contains_any(&lowered, &self.transient) {
            FailureKind::Transient
        } else {
            FailureKind::Fatal
        }
    }

    pub fn classify_error<E: Display + ?Sized>(&self, error: &E) -> FailureKind {
        self.classify(&error.to_string())
    }
}

// Blank indicators would match every message.
fn normalize(indicators: &[String]) -> Vec<String> {
    indicators
        .iter()
        .map(|indicator| indicator.trim().to_lowercase())
        .filter(|indicator| !indicator.is_empty())
        .collect()
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle.as_str()))
}
