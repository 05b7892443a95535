use thiserror::Error;

use crate::classify::FailureKind;
use crate::key::OperationKey;

/// Terminal failure of one gateway call.
///
/// Callers never see the intermediate attempts; this carries the class of the
/// last failure, whether the retry budget ran out, and its description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{key}: {kind} failure after {attempts} attempt(s){}: {message}", exhausted_suffix(.exhausted))]
pub struct GatewayError {
    key: OperationKey,
    kind: FailureKind,
    exhausted: bool,
    attempts: u32,
    message: String,
}

fn exhausted_suffix(exhausted: &bool) -> &'static str {
    if *exhausted {
        ", retries exhausted"
    } else {
        ""
    }
}

impl GatewayError {
    /// A fatal failure that stopped the retry loop early.
    pub fn fatal(key: OperationKey, attempts: u32, message: impl Into<String>) -> Self {
        Self {
            key,
            kind: FailureKind::Fatal,
            exhausted: false,
            attempts,
            message: message.into(),
        }
    }

    /// A retryable failure that was still failing on the last allowed attempt.
    pub fn exhausted(
        key: OperationKey,
        kind: FailureKind,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            key,
            kind,
            exhausted: true,
            attempts,
            message: message.into(),
        }
    }

    pub fn key(&self) -> &OperationKey {
        &self.key
    }

    pub const fn kind(&self) -> FailureKind {
        self.kind
    }

    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether a later call could plausibly succeed.
    pub const fn retryable(&self) -> bool {
        self.kind.retryable()
    }
}

/// Invalid configuration supplied at process start.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}' ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("{0}")]
    Invalid(String),
}
