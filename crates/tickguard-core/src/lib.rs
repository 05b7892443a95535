//! # Tickguard Core
//!
//! Resilience layer between application code and a rate-limited financial data
//! provider.
//!
//! ## Overview
//!
//! The provider enforces undocumented, process-wide rate limits and reports
//! throttling only through error text. This crate wraps every upstream call in:
//!
//! - **A dispatch gate** spacing all calls by a minimum interval plus jitter
//! - **A failure classifier** labelling errors as rate limited, transient, or fatal
//! - **A retry controller** backing off exponentially on rate-limit signals
//! - **A TTL result cache** shared by all callers
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | TTL result cache and cache modes |
//! | [`classify`] | Failure classification |
//! | [`clock`] | Monotonic time and jitter |
//! | [`config`] | Aggregate configuration and environment overrides |
//! | [`error`] | Gateway and configuration errors |
//! | [`gateway`] | Public call gateway |
//! | [`key`] | Operation keys |
//! | [`retry`] | Retry controller and backoff |
//! | [`stats`] | Call counters |
//! | [`throttling`] | Process-wide rate limiter |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tickguard_core::{CallGateway, GatewayConfig, OperationKey};
//!
//! # async fn fetch_price(symbol: &str) -> Result<f64, String> { Ok(0.0) }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway: CallGateway<f64> = CallGateway::new(GatewayConfig::from_env()?);
//!
//!     let key = OperationKey::symbol("current_price", "TCS.NS");
//!     let price = gateway.call(&key, || fetch_price("TCS.NS")).await?;
//!     println!("TCS: {price:.2}");
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Caller          │
//! └────────┬────────┘
//!          │ call(key, fetch)
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Call Gateway    │────▶│ Result Cache     │
//! └────────┬────────┘     └──────────────────┘
//!          │ miss
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Retry Controller│────▶│ Error Classifier │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Rate Limiter    │──▶ fetch()
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Callers receive either the fetched value or one [`GatewayError`]:
//!
//! ```rust
//! use tickguard_core::{FailureKind, GatewayError};
//!
//! fn describe(error: &GatewayError) -> &'static str {
//!     match error.kind() {
//!         FailureKind::RateLimited => "provider is throttling, try again later",
//!         FailureKind::Transient => "provider unreachable",
//!         FailureKind::Fatal => "request rejected",
//!     }
//! }
//! ```

pub mod cache;
pub mod classify;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod key;
pub mod retry;
pub mod stats;
pub mod throttling;

// Caching
pub use cache::{CacheConfig, CacheMode, ResultCache};

// Classification
pub use classify::{ClassifierConfig, ErrorClassifier, FailureKind};

// Timing
pub use clock::Jitter;

// Configuration
pub use config::GatewayConfig;

// Error types
pub use error::{ConfigError, GatewayError};

// Gateway
pub use gateway::CallGateway;

// Keys
pub use key::OperationKey;

// Retry logic
pub use retry::{Backoff, RetryConfig, RetryController};

// Statistics
pub use stats::{GatewayStats, StatsSnapshot};

// Throttling
pub use throttling::{QuotaConfig, RateLimitConfig, RateLimiter};
