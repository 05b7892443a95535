//! CLI argument definitions for tickguard.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `config` | Print the effective gateway configuration |
//! | `classify` | Classify provider failure messages |
//! | `simulate` | Drive concurrent calls against a scripted provider |
//!
//! # Examples
//!
//! ```bash
//! # Show defaults merged with TICKGUARD_* overrides
//! tickguard config --pretty
//!
//! # Check how a provider message would be handled
//! tickguard classify "429 Too Many Requests" "invalid symbol"
//!
//! # Watch throttling and caching with debug logs
//! tickguard --verbose simulate --symbols TCS,INFY,WIPRO --rate-limit-every 3
//! ```

use clap::{Args, Parser, Subcommand};

/// tickguard - throttle, retry, and cache diagnostics for rate-limited data providers
#[derive(Debug, Parser)]
#[command(
    name = "tickguard",
    author,
    version,
    about = "Diagnostics for the tickguard provider gateway"
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Log gateway activity (waits, cache hits, retries) to stderr at debug level.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the effective configuration (defaults plus TICKGUARD_* overrides).
    Config,
    /// Classify one or more failure messages.
    Classify(ClassifyArgs),
    /// Run concurrent gateway calls against an in-process scripted provider.
    Simulate(SimulateArgs),
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Failure descriptions as returned by the provider.
    #[arg(required = true)]
    pub messages: Vec<String>,
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Symbols requested concurrently in every round.
    #[arg(long, value_delimiter = ',', default_value = "TCS,INFY,WIPRO")]
    pub symbols: Vec<String>,

    /// Number of rounds; rounds after the first are served from cache within the TTL.
    #[arg(long, default_value_t = 2)]
    pub rounds: u32,

    /// Simulated provider latency per attempt in milliseconds.
    #[arg(long, default_value_t = 50)]
    pub latency_ms: u64,

    /// Every Nth upstream attempt answers "429 Too Many Requests".
    #[arg(long)]
    pub rate_limit_every: Option<u32>,

    /// Every Nth upstream attempt answers "connection reset by peer".
    #[arg(long)]
    pub transient_every: Option<u32>,

    /// Symbols the provider rejects as invalid.
    #[arg(long, value_delimiter = ',')]
    pub fail_fatal: Vec<String>,

    /// Override the minimum dispatch interval in milliseconds.
    #[arg(long)]
    pub min_interval_ms: Option<u64>,

    /// Override the base rate-limit backoff in milliseconds.
    #[arg(long)]
    pub base_backoff_ms: Option<u64>,

    /// Override the maximum attempts per call.
    #[arg(long)]
    pub max_attempts: Option<u32>,
}
