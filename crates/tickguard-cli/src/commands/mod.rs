mod classify;
mod config;
mod simulate;

use serde_json::Value;
use tickguard_core::GatewayConfig;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub struct CommandOutcome {
    pub data: Value,
    pub failed_calls: usize,
}

impl CommandOutcome {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            failed_calls: 0,
        }
    }

    pub fn with_failed_calls(mut self, failed_calls: usize) -> Self {
        self.failed_calls = failed_calls;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandOutcome, CliError> {
    let config = GatewayConfig::from_env()?;

    match &cli.command {
        Command::Config => config::run(&config),
        Command::Classify(args) => classify::run(args, &config),
        Command::Simulate(args) => simulate::run(args, config).await,
    }
}
