use serde::Serialize;
use tickguard_core::{ErrorClassifier, FailureKind, GatewayConfig};

use crate::cli::ClassifyArgs;
use crate::error::CliError;

use super::CommandOutcome;

#[derive(Debug, Serialize)]
struct Classification<'a> {
    message: &'a str,
    kind: FailureKind,
    retryable: bool,
}

pub fn run(args: &ClassifyArgs, config: &GatewayConfig) -> Result<CommandOutcome, CliError> {
    let classifier = ErrorClassifier::new(&config.classifier);

    let results: Vec<Classification<'_>> = args
        .messages
        .iter()
        .map(|message| {
            let kind = classifier.classify(message);
            Classification {
                message,
                kind,
                retryable: kind.retryable(),
            }
        })
        .collect();

    Ok(CommandOutcome::ok(serde_json::to_value(results)?))
}
