use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tickguard_core::{Backoff, CallGateway, FailureKind, GatewayConfig, OperationKey};
use tokio::time::Instant;

use crate::cli::SimulateArgs;
use crate::error::CliError;

use super::config::config_view;
use super::CommandOutcome;

/// In-process stand-in for the upstream provider with scripted failures.
#[derive(Debug)]
struct ScriptedProvider {
    attempts: AtomicU32,
    latency: Duration,
    rate_limit_every: Option<u32>,
    transient_every: Option<u32>,
    fatal_symbols: HashSet<String>,
    dispatches: Mutex<Vec<Instant>>,
}

impl ScriptedProvider {
    fn new(args: &SimulateArgs) -> Self {
        Self {
            attempts: AtomicU32::new(0),
            latency: Duration::from_millis(args.latency_ms),
            rate_limit_every: args.rate_limit_every.filter(|every| *every > 0),
            transient_every: args.transient_every.filter(|every| *every > 0),
            fatal_symbols: args.fail_fatal.iter().cloned().collect(),
            dispatches: Mutex::new(Vec::new()),
        }
    }

    async fn quote(&self, symbol: String) -> Result<Value, String> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.dispatches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Instant::now());

        tokio::time::sleep(self.latency).await;

        if self.fatal_symbols.contains(&symbol) {
            return Err(format!("invalid symbol: {symbol}"));
        }
        if hits_every(self.rate_limit_every, attempt) {
            return Err(String::from("429 Too Many Requests"));
        }
        if hits_every(self.transient_every, attempt) {
            return Err(String::from("connection reset by peer"));
        }

        Ok(json!({
            "symbol": symbol,
            "price": synthetic_price(&symbol),
            "attempt": attempt,
        }))
    }

    fn dispatch_report(&self) -> DispatchReport {
        let mut stamps = self
            .dispatches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        stamps.sort();

        let min_spacing_ms = stamps
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .min()
            .map(|gap| gap.as_secs_f64() * 1_000.0);

        DispatchReport {
            count: stamps.len(),
            min_spacing_ms,
        }
    }
}

fn hits_every(every: Option<u32>, attempt: u32) -> bool {
    every.is_some_and(|every| attempt % every == 0)
}

fn synthetic_price(symbol: &str) -> f64 {
    let seed: u32 = symbol.bytes().map(u32::from).sum();
    f64::from(seed % 5_000) + 0.25
}

#[derive(Debug, Serialize)]
struct DispatchReport {
    count: usize,
    min_spacing_ms: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum CallReport {
    Ok {
        symbol: String,
        elapsed_ms: u64,
        value: Value,
    },
    Error {
        symbol: String,
        elapsed_ms: u64,
        kind: FailureKind,
        exhausted: bool,
        attempts: u32,
        message: String,
    },
}

impl CallReport {
    fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[derive(Debug, Serialize)]
struct RoundReport {
    round: u32,
    elapsed_ms: u64,
    calls: Vec<CallReport>,
}

pub async fn run(args: &SimulateArgs, config: GatewayConfig) -> Result<CommandOutcome, CliError> {
    if args.symbols.is_empty() {
        return Err(CliError::Command(String::from(
            "simulate needs at least one symbol",
        )));
    }

    let config = apply_overrides(config, args);
    config.validate()?;

    let provider = Arc::new(ScriptedProvider::new(args));
    let gateway = Arc::new(CallGateway::<Value>::new(config.clone()));

    let mut rounds = Vec::with_capacity(args.rounds as usize);
    for round in 1..=args.rounds {
        let started = Instant::now();
        let handles: Vec<_> = args
            .symbols
            .iter()
            .cloned()
            .map(|symbol| {
                let gateway = Arc::clone(&gateway);
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { call_symbol(&gateway, &provider, symbol).await })
            })
            .collect();

        let mut calls = Vec::with_capacity(handles.len());
        for joined in futures::future::join_all(handles).await {
            let report = joined.map_err(|error| CliError::Command(error.to_string()))?;
            calls.push(report);
        }

        rounds.push(RoundReport {
            round,
            elapsed_ms: elapsed_ms(started),
            calls,
        });
    }

    let failed_calls = rounds
        .iter()
        .flat_map(|round| round.calls.iter())
        .filter(|call| call.is_error())
        .count();

    let data = json!({
        "config": config_view(&config),
        "rounds": rounds,
        "dispatch": provider.dispatch_report(),
        "stats": gateway.stats(),
    });

    Ok(CommandOutcome::ok(data).with_failed_calls(failed_calls))
}

async fn call_symbol(
    gateway: &CallGateway<Value>,
    provider: &ScriptedProvider,
    symbol: String,
) -> CallReport {
    let started = Instant::now();
    let key = OperationKey::symbol("quote", symbol.clone());
    let result = gateway.call(&key, || provider.quote(symbol.clone())).await;

    match result {
        Ok(value) => CallReport::Ok {
            symbol,
            elapsed_ms: elapsed_ms(started),
            value,
        },
        Err(error) => CallReport::Error {
            symbol,
            elapsed_ms: elapsed_ms(started),
            kind: error.kind(),
            exhausted: error.is_exhausted(),
            attempts: error.attempts(),
            message: error.message().to_owned(),
        },
    }
}

fn apply_overrides(mut config: GatewayConfig, args: &SimulateArgs) -> GatewayConfig {
    if let Some(ms) = args.min_interval_ms {
        config.rate_limit.min_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = args.base_backoff_ms {
        config.retry.backoff = Backoff::exponential(Duration::from_millis(ms));
    }
    if let Some(attempts) = args.max_attempts {
        config.retry.max_attempts = attempts;
    }
    config
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
