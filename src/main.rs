use std::io::{stderr, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

use banking_ledger::config::EngineConfig;
use banking_ledger::engine::LedgerEngine;
use banking_ledger::events::{AuditEmitter, AuditSink, BalanceCache, LogSink};
use banking_ledger::gateway::BatchGateway;
use banking_ledger::storage::{LedgerStore, MemoryLedgerStore};

/// Applies a CSV batch of ledger operations and prints the resulting account table.
#[derive(Debug, Parser)]
#[command(name = "banking-ledger", version)]
struct Args {
    /// CSV file of operations to apply.
    input: PathBuf,
    /// One of error, warn, info, debug, trace.
    #[arg(long, env = "LEDGER_LOG_LEVEL", default_value = "error")]
    log_level: String,
    /// Longest an operation waits for its account locks.
    #[arg(long, default_value_t = 5_000)]
    lock_timeout_ms: u64,
    /// How long a cached balance stays usable.
    #[arg(long, default_value_t = 300)]
    balance_cache_ttl_secs: u64,
    /// Ledger snapshot to load before the run and save after it.
    #[arg(long)]
    state: Option<PathBuf>
}

#[derive(Serialize)]
struct AccountRow<'a> {
    account_number: &'a str,
    account_type: &'a str,
    owner: &'a str,
    balance: String,
    version: u64
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(parse_log_level(&args.log_level));

    let store = match &args.state {
        Some(path) if path.exists() => Arc::new(MemoryLedgerStore::load_snapshot(path)
            .with_context(|| format!("could not load ledger state from {}", path.display()))?),
        _ => Arc::new(MemoryLedgerStore::new())
    };

    let defaults = EngineConfig::default();
    let config = defaults.clone()
        .with_lock_timeout(Duration::from_millis(args.lock_timeout_ms))
        .with_balance_cache(defaults.balance_cache_capacity, Duration::from_secs(args.balance_cache_ttl_secs));

    let balance_cache = Arc::new(BalanceCache::new(config.balance_cache_capacity, config.balance_cache_ttl));
    let sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(LogSink) as Arc<dyn AuditSink>, balance_cache.clone() as Arc<dyn AuditSink>];
    let engine = Arc::new(LedgerEngine::new(store.clone(), config)
        .with_emitter(AuditEmitter::spawn(sinks))
        .with_balance_cache(balance_cache));

    let timer = Instant::now();
    let summary = BatchGateway::new(engine.clone()).run(&args.input).await?;
    let duration = timer.elapsed();

    engine.flush_events().await;

    info!("Processed batch in {duration:?}: {summary:?}");

    write_results_to_stdout(&engine)?;

    if let Some(path) = &args.state {
        store.save_snapshot(path)
            .with_context(|| format!("could not save ledger state to {}", path.display()))?;
    }

    Ok(())
}

fn parse_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => {
            eprintln!("Invalid log level '{}', defaulting to 'error'", level);
            LevelFilter::ERROR
        }
    }
}

fn setup_logging(level: LevelFilter) {
    //NOTE: stdout carries the account table, so logging goes to stderr
    let terminal_log = fmt::layer()
        .with_writer(stderr)
        .with_filter(level);

    tracing_subscriber::registry()
        .with(terminal_log)
        .init();
}

fn write_results_to_stdout(engine: &LedgerEngine<MemoryLedgerStore>) -> Result<()> {
    let store = engine.store();
    let mut output = csv::Writer::from_writer(stdout().lock());

    for account in store.accounts()? {
        let owner = store.get_user(account.owner_id)?;
        let current = engine.read_balance(account.id)?;

        output.serialize(AccountRow {
            account_number: &account.account_number,
            account_type: account.account_type.as_str(),
            owner: &owner.username,
            balance: current.balance.to_string(),
            version: current.version
        })?;
    }

    output.flush()?;

    Ok(())
}
