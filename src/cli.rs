//! CLI implementation for the ingester binary
//!
//! Parses flags, validates them before any network call, wires the
//! provider and sink, and drives one backfill or delta run for a single
//! address. Dry runs print the computed plan as pretty JSON and exit.

use crate::breaker::CircuitBreaker;
use crate::config::{redact_dsn, Config};
use crate::error::IngestError;
use crate::ingester::{IngestOptions, Ingester, RunReport};
use crate::planner::SyncMode;
use crate::provider::HttpProvider;
use crate::ratelimit::RateLimiter;
use crate::rpc::RpcClient;
use crate::sink::ClickHouseSink;
use alloy_primitives::Address;
use clap::{Parser, ValueEnum};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Ethereum wallet activity ingester
#[derive(Parser)]
#[command(name = "ingester")]
#[command(about = "Ingest and normalize on-chain activity for an address into ClickHouse")]
pub struct Cli {
    /// Address to sync (0x-prefixed, 40 hex chars)
    #[arg(short, long)]
    pub address: String,

    /// Run mode
    #[arg(short, long, value_enum, default_value_t = Mode::Backfill)]
    pub mode: Mode,

    /// Lower bound of the block range (backfill only; defaults to genesis)
    #[arg(long)]
    pub from_block: Option<u64>,

    /// Upper bound of the block range (capped at head minus confirmations)
    #[arg(long)]
    pub to_block: Option<u64>,

    /// Blocks per batch
    #[arg(long)]
    pub batch: Option<u64>,

    /// Confirmation depth before a block is treated as final
    #[arg(long)]
    pub confirmations: Option<u64>,

    /// RPC requests per second (0 = unlimited)
    #[arg(long)]
    pub rate_limit: Option<u32>,

    /// Ethereum JSON-RPC endpoint (overrides ETH_PROVIDER_URL)
    #[arg(long)]
    pub provider: Option<String>,

    /// ClickHouse DSN (overrides CLICKHOUSE_* environment)
    #[arg(long)]
    pub clickhouse: Option<String>,

    /// Per-RPC-call timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Compute and print the sync plan without fetching or writing
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Backfill,
    Delta,
}

impl From<Mode> for SyncMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Backfill => SyncMode::Backfill,
            Mode::Delta => SyncMode::Delta,
        }
    }
}

/// Parse and validate a 0x-prefixed 20-byte address.
pub fn parse_address(s: &str) -> Result<Address, IngestError> {
    let hex_part = s
        .strip_prefix("0x")
        .ok_or_else(|| IngestError::Config(format!("address must start with 0x: {}", s)))?;
    if hex_part.len() != 40 {
        return Err(IngestError::Config(format!(
            "address must be 40 hex chars, got {}",
            hex_part.len()
        )));
    }
    let bytes = hex::decode(hex_part)
        .map_err(|e| IngestError::Config(format!("invalid address hex: {}", e)))?;
    Ok(Address::from_slice(&bytes))
}

/// Merge CLI flags over the environment configuration.
fn resolve_config(cli: &Cli) -> Config {
    let mut cfg = Config::from_env();
    if let Some(p) = cli.provider.as_deref().filter(|p| !p.is_empty()) {
        cfg.provider_url = p.to_string();
    }
    if let Some(d) = cli.clickhouse.as_deref().filter(|d| !d.is_empty()) {
        cfg.clickhouse_dsn = d.to_string();
    }
    if let Some(b) = cli.batch {
        cfg.batch_blocks = b.clamp(1, 20_000);
    }
    if let Some(c) = cli.confirmations {
        cfg.confirmations = c.clamp(1, 576);
    }
    if let Some(r) = cli.rate_limit {
        cfg.rate_limit = r.min(200);
        cfg.rate_burst = cfg.rate_limit.max(1);
    }
    if let Some(t) = cli.timeout_secs {
        cfg.rpc_timeout = Duration::from_secs(t.clamp(1, 600));
    }
    cfg
}

/// Run the ingester once according to the parsed CLI.
pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<RunReport, IngestError> {
    let address = parse_address(&cli.address)?;
    let cfg = resolve_config(&cli);
    if cfg.provider_url.is_empty() {
        return Err(IngestError::Config(
            "no provider endpoint; set --provider or ETH_PROVIDER_URL".into(),
        ));
    }
    if let (Some(from), Some(to)) = (cli.from_block, cli.to_block) {
        if from > to {
            return Err(IngestError::Config(format!(
                "from-block {} is above to-block {}",
                from, to
            )));
        }
    }

    let rpc = RpcClient::new(cfg.provider_url.clone(), cfg.rpc_timeout);
    tracing::info!(
        provider = rpc.host(),
        sink = %redact_dsn(&cfg.clickhouse_dsn),
        address = %cli.address,
        mode = ?cli.mode,
        "ingester starting"
    );

    let limiter = Arc::new(if cfg.rate_limit == 0 {
        RateLimiter::unlimited()
    } else {
        RateLimiter::new(cfg.rate_limit, cfg.rate_burst, Duration::from_secs(30))
    });
    let breaker = Arc::new(CircuitBreaker::new(cfg.breaker_threshold, cfg.breaker_cooldown));
    let provider = HttpProvider::new(
        rpc,
        limiter,
        breaker,
        cancel.clone(),
        cfg.http_retries,
        cfg.backoff_base,
        cfg.fetch_workers,
    );
    let sink = ClickHouseSink::new(cfg.clickhouse_dsn.clone());
    if !sink.enabled() && !cli.dry_run {
        tracing::warn!("no ClickHouse DSN configured; rows will be discarded");
    }

    let opts = IngestOptions {
        from_block: cli.from_block,
        to_block: cli.to_block,
        confirmations: cfg.confirmations,
        batch_blocks: cfg.batch_blocks,
        dry_run: cli.dry_run,
    };
    let ingester = Ingester::new(&provider, &sink, address, opts);
    let report = match SyncMode::from(cli.mode) {
        SyncMode::Backfill => ingester.backfill(&cancel).await?,
        SyncMode::Delta => ingester.delta(&cancel).await?,
    };

    if cli.dry_run {
        let out = json!({
            "address": cli.address.to_lowercase(),
            "mode": SyncMode::from(cli.mode),
            "plan": report.plan,
            "sink": redact_dsn(&cfg.clickhouse_dsn),
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
    }
    Ok(report)
}
