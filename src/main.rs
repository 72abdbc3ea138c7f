//! Ethereum wallet activity ingester binary
//!
//! Syncs one address per invocation: backfill walks history up to the
//! confirmed head, delta continues from the stored checkpoint. Ctrl+C
//! cancels the run without advancing the checkpoint past unwritten work.

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use walletsync::cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, finishing current batch then stopping");
            signal_cancel.cancel();
        }
    });

    let report = run(cli, cancel).await?;
    info!(
        state = ?report.state,
        batches = report.batches_done,
        events = report.events_written,
        "ingester finished"
    );
    Ok(())
}
