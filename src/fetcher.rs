//! Batch fetching
//!
//! Pulls the three raw feeds of a batch (logs, internal call traces, and
//! external transactions) concurrently. The feeds are read-only and
//! order-independent, so they run under `try_join!`; any failure fails the
//! whole batch, and the error names the offending block range so a stuck
//! batch is identifiable from the error alone.

use crate::error::ProviderError;
use crate::provider::Provider;
use crate::types::{LogEntry, TraceEntry, TxRecord};
use alloy_primitives::Address;

/// Raw per-batch payloads, joined before decoding.
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    pub from_block: u64,
    pub to_block: u64,
    pub logs: Vec<LogEntry>,
    pub traces: Vec<TraceEntry>,
    pub transactions: Vec<TxRecord>,
}

impl RawBatch {
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty() && self.traces.is_empty() && self.transactions.is_empty()
    }
}

/// Fetch one batch for `address` over the inclusive `[from, to]` range.
pub async fn fetch_batch<P: Provider>(
    provider: &P,
    address: Address,
    from: u64,
    to: u64,
) -> Result<RawBatch, ProviderError> {
    let (logs, traces, transactions) = tokio::try_join!(
        provider.fetch_logs(address, from, to),
        provider.fetch_traces(address, from, to),
        provider.fetch_transactions(address, from, to),
    )
    .map_err(|e| with_range(e, from, to))?;

    tracing::debug!(
        from_block = from,
        to_block = to,
        logs = logs.len(),
        traces = traces.len(),
        transactions = transactions.len(),
        "batch fetched"
    );
    Ok(RawBatch {
        from_block: from,
        to_block: to,
        logs,
        traces,
        transactions,
    })
}

/// Attach the batch range to errors that carry a message.
fn with_range(err: ProviderError, from: u64, to: u64) -> ProviderError {
    match err {
        ProviderError::Malformed(msg) => {
            ProviderError::Malformed(format!("batch [{}, {}]: {}", from, to, msg))
        }
        ProviderError::Unavailable(msg) => {
            ProviderError::Unavailable(format!("batch [{}, {}]: {}", from, to, msg))
        }
        other => other,
    }
}
