//! Ingestion orchestrator
//!
//! Drives one run for one address: plan the confirmed range, then walk it
//! in strictly sequential batches through fetch → normalize → write →
//! advance checkpoint. The checkpoint moves only after the batch's rows
//! are durably written, so a failure or cancellation at any point replays
//! at most one batch and never skips blocks.

use crate::checkpoint::{self, CheckpointKind};
use crate::error::IngestError;
use crate::fetcher::fetch_batch;
use crate::normalize::normalize_batch;
use crate::planner::{plan, PlanOptions, SyncMode, SyncPlan};
use crate::provider::Provider;
use crate::sink::EventSink;
use crate::writer::BatchWriter;
use alloy_primitives::Address;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Phase of a run, for logging and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    PlanningRange,
    FetchingBatch,
    Normalizing,
    Writing,
    AdvancingCheckpoint,
    Done,
    Failed,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub state: RunState,
    pub plan: SyncPlan,
    pub batches_done: u64,
    pub events_written: u64,
}

/// Per-run tuning, resolved by the CLI before any network call.
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub confirmations: u64,
    pub batch_blocks: u64,
    /// Plan only; no fetch, no write, no checkpoint.
    pub dry_run: bool,
}

pub struct Ingester<'a, P: Provider, S: EventSink> {
    provider: &'a P,
    sink: &'a S,
    address: Address,
    opts: IngestOptions,
}

impl<'a, P: Provider, S: EventSink> Ingester<'a, P, S> {
    pub fn new(provider: &'a P, sink: &'a S, address: Address, opts: IngestOptions) -> Self {
        Self {
            provider,
            sink,
            address,
            opts,
        }
    }

    /// Walk history from the configured lower bound up to the confirmed
    /// head, resuming past any existing checkpoint.
    pub async fn backfill(&self, cancel: &CancellationToken) -> Result<RunReport, IngestError> {
        self.run(SyncMode::Backfill, cancel).await
    }

    /// Continue from the checkpoint to the confirmed head.
    pub async fn delta(&self, cancel: &CancellationToken) -> Result<RunReport, IngestError> {
        self.run(SyncMode::Delta, cancel).await
    }

    async fn run(
        &self,
        mode: SyncMode,
        cancel: &CancellationToken,
    ) -> Result<RunReport, IngestError> {
        let address_hex = format!("0x{:x}", self.address);
        let mut state = RunState::Idle;
        tracing::debug!(address = %address_hex, ?mode, ?state, "run created");
        state = RunState::PlanningRange;
        tracing::info!(address = %address_hex, ?mode, ?state, "run starting");

        let head = self.provider.block_number().await?;
        let (mut ckpt, existed) = checkpoint::load(self.sink, &address_hex).await?;
        let checkpoint_block = existed.then_some(ckpt.last_synced_block);
        let sync_plan = plan(
            mode,
            checkpoint_block,
            head,
            &PlanOptions {
                from_block: self.opts.from_block,
                to_block: self.opts.to_block,
                confirmations: self.opts.confirmations,
                batch_blocks: self.opts.batch_blocks,
            },
        );

        if self.opts.dry_run {
            tracing::info!(?sync_plan, "dry run, planning only");
            return Ok(RunReport {
                state: RunState::Done,
                plan: sync_plan,
                batches_done: 0,
                events_written: 0,
            });
        }
        if sync_plan.empty {
            tracing::info!(head, "nothing to sync, checkpoint untouched");
            return Ok(RunReport {
                state: RunState::Done,
                plan: sync_plan,
                batches_done: 0,
                events_written: 0,
            });
        }

        let kind = match mode {
            SyncMode::Backfill => CheckpointKind::Backfill,
            SyncMode::Delta => CheckpointKind::Delta,
        };
        let writer = BatchWriter::new(self.sink);
        let mut batches_done = 0u64;
        let mut events_written = 0u64;
        for (lo, hi) in sync_plan.batches() {
            if cancel.is_cancelled() {
                state = RunState::Failed;
                tracing::warn!(?state, lo, hi, "run cancelled before batch");
                return Err(crate::error::ProviderError::Cancelled.into());
            }

            state = RunState::FetchingBatch;
            tracing::debug!(?state, lo, hi, "processing batch");
            let raw = match fetch_batch(self.provider, self.address, lo, hi).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(lo, hi, error = %e, "batch fetch failed");
                    return Err(e.into());
                }
            };

            state = RunState::Normalizing;
            let batch = normalize_batch(&raw, self.address);
            tracing::trace!(?state, rows = batch.row_count(), "batch normalized");

            state = RunState::Writing;
            let written = writer.write(&batch).await?;
            tracing::trace!(?state, written, "batch written");

            if cancel.is_cancelled() {
                // Rows are durable but the cursor stays put; the batch
                // replays on the next run and resolves to the same set.
                state = RunState::Failed;
                tracing::warn!(?state, lo, hi, "run cancelled before checkpoint advance");
                return Err(crate::error::ProviderError::Cancelled.into());
            }

            state = RunState::AdvancingCheckpoint;
            tracing::trace!(?state, hi, "advancing checkpoint");
            let synced = hi.max(ckpt.last_synced_block);
            ckpt = checkpoint::persist(self.sink, ckpt, kind, synced).await?;
            batches_done += 1;
            events_written += written as u64;
            tracing::info!(lo, hi, written, checkpoint = ckpt.last_synced_block, "batch committed");
        }

        state = RunState::Done;
        tracing::info!(
            ?state,
            batches_done,
            events_written,
            from_block = sync_plan.from_block,
            to_block = sync_plan.to_block,
            "run complete"
        );
        Ok(RunReport {
            state,
            plan: sync_plan,
            batches_done,
            events_written,
        })
    }
}
