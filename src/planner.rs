//! Block range planning
//!
//! Pure computation of the inclusive block range a run should cover, from
//! the sync mode, the persisted checkpoint, the observed head, and any
//! explicit bounds. No I/O. The upper bound never exceeds the confirmed
//! head (`head - confirmations`); an inverted range is an empty plan and
//! the run becomes a no-op.

use serde::Serialize;

/// How a run chooses its starting block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Walk history from an explicit (or zero) starting block.
    Backfill,
    /// Continue from the checkpoint.
    Delta,
}

/// Explicit bounds and tuning for a run.
#[derive(Debug, Clone, Copy)]
pub struct PlanOptions {
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub confirmations: u64,
    pub batch_blocks: u64,
}

/// The inclusive range a run will cover, chunked into batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub mode: SyncMode,
    pub from_block: u64,
    pub to_block: u64,
    pub batch_blocks: u64,
    /// Head observed at planning time, for reporting.
    pub head: u64,
    /// True when `to < from`: nothing to do, checkpoint untouched.
    pub empty: bool,
}

impl SyncPlan {
    fn empty(mode: SyncMode, head: u64, batch_blocks: u64) -> Self {
        Self {
            mode,
            from_block: 1,
            to_block: 0,
            batch_blocks,
            head,
            empty: true,
        }
    }

    /// Inclusive `[lo, hi]` chunks of at most `batch_blocks` blocks.
    pub fn batches(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        let step = self.batch_blocks.max(1);
        let (from, to, empty) = (self.from_block, self.to_block, self.empty);
        std::iter::successors(
            if empty { None } else { Some(from) },
            move |lo| match lo.checked_add(step) {
                Some(next) if next <= to => Some(next),
                _ => None,
            },
        )
        .map(move |lo| (lo, lo.saturating_add(step - 1).min(to)))
    }

    /// Number of blocks in the plan.
    pub fn block_count(&self) -> u64 {
        if self.empty {
            0
        } else {
            self.to_block - self.from_block + 1
        }
    }
}

/// Compute the range for a run.
///
/// The upper bound is `min(explicit_to, head - confirmations)`; when the
/// head is still inside the confirmation window the plan is empty. Backfill
/// starts from the explicit lower bound (default 0) but never re-walks
/// below an existing checkpoint. Delta continues at `checkpoint + 1`;
/// confirmed blocks are immutable, so no rewind.
pub fn plan(
    mode: SyncMode,
    checkpoint: Option<u64>,
    head: u64,
    opts: &PlanOptions,
) -> SyncPlan {
    let batch_blocks = opts.batch_blocks.max(1);
    let safe_head = match head.checked_sub(opts.confirmations) {
        Some(h) => h,
        None => return SyncPlan::empty(mode, head, batch_blocks),
    };
    let to_block = match opts.to_block {
        Some(explicit) => explicit.min(safe_head),
        None => safe_head,
    };
    let from_block = match mode {
        SyncMode::Backfill => {
            let explicit = opts.from_block.unwrap_or(0);
            match checkpoint {
                Some(ckpt) if ckpt >= explicit => match ckpt.checked_add(1) {
                    Some(next) => next,
                    None => return SyncPlan::empty(mode, head, batch_blocks),
                },
                _ => explicit,
            }
        }
        SyncMode::Delta => match checkpoint {
            Some(ckpt) => match ckpt.checked_add(1) {
                Some(next) => next,
                None => return SyncPlan::empty(mode, head, batch_blocks),
            },
            None => opts.from_block.unwrap_or(0),
        },
    };
    if to_block < from_block {
        return SyncPlan::empty(mode, head, batch_blocks);
    }
    SyncPlan {
        mode,
        from_block,
        to_block,
        batch_blocks,
        head,
        empty: false,
    }
}
