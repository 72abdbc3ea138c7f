//! walletsync - Ethereum wallet activity ingestion engine
//!
//! This library ingests on-chain activity for tracked addresses from an
//! Ethereum JSON-RPC provider, normalizes logs into typed token events
//! (ERC-20/721/1155 transfers and approvals), joins transactions with
//! their receipts and internal call traces, and writes versioned rows
//! into ClickHouse behind a per-address checkpoint.

pub mod breaker;
pub mod cache;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod ingester;
pub mod normalize;
pub mod planner;
pub mod provider;
pub mod ratelimit;
pub mod retry;
pub mod rpc;
pub mod sink;
pub mod types;
pub mod writer;

// Re-export the main types for convenience
pub use error::{IngestError, ProviderError, WriteError};
pub use ingester::{IngestOptions, Ingester, RunReport, RunState};
pub use normalize::{normalize_batch, NormalizedBatch, TokenStandard};
pub use planner::{plan, PlanOptions, SyncMode, SyncPlan};
pub use provider::{HttpProvider, Provider};
pub use sink::{ClickHouseSink, EventSink, MemorySink};
