//! Provider client
//!
//! The `Provider` trait is the seam between ingestion and the network:
//! the orchestrator and fetcher only ever see this interface, so tests
//! substitute an in-process mock. `HttpProvider` is the production
//! implementation: every RPC goes rate-limiter → bounded retry →
//! circuit-breaker gate, block timestamps come from a bounded cache, and
//! receipts for matched transactions fan out under a semaphore.

use crate::breaker::CircuitBreaker;
use crate::cache::BlockTimeCache;
use crate::error::ProviderError;
use crate::ratelimit::RateLimiter;
use crate::retry::{backoff_delays, retry_transient};
use crate::rpc::RpcClient;
use crate::types::{BlockPayload, LogEntry, TraceEntry, TxRecord};
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Read-only view of the chain used by ingestion. Ranges are inclusive.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Current head block number.
    async fn block_number(&self) -> Result<u64, ProviderError>;

    /// Timestamp of a confirmed block, epoch milliseconds.
    async fn block_timestamp(&self, block: u64) -> Result<u64, ProviderError>;

    /// Full block with transaction bodies. Missing blocks inside the
    /// confirmed range are a protocol violation.
    async fn fetch_block(&self, number: u64) -> Result<BlockPayload, ProviderError>;

    /// Logs emitted by `address` in `[from, to]`, timestamps enriched.
    async fn fetch_logs(
        &self,
        address: Address,
        from: u64,
        to: u64,
    ) -> Result<Vec<LogEntry>, ProviderError>;

    /// Internal calls touching `address` in `[from, to]`. Providers
    /// without trace support yield an empty list.
    async fn fetch_traces(
        &self,
        address: Address,
        from: u64,
        to: u64,
    ) -> Result<Vec<TraceEntry>, ProviderError>;

    /// External transactions touching `address` in `[from, to]`, joined
    /// with their receipts.
    async fn fetch_transactions(
        &self,
        address: Address,
        from: u64,
        to: u64,
    ) -> Result<Vec<TxRecord>, ProviderError>;

    /// Deployed bytecode at `address`; empty for EOAs.
    async fn fetch_code(&self, address: Address) -> Result<Vec<u8>, ProviderError>;
}

/// Whether the endpoint supports an optional RPC method. Probed once,
/// then remembered for the lifetime of the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MethodSupport {
    Unknown,
    Available,
    Unavailable,
}

pub struct HttpProvider {
    rpc: Arc<RpcClient>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    cancel: CancellationToken,
    retries: u32,
    backoff_base: Duration,
    receipt_workers: usize,
    block_times: Mutex<BlockTimeCache>,
    block_receipts: Mutex<MethodSupport>,
    traces: Mutex<MethodSupport>,
}

impl HttpProvider {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rpc: RpcClient,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        cancel: CancellationToken,
        retries: u32,
        backoff_base: Duration,
        receipt_workers: usize,
    ) -> Self {
        Self {
            rpc: Arc::new(rpc),
            limiter,
            breaker,
            cancel,
            retries,
            backoff_base,
            receipt_workers: receipt_workers.max(1),
            block_times: Mutex::new(BlockTimeCache::new()),
            block_receipts: Mutex::new(MethodSupport::Unknown),
            traces: Mutex::new(MethodSupport::Unknown),
        }
    }

    /// One guarded RPC: acquire a rate-limit token, then drive the call
    /// through bounded retries; each attempt passes the breaker gate and
    /// reports its outcome back to it. An already-open breaker fails the
    /// call before any attempt or backoff sleep.
    async fn guarded<T, F, Fut>(&self, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.limiter.acquire().await?;
        self.breaker.check()?;
        let breaker = &self.breaker;
        retry_transient(
            backoff_delays(self.backoff_base, self.retries),
            &self.cancel,
            move || {
                let gate = breaker.check();
                let attempt = gate.map(|_| op());
                async move {
                    match attempt {
                        Err(e) => Err(e),
                        Ok(fut) => match fut.await {
                            Ok(v) => {
                                breaker.record_success();
                                Ok(v)
                            }
                            Err(e) => {
                                if e.is_transient() {
                                    breaker.record_failure();
                                }
                                Err(e)
                            }
                        },
                    }
                }
            },
        )
        .await
    }

    fn cached_timestamp(&self, block: u64) -> Option<u64> {
        self.block_times.lock().expect("cache lock poisoned").get(block)
    }

    fn remember_timestamp(&self, block: u64, ts_millis: u64) {
        self.block_times
            .lock()
            .expect("cache lock poisoned")
            .put(block, ts_millis);
    }

    /// Resolve timestamps for a set of blocks, one RPC per cache miss.
    async fn timestamps_for(
        &self,
        blocks: &BTreeSet<u64>,
    ) -> Result<HashMap<u64, u64>, ProviderError> {
        let mut out = HashMap::with_capacity(blocks.len());
        for &block in blocks {
            out.insert(block, self.block_timestamp(block).await?);
        }
        Ok(out)
    }

    fn block_receipts_supported(&self) -> MethodSupport {
        *self.block_receipts.lock().expect("support lock poisoned")
    }

    fn set_block_receipts_supported(&self, state: MethodSupport) {
        *self.block_receipts.lock().expect("support lock poisoned") = state;
    }

    /// Receipts for `hashes`, all from `block`. Prefers one
    /// `eth_getBlockReceipts` call when the endpoint supports it (probed on
    /// first use when more than one receipt is needed), falling back to
    /// per-transaction lookups under the semaphore.
    async fn receipts_for_block(
        &self,
        block: u64,
        hashes: &[B256],
    ) -> Result<HashMap<B256, (u64, u8)>, ProviderError> {
        if hashes.is_empty() {
            return Ok(HashMap::new());
        }
        let use_block_receipts = match self.block_receipts_supported() {
            MethodSupport::Available => true,
            MethodSupport::Unavailable => false,
            MethodSupport::Unknown => hashes.len() > 1,
        };
        if use_block_receipts {
            match self.guarded(|| self.rpc.get_block_receipts(block)).await? {
                Some(receipts) => {
                    self.set_block_receipts_supported(MethodSupport::Available);
                    let mut out = HashMap::with_capacity(hashes.len());
                    for r in &receipts {
                        out.insert(r.tx_hash, (r.gas_used, u8::from(r.succeeded())));
                    }
                    let missing: Vec<B256> = hashes
                        .iter()
                        .copied()
                        .filter(|h| !out.contains_key(h))
                        .collect();
                    if !missing.is_empty() {
                        out.extend(self.receipts_individually(&missing).await?);
                    }
                    return Ok(out);
                }
                None => {
                    tracing::debug!(provider = self.rpc.host(), "eth_getBlockReceipts unsupported, using per-transaction receipts");
                    self.set_block_receipts_supported(MethodSupport::Unavailable);
                }
            }
        }
        self.receipts_individually(hashes).await
    }

    /// Per-transaction receipt lookups with bounded parallelism.
    async fn receipts_individually(
        &self,
        hashes: &[B256],
    ) -> Result<HashMap<B256, (u64, u8)>, ProviderError> {
        let sem = Arc::new(Semaphore::new(self.receipt_workers));
        let mut set = JoinSet::new();
        for &hash in hashes {
            let rpc = Arc::clone(&self.rpc);
            let limiter = Arc::clone(&self.limiter);
            let breaker = Arc::clone(&self.breaker);
            let cancel = self.cancel.clone();
            let sem = Arc::clone(&sem);
            let delays = backoff_delays(self.backoff_base, self.retries);
            set.spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|_| ProviderError::Cancelled)?;
                limiter.acquire().await?;
                breaker.check()?;
                let receipt = retry_transient(delays, &cancel, || {
                    let gate = breaker.check();
                    let attempt = gate.map(|_| rpc.get_transaction_receipt(hash));
                    let breaker = &breaker;
                    async move {
                        match attempt {
                            Err(e) => Err(e),
                            Ok(fut) => match fut.await {
                                Ok(v) => {
                                    breaker.record_success();
                                    Ok(v)
                                }
                                Err(e) => {
                                    if e.is_transient() {
                                        breaker.record_failure();
                                    }
                                    Err(e)
                                }
                            },
                        }
                    }
                })
                .await?;
                Ok::<_, ProviderError>((hash, (receipt.gas_used, u8::from(receipt.succeeded()))))
            });
        }
        let mut out = HashMap::with_capacity(hashes.len());
        while let Some(joined) = set.join_next().await {
            let (hash, lite) = joined
                .map_err(|e| ProviderError::Unavailable(format!("receipt task failed: {}", e)))??;
            out.insert(hash, lite);
        }
        Ok(out)
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn block_number(&self) -> Result<u64, ProviderError> {
        self.guarded(|| self.rpc.block_number()).await
    }

    async fn block_timestamp(&self, block: u64) -> Result<u64, ProviderError> {
        if let Some(ts) = self.cached_timestamp(block) {
            return Ok(ts);
        }
        let payload = self
            .guarded(|| self.rpc.get_block_by_number(block, false))
            .await?
            .ok_or_else(|| {
                ProviderError::Malformed(format!("block {} missing within confirmed range", block))
            })?;
        let ts = payload.timestamp_millis();
        self.remember_timestamp(block, ts);
        Ok(ts)
    }

    async fn fetch_block(&self, number: u64) -> Result<BlockPayload, ProviderError> {
        let payload = self
            .guarded(|| self.rpc.get_block_by_number(number, true))
            .await?
            .ok_or_else(|| {
                ProviderError::Malformed(format!("block {} missing within confirmed range", number))
            })?;
        self.remember_timestamp(number, payload.timestamp_millis());
        Ok(payload)
    }

    async fn fetch_logs(
        &self,
        address: Address,
        from: u64,
        to: u64,
    ) -> Result<Vec<LogEntry>, ProviderError> {
        let mut logs = self
            .guarded(|| self.rpc.get_logs(address, from, to))
            .await?;
        let blocks: BTreeSet<u64> = logs.iter().map(|l| l.block_number).collect();
        let ts_map = self.timestamps_for(&blocks).await?;
        for log in &mut logs {
            if let Some(&ts) = ts_map.get(&log.block_number) {
                log.ts_millis = ts;
            }
        }
        Ok(logs)
    }

    async fn fetch_traces(
        &self,
        address: Address,
        from: u64,
        to: u64,
    ) -> Result<Vec<TraceEntry>, ProviderError> {
        if *self.traces.lock().expect("support lock poisoned") == MethodSupport::Unavailable {
            return Ok(Vec::new());
        }
        let result = self
            .guarded(|| self.rpc.trace_filter(address, from, to))
            .await?;
        let mut traces = match result {
            Some(traces) => {
                *self.traces.lock().expect("support lock poisoned") = MethodSupport::Available;
                traces
            }
            None => {
                tracing::debug!(provider = self.rpc.host(), "trace_filter unsupported, skipping internal transfers");
                *self.traces.lock().expect("support lock poisoned") = MethodSupport::Unavailable;
                return Ok(Vec::new());
            }
        };
        let blocks: BTreeSet<u64> = traces.iter().map(|t| t.block_number).collect();
        let ts_map = self.timestamps_for(&blocks).await?;
        for trace in &mut traces {
            if let Some(&ts) = ts_map.get(&trace.block_number) {
                trace.ts_millis = ts;
            }
        }
        Ok(traces)
    }

    async fn fetch_transactions(
        &self,
        address: Address,
        from: u64,
        to: u64,
    ) -> Result<Vec<TxRecord>, ProviderError> {
        if from > to {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for number in from..=to {
            if self.cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            let block = self.fetch_block(number).await?;
            let ts_millis = block.timestamp_millis();
            let matched: Vec<_> = block
                .transactions
                .into_iter()
                .filter(|tx| tx.from == address || tx.to == Some(address))
                .collect();
            if matched.is_empty() {
                continue;
            }
            let hashes: Vec<B256> = matched.iter().map(|tx| tx.hash).collect();
            let receipts = self.receipts_for_block(number, &hashes).await?;
            for tx in matched {
                let (gas_used, status) = receipts.get(&tx.hash).copied().ok_or_else(|| {
                    ProviderError::Malformed(format!(
                        "no receipt for mined transaction 0x{:x}",
                        tx.hash
                    ))
                })?;
                out.push(TxRecord {
                    hash: tx.hash,
                    from: tx.from,
                    to: tx.to,
                    value: tx.value,
                    input: tx.input,
                    gas_used,
                    status,
                    block_number: number,
                    ts_millis,
                });
            }
        }
        Ok(out)
    }

    async fn fetch_code(&self, address: Address) -> Result<Vec<u8>, ProviderError> {
        self.guarded(|| self.rpc.get_code(address)).await
    }
}
