//! Error taxonomy for the ingestion pipeline
//!
//! Provider failures, sink write failures, and configuration errors are
//! kept as separate types so callers can tell retryable conditions apart
//! from terminal ones.

use thiserror::Error;

/// Failures surfaced by the provider client.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The RPC call did not complete within the per-call timeout.
    #[error("rpc timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// The shared rate limiter could not grant a token within its bound,
    /// or the provider answered HTTP 429.
    #[error("rate limited")]
    RateLimited,

    /// The provider is unreachable, answered 5xx, or the circuit breaker
    /// is open.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The response parsed but is not what the protocol promises.
    /// Never retried.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The run-scoped cancellation signal fired. Never retried.
    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether a bounded retry with backoff is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_) | ProviderError::RateLimited | ProviderError::Unavailable(_)
        )
    }
}

/// Failures from the canonical event sink.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Sink unreachable or answering 5xx after retries.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// Sink rejected the batch outright (4xx other than 429).
    #[error("sink rejected batch (http {status}): {body}")]
    Rejected { status: u16, body: String },

    /// A row failed to serialize. Indicates a programming error upstream.
    #[error("row encoding failed: {0}")]
    Encode(String),
}

/// Top-level error for an ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Invalid address, inverted range, non-positive batch size, and the
    /// like. Fails fast before any network call.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Write(#[from] WriteError),
}
