//! Error taxonomy for the ingestion core
//!
//! Every failure path below batch/chunk/message granularity is classified
//! here and handled locally; none of these terminate the process. Only a
//! configuration or initialization error is fatal at startup.

use thiserror::Error;

/// Catalog fetch/parse failures. Non-fatal: the previous symbol set stays
/// in effect.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog API returned retCode {code}: {message}")]
    Api { code: i64, message: String },

    #[error("catalog response missing field: {0}")]
    Parse(String),

    #[error("catalog fetch failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// Per-chunk subscription failures. Retried a bounded number of times, then
/// the chunk is deferred to the next full re-subscription pass.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscribe request {req_id} rejected: {reason}")]
    Rejected { req_id: String, reason: String },

    #[error("chunk of {symbols} symbols deferred after {attempts} attempts")]
    Deferred { symbols: usize, attempts: u32 },
}

/// Transport-level failures. Any of these forces the Backoff state.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("upstream sent close frame")]
    Closed,

    #[error("no pong within {0:?}")]
    PongTimeout(std::time::Duration),

    #[error("no inbound traffic within {0:?}")]
    Idle(std::time::Duration),
}

/// Per-message normalization failures. Counted and dropped; never stall the
/// receive loop.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame has no resolvable symbol")]
    MissingSymbol,

    #[error("frame has no timestamp")]
    MissingTimestamp,
}

/// Per-batch store failures. Retried with backoff, then the batch is dropped
/// and the loss counted.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}
