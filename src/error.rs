use thiserror::Error;

/// Errors surfaced by the crate's public API.
///
/// The Arena's out-of-memory path deliberately does not appear here: it aborts
/// the process rather than return a `Result`, since every caller holds a
/// partially constructed invariant at that point (see `arena::Arena::alloc`).
#[derive(Error, Debug)]
pub enum RangeTableError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("range not found for row {0:?}")]
    RangeNotFound(Vec<u8>),

    #[error("schema violation: {0}")]
    Schema(String),

    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("garbage collection error: {0}")]
    Gc(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for RangeTableError {
    fn from(e: serde_json::Error) -> Self {
        RangeTableError::Serialization(e.to_string())
    }
}

impl RangeTableError {
    /// Whether a failure carrying this reason is worth resending.
    /// `SharedMutator::retry` uses this to split `get_failed()` into the
    /// cells it keeps hammering and the ones it gives up on permanently.
    /// Only `Schema` is non-retryable: the cell itself is invalid, so
    /// resending it would just fail again. Everything else — RPC hiccups,
    /// a range that's mid-split or mid-relocation, a timeout — can succeed
    /// on a later attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RangeTableError::Schema(_))
    }
}

pub type Result<T> = std::result::Result<T, RangeTableError>;
