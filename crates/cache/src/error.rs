//! Cache error types.

use thiserror::Error;

/// Blob cache operation errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("blob {digest} incomplete: {covered} of {expected} bytes covered")]
    Incomplete {
        digest: String,
        covered: u64,
        expected: u64,
    },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("invalid write: {0}")]
    InvalidWrite(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt range state: {0}")]
    State(#[from] serde_json::Error),
}

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
