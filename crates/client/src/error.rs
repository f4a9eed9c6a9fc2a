//! Pull pipeline error types.

use hangar_cache::CacheError;
use thiserror::Error;

/// Errors surfaced by a pull.
///
/// Errors are never swallowed: partial progress stays in the cache for
/// every kind except checksum mismatches, whose offending ranges are never
/// recorded as covered in the first place.
#[derive(Debug, Error)]
pub enum PullError {
    /// The manifest endpoint reported the model unknown.
    #[error("model not found")]
    ModelNotFound,

    /// A structured non-2xx registry response (e.g. `BLOB_UNKNOWN`).
    #[error("registry error ({code}): {message}")]
    Registry { code: String, message: String },

    /// The manifest body was not valid manifest JSON.
    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// The chunksum stream carried a malformed record.
    #[error("invalid chunksum stream: {0}")]
    Chunksums(String),

    /// A chunk or blob hashed to something other than its declared digest.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The chunk plan ended with byte gaps; the partial blob is retained.
    #[error("blob {digest} incomplete: {covered} of {expected} bytes covered")]
    Incomplete {
        digest: String,
        covered: u64,
        expected: u64,
    },

    /// The caller cancelled the pull; partial state is preserved.
    #[error("pull cancelled")]
    Cancelled,

    /// Network I/O failure. There is no internal retry.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The model reference did not parse.
    #[error(transparent)]
    Reference(hangar_core::Error),

    /// A blob cache operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Result type for pull operations.
pub type PullResult<T> = std::result::Result<T, PullError>;
