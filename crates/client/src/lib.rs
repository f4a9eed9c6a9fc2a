//! Registry pull pipeline for hangar model artifacts.
//!
//! The entry point is [`Registry::pull`]: resolve a model reference to a
//! manifest, download each referenced blob (whole or as digest-verified
//! chunks fetched with bounded parallelism), and atomically commit
//! completed blobs and the manifest index into the local cache. Pulls are
//! incrementally resumable: verified chunk ranges already in the cache are
//! skipped on a later attempt.

pub mod chunksums;
pub mod context;
pub mod error;
pub mod registry;
pub mod trace;
mod transfer;

pub use chunksums::ChunksumDecoder;
pub use context::PullContext;
pub use error::{PullError, PullResult};
pub use registry::{DEFAULT_CHUNKING_THRESHOLD, DEFAULT_MAX_STREAMS, Registry};
pub use trace::{Trace, TransferStatus};

// Re-exported so callers can wire cancellation without naming tokio-util.
pub use tokio_util::sync::CancellationToken;
