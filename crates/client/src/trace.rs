//! Progress observation for pulls.

use crate::error::PullError;
use hangar_core::Layer;

/// Status attached to one progress delta.
#[derive(Debug)]
pub enum TransferStatus<'a> {
    /// The bytes arrived from the network.
    Downloaded,
    /// The bytes were satisfied from the local cache with no network use.
    Cached,
    /// The delta's transfer failed; `n` is zero.
    Failed(&'a PullError),
}

impl TransferStatus<'_> {
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Observer invoked for every byte delta of a pull.
///
/// For each layer, deltas are non-negative and sum to the layer size on
/// success. Callbacks run on worker tasks and interleave freely across
/// concurrent chunks, so implementations must tolerate concurrent
/// invocation; atomic counters are the usual shape.
pub trait Trace: Send + Sync {
    fn update(&self, layer: &Layer, n: u64, status: TransferStatus<'_>);
}

impl<F> Trace for F
where
    F: Fn(&Layer, u64, TransferStatus<'_>) + Send + Sync,
{
    fn update(&self, layer: &Layer, n: u64, status: TransferStatus<'_>) {
        self(layer, n, status)
    }
}
