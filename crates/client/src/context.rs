//! Per-pull context: cancellation plus progress observation.

use crate::trace::{Trace, TransferStatus};
use hangar_core::Layer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context threaded through every blocking step of a pull.
///
/// Cancellation is checked at each suspension point (request starts,
/// pending network reads, queue waits). Once the token fires, no new
/// chunks are dispatched, no blob is promoted, and no manifest is written;
/// the pull returns [`crate::PullError::Cancelled`]. Verified ranges
/// already committed stay in the cache, which is what makes a later pull
/// resume instead of starting over.
#[derive(Clone, Default)]
pub struct PullContext {
    cancel: CancellationToken,
    trace: Option<Arc<dyn Trace>>,
}

impl PullContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Attach a progress observer.
    pub fn with_trace(mut self, trace: Arc<dyn Trace>) -> Self {
        self.trace = Some(trace);
        self
    }

    /// The cancellation token driving this pull.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolve when the pull is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub(crate) fn update(&self, layer: &Layer, n: u64, status: TransferStatus<'_>) {
        if let Some(trace) = &self.trace {
            trace.update(layer, n, status);
        }
    }
}
