//! Registry client and pull coordination.

use crate::chunksums::run_decoder;
use crate::context::PullContext;
use crate::error::{PullError, PullResult};
use crate::trace::TransferStatus;
use crate::transfer::{ChunkFetcher, fetch_blob, read_registry_error};
use bytes::Bytes;
use futures::StreamExt;
use hangar_cache::{CacheError, DiskCache};
use hangar_core::{Chunksum, Layer, Manifest, ModelRef};
use reqwest::StatusCode;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::instrument;

/// Default per-layer concurrency cap for ranged chunk requests.
pub const DEFAULT_MAX_STREAMS: usize = 8;

/// Default blob-size floor for the chunked path: smaller blobs download in
/// one unranged GET.
pub const DEFAULT_CHUNKING_THRESHOLD: u64 = 64 * 1024 * 1024;

/// A registry client bound to a local blob cache.
///
/// All knobs are plain fields: inject a custom [`reqwest::Client`] for
/// testing or special dialing, lower `chunking_threshold` to force the
/// chunked path, cap `max_streams` to bound per-layer parallelism.
#[derive(Clone)]
pub struct Registry {
    pub http: reqwest::Client,
    pub cache: Arc<DiskCache>,
    pub max_streams: usize,
    pub chunking_threshold: u64,
}

impl Registry {
    pub fn new(cache: Arc<DiskCache>) -> Self {
        Self {
            http: reqwest::Client::new(),
            cache,
            max_streams: DEFAULT_MAX_STREAMS,
            chunking_threshold: DEFAULT_CHUNKING_THRESHOLD,
        }
    }

    /// Pull a model by reference into the cache.
    ///
    /// Fetches the manifest, materializes every referenced blob, then
    /// writes the manifest index entry. The index write happens only after
    /// every blob is complete, so a resolvable reference always has all
    /// its bytes.
    #[instrument(skip(self, ctx), err)]
    pub async fn pull(&self, ctx: &PullContext, reference: &str) -> PullResult<()> {
        let name = ModelRef::parse(reference).map_err(PullError::Reference)?;
        let (manifest, raw) = self.fetch_manifest(ctx, &name).await?;
        tracing::debug!(
            name = %name,
            layers = manifest.layers.len(),
            total = manifest.total_size(),
            "manifest resolved"
        );

        for layer in manifest.blobs() {
            self.pull_layer(ctx, &name, layer).await?;
        }

        if ctx.is_cancelled() {
            return Err(PullError::Cancelled);
        }
        self.cache.put_manifest(&name, &raw).await?;
        Ok(())
    }

    async fn fetch_manifest(
        &self,
        ctx: &PullContext,
        name: &ModelRef,
    ) -> PullResult<(Manifest, Bytes)> {
        let response = tokio::select! {
            biased;
            response = self.http.get(name.manifest_url()).send() => response?,
            _ = ctx.cancelled() => return Err(PullError::Cancelled),
        };

        let status = response.status();
        if !status.is_success() {
            let err = read_registry_error(response).await;
            if status == StatusCode::NOT_FOUND {
                if let PullError::Registry { ref code, .. } = err {
                    if code.as_str() == "MANIFEST_UNKNOWN" {
                        return Err(PullError::ModelNotFound);
                    }
                }
            }
            return Err(err);
        }

        let raw = response.bytes().await?;
        let manifest: Manifest = serde_json::from_slice(&raw)?;
        Ok((manifest, raw))
    }

    async fn pull_layer(
        &self,
        ctx: &PullContext,
        name: &ModelRef,
        layer: &Layer,
    ) -> PullResult<()> {
        if let Ok(size) = self.cache.stat(&layer.digest).await {
            if size == layer.size {
                ctx.update(layer, layer.size, TransferStatus::Cached);
                return Ok(());
            }
        }

        let blob_url = name.blob_url(&layer.digest);
        if layer.size < self.chunking_threshold {
            return fetch_blob(&self.http, &self.cache, ctx, layer, &blob_url).await;
        }

        match self.open_chunksums(ctx, name, layer).await? {
            Some((dest_url, response)) => self.pull_chunked(ctx, layer, dest_url, response).await,
            // No usable chunksum endpoint for this blob.
            None => fetch_blob(&self.http, &self.cache, ctx, layer, &blob_url).await,
        }
    }

    /// Open the chunksum stream for a layer.
    ///
    /// Returns the destination URL for ranged GETs (from `Content-Location`)
    /// and the undrained response. `None` means the chunked path is
    /// unavailable and the caller should fall back to a whole-blob GET.
    async fn open_chunksums(
        &self,
        ctx: &PullContext,
        name: &ModelRef,
        layer: &Layer,
    ) -> PullResult<Option<(String, reqwest::Response)>> {
        let response = tokio::select! {
            biased;
            response = self.http.get(name.chunksums_url(&layer.digest)).send() => response?,
            _ = ctx.cancelled() => return Err(PullError::Cancelled),
        };

        if !response.status().is_success() {
            tracing::debug!(
                digest = %layer.digest.short(),
                status = %response.status(),
                "chunksums unavailable, falling back to whole-blob download"
            );
            return Ok(None);
        }

        let Some(dest) = response
            .headers()
            .get("Content-Location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
        else {
            tracing::warn!(
                digest = %layer.digest.short(),
                "chunksums response missing Content-Location, falling back"
            );
            return Ok(None);
        };

        Ok(Some((dest, response)))
    }

    /// Drive one layer through the chunked pipeline.
    ///
    /// A decoder task feeds records into a queue bounded at `max_streams`;
    /// the dispatch loop below drains it, holding a semaphore permit per
    /// in-flight chunk. Chunk failures do not stop the remaining chunks;
    /// the first error surfaces after the layer drains. A decoder failure
    /// degrades to a coverage check: the blob finalizes if the stream
    /// already described all of it, and reports `Incomplete` otherwise.
    async fn pull_chunked(
        &self,
        ctx: &PullContext,
        layer: &Layer,
        dest_url: String,
        response: reqwest::Response,
    ) -> PullResult<()> {
        let streams = self.max_streams.max(1);
        let (jobs_tx, mut jobs_rx) = mpsc::channel::<Chunksum>(streams);
        let decoder_ctx = ctx.clone();
        let decoder = tokio::spawn(async move {
            run_decoder(&decoder_ctx, response.bytes_stream().boxed(), jobs_tx).await
        });

        let fetcher = Arc::new(ChunkFetcher {
            http: self.http.clone(),
            cache: self.cache.clone(),
            layer: layer.clone(),
            url: dest_url,
        });
        let semaphore = Arc::new(Semaphore::new(streams));
        let mut workers: JoinSet<PullResult<()>> = JoinSet::new();
        let mut first_err: Option<PullError> = None;

        'dispatch: loop {
            // Cancellation wins over queued records: stop accepting chunks.
            let chunk = tokio::select! {
                biased;
                _ = ctx.cancelled() => break 'dispatch,
                chunk = jobs_rx.recv() => match chunk {
                    Some(chunk) => chunk,
                    None => break 'dispatch,
                },
            };
            let permit = tokio::select! {
                biased;
                _ = ctx.cancelled() => break 'dispatch,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break 'dispatch,
                },
            };
            let fetcher = fetcher.clone();
            let worker_ctx = ctx.clone();
            workers.spawn(async move {
                let _permit = permit;
                fetcher.fetch(&worker_ctx, chunk).await
            });
        }
        drop(jobs_rx);

        // In-flight chunks run to completion; bytes that already arrived
        // are verified and committed, which is what a resumed pull reuses.
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
                Err(join_err) => {
                    if join_err.is_panic() {
                        std::panic::resume_unwind(join_err.into_panic());
                    }
                }
            }
        }

        let decode_result = match decoder.await {
            Ok(result) => result,
            Err(join_err) => {
                if join_err.is_panic() {
                    std::panic::resume_unwind(join_err.into_panic());
                }
                Ok(())
            }
        };

        if ctx.is_cancelled() {
            return Err(PullError::Cancelled);
        }
        if let Some(err) = first_err {
            return Err(err);
        }
        if let Err(err) = decode_result {
            // A broken chunk plan is only fatal if it left gaps; the
            // coverage check below settles that.
            tracing::warn!(digest = %layer.digest.short(), error = %err, "chunksum stream failed");
        }

        let covered = self.cache.covered(&layer.digest).await?;
        if !covered.covers(layer.size) {
            return Err(PullError::Incomplete {
                digest: layer.digest.to_string(),
                covered: covered.total(),
                expected: layer.size,
            });
        }

        self.cache
            .finalize(&layer.digest, layer.size)
            .await
            .map_err(|e| match e {
                CacheError::HashMismatch { expected, actual } => {
                    PullError::ChecksumMismatch { expected, actual }
                }
                CacheError::Incomplete {
                    digest,
                    covered,
                    expected,
                } => PullError::Incomplete {
                    digest,
                    covered,
                    expected,
                },
                other => PullError::Cache(other),
            })
    }
}
