//! Chunk and whole-blob transfer workers.

use crate::context::PullContext;
use crate::error::{PullError, PullResult};
use crate::trace::TransferStatus;
use bytes::BytesMut;
use futures::StreamExt;
use hangar_cache::{CacheError, DiskCache};
use hangar_core::{Chunksum, Digest, Layer};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;

/// Fetches chunks of one layer from a destination URL.
///
/// One fetcher is shared by all workers of a layer; each call runs the
/// full per-chunk protocol: cached-range short-circuit, ranged GET,
/// streaming digest verification, and commit into the cache. Chunk
/// failures are terminal for the chunk and never retried here.
pub(crate) struct ChunkFetcher {
    pub http: reqwest::Client,
    pub cache: Arc<DiskCache>,
    pub layer: Layer,
    pub url: String,
}

impl ChunkFetcher {
    pub async fn fetch(&self, ctx: &PullContext, chunk: Chunksum) -> PullResult<()> {
        match self.transfer(ctx, chunk).await {
            Ok(()) => Ok(()),
            Err(err) => {
                ctx.update(&self.layer, 0, TransferStatus::Failed(&err));
                Err(err)
            }
        }
    }

    async fn transfer(&self, ctx: &PullContext, chunk: Chunksum) -> PullResult<()> {
        // Ranges already verified in the cache cost no request.
        let covered = self.cache.covered(&self.layer.digest).await?;
        if covered.contains(&chunk.range) {
            ctx.update(&self.layer, chunk.range.len(), TransferStatus::Cached);
            return Ok(());
        }

        let request = self
            .http
            .get(&self.url)
            .header(reqwest::header::RANGE, format!("bytes={}", chunk.range));
        let response = tokio::select! {
            biased;
            response = request.send() => response?,
            _ = ctx.cancelled() => return Err(PullError::Cancelled),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(read_registry_error(response).await);
        }
        // A 200 means the server ignored the range header; that only lines
        // up when the chunk spans the whole blob.
        if status == StatusCode::OK
            && !(chunk.range.start == 0 && chunk.range.len() == self.layer.size)
        {
            return Err(PullError::Registry {
                code: "RANGE_IGNORED".to_string(),
                message: format!("server returned 200 for range {}", chunk.range),
            });
        }

        let mut body = response.bytes_stream().boxed();
        let mut hasher = Digest::hasher();
        let mut buf = BytesMut::new();
        loop {
            // Bias toward data so frames that already arrived are hashed
            // and committed even when cancellation races the final read.
            let frame = tokio::select! {
                biased;
                frame = body.next() => frame,
                _ = ctx.cancelled() => return Err(PullError::Cancelled),
            };
            match frame {
                None => break,
                Some(Err(e)) => return Err(PullError::Transport(e)),
                Some(Ok(data)) => {
                    hasher.update(&data);
                    buf.extend_from_slice(&data);
                    ctx.update(&self.layer, data.len() as u64, TransferStatus::Downloaded);
                }
            }
        }

        hasher.verify(&chunk.digest).map_err(|e| match e {
            hangar_core::Error::HashMismatch { expected, actual } => {
                PullError::ChecksumMismatch { expected, actual }
            }
            other => PullError::Chunksums(other.to_string()),
        })?;

        // Only verified bytes reach the cache; a mismatch above leaves the
        // range uncovered so a retry re-downloads it.
        self.cache
            .put(&self.layer.digest, chunk.range, buf.freeze())
            .await?;
        Ok(())
    }
}

/// Download a layer in one unranged GET, verifying while streaming.
///
/// On success the blob is promoted directly: the streaming hash already
/// proved the content, so no separate finalize pass runs.
pub(crate) async fn fetch_blob(
    http: &reqwest::Client,
    cache: &DiskCache,
    ctx: &PullContext,
    layer: &Layer,
    url: &str,
) -> PullResult<()> {
    match transfer_blob(http, cache, ctx, layer, url).await {
        Ok(()) => Ok(()),
        Err(err) => {
            ctx.update(layer, 0, TransferStatus::Failed(&err));
            Err(err)
        }
    }
}

async fn transfer_blob(
    http: &reqwest::Client,
    cache: &DiskCache,
    ctx: &PullContext,
    layer: &Layer,
    url: &str,
) -> PullResult<()> {
    let response = tokio::select! {
        biased;
        response = http.get(url).send() => response?,
        _ = ctx.cancelled() => return Err(PullError::Cancelled),
    };
    if !response.status().is_success() {
        return Err(read_registry_error(response).await);
    }

    let mut writer = cache.blob_writer(&layer.digest).await?;
    let mut body = response.bytes_stream().boxed();
    loop {
        let frame = tokio::select! {
            biased;
            frame = body.next() => frame,
            _ = ctx.cancelled() => {
                writer.abort().await;
                return Err(PullError::Cancelled);
            }
        };
        match frame {
            None => break,
            Some(Err(e)) => {
                writer.abort().await;
                return Err(PullError::Transport(e));
            }
            Some(Ok(data)) => {
                if let Err(e) = writer.write(&data).await {
                    writer.abort().await;
                    return Err(PullError::Cache(e));
                }
                ctx.update(layer, data.len() as u64, TransferStatus::Downloaded);
            }
        }
    }

    writer.finish(layer.size).await.map_err(|e| match e {
        CacheError::HashMismatch { expected, actual } => {
            PullError::ChecksumMismatch { expected, actual }
        }
        other => PullError::Cache(other),
    })?;
    Ok(())
}

#[derive(Deserialize)]
struct WireErrors {
    #[serde(default)]
    errors: Vec<WireError>,
}

#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Turn a non-2xx registry response into a structured error.
pub(crate) async fn read_registry_error(response: reqwest::Response) -> PullError {
    let status = response.status();
    let body = response.bytes().await.unwrap_or_default();
    if let Ok(wire) = serde_json::from_slice::<WireErrors>(&body) {
        if let Some(first) = wire.errors.into_iter().next() {
            return PullError::Registry {
                code: first.code,
                message: first.message,
            };
        }
    }
    PullError::Registry {
        code: status.as_u16().to_string(),
        message: String::from_utf8_lossy(&body).into_owned(),
    }
}
