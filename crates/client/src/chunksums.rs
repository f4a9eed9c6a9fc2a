//! Online decoding of the chunksum stream.

use crate::context::PullContext;
use crate::error::{PullError, PullResult};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use hangar_core::Chunksum;
use tokio::sync::mpsc;

/// Incremental decoder for the chunksum wire format.
///
/// Records are newline-delimited `sha256:<hex> <start>-<end>` lines. Each
/// record surfaces as soon as its terminating newline arrives; nothing is
/// buffered beyond the current incomplete line, so a held-open response
/// drives work immediately. Records decoded before a malformed prefix
/// remain valid; the consumer treats them as committed work.
#[derive(Default)]
pub struct ChunksumDecoder {
    buf: BytesMut,
}

impl ChunksumDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes from the response body.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Decode the next complete record, if a full line is buffered.
    pub fn next_record(&mut self) -> PullResult<Option<Chunksum>> {
        let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let line = self.buf.split_to(pos + 1);
        let line = std::str::from_utf8(&line[..pos])
            .map_err(|e| PullError::Chunksums(format!("non-UTF-8 record: {e}")))?;
        let record = Chunksum::parse(line).map_err(|e| PullError::Chunksums(e.to_string()))?;
        Ok(Some(record))
    }

    /// Signal end of stream. Residual bytes mean a truncated record.
    pub fn finish(&self) -> PullResult<()> {
        if !self.buf.is_empty() {
            return Err(PullError::Chunksums(format!(
                "{} residual bytes after last record",
                self.buf.len()
            )));
        }
        Ok(())
    }
}

/// Drive a chunksum response body, forwarding records into a bounded queue.
///
/// The queue send is the backpressure point toward the worker pool: the
/// queue capacity is the concurrency cap. A receiver that goes away ends
/// the stream quietly (the consumer stopped accepting new chunks).
pub(crate) async fn run_decoder<S>(
    ctx: &PullContext,
    mut body: S,
    jobs: mpsc::Sender<Chunksum>,
) -> PullResult<()>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    let mut decoder = ChunksumDecoder::new();
    loop {
        // Bias toward data: frames already delivered are decoded and
        // handed off even when cancellation races in.
        let frame = tokio::select! {
            biased;
            frame = body.next() => frame,
            _ = ctx.cancelled() => return Err(PullError::Cancelled),
        };
        match frame {
            None => break,
            Some(Err(e)) => return Err(PullError::Transport(e)),
            Some(Ok(data)) => {
                decoder.push(&data);
                while let Some(record) = decoder.next_record()? {
                    if jobs.send(record).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
    decoder.finish()
}
