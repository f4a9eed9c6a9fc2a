//! Streaming whole-blob import.

use crate::error::{CacheError, CacheResult};
use hangar_core::{Digest, DigestHasher};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// A streaming write into the cache for a whole blob.
///
/// Bytes are hashed as they are written. [`BlobWriter::finish`] verifies
/// the size and digest, then renames the temp file to the blob's final
/// name, so unverified content is never observable under the digest.
pub struct BlobWriter {
    digest: Digest,
    file: fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
    hasher: DigestHasher,
    bytes_written: u64,
}

impl BlobWriter {
    pub(crate) async fn create(
        state_dir: PathBuf,
        digest: Digest,
        final_path: PathBuf,
    ) -> CacheResult<Self> {
        let temp_path = state_dir.join(format!(".import.{}", Uuid::new_v4()));
        let file = fs::File::create(&temp_path).await?;
        Ok(Self {
            digest,
            file,
            temp_path,
            final_path,
            hasher: Digest::hasher(),
            bytes_written: 0,
        })
    }

    /// Write a chunk of blob content.
    pub async fn write(&mut self, data: &[u8]) -> CacheResult<()> {
        self.file.write_all(data).await?;
        self.hasher.update(data);
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Number of bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Verify size and digest, then atomically promote the blob.
    ///
    /// On any failure the temp file is removed; the whole-blob path keeps
    /// no resumable state.
    pub async fn finish(mut self, expected_size: u64) -> CacheResult<u64> {
        if self.bytes_written != expected_size {
            let written = self.bytes_written;
            self.discard().await;
            return Err(CacheError::Incomplete {
                digest: self.digest.to_string(),
                covered: written,
                expected: expected_size,
            });
        }

        let actual = self.hasher.finalize();
        if actual != self.digest {
            drop(self.file);
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(CacheError::HashMismatch {
                expected: self.digest.to_string(),
                actual: actual.to_string(),
            });
        }

        self.file.sync_all().await?;
        drop(self.file);
        fs::rename(&self.temp_path, &self.final_path).await?;
        Ok(self.bytes_written)
    }

    /// Abandon the import and remove the temp file.
    pub async fn abort(mut self) {
        self.discard().await;
    }

    async fn discard(&mut self) {
        let _ = self.file.shutdown().await;
        let _ = fs::remove_file(&self.temp_path).await;
    }
}
