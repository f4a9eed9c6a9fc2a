//! Filesystem-backed blob cache.

use crate::error::{CacheError, CacheResult};
use crate::writer::BlobWriter;
use bytes::Bytes;
use futures::Stream;
use hangar_core::{ByteRange, Digest, Manifest, ModelRef, RangeSet};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::instrument;
use uuid::Uuid;

/// Chunk size for streaming reads and finalize re-hashing (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// A boxed stream of bytes for streaming blob reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = CacheResult<Bytes>> + Send>>;

/// Content-addressed blob store rooted at a local directory.
///
/// Layout:
/// - `blobs/sha256-<hex>` — complete, verified blobs
/// - `state/sha256-<hex>.partial` — staging file for an in-progress blob
/// - `state/sha256-<hex>.ranges` — verified covered ranges of the staging file
/// - `manifests/<host>/<namespace>/<name>/<tag>` — manifest index entries
///
/// Writes to the same blob serialize on a per-blob lock; writes to
/// different blobs proceed independently. Every promotion to a final name
/// is a filesystem rename.
pub struct DiskCache {
    root: PathBuf,
    locks: Mutex<HashMap<Digest, Arc<tokio::sync::Mutex<()>>>>,
}

impl DiskCache {
    /// Open a cache rooted at a directory, creating the layout if needed.
    ///
    /// Fails if the root is not writable.
    pub async fn open(root: impl AsRef<Path>) -> CacheResult<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in ["blobs", "state", "manifests"] {
            fs::create_dir_all(root.join(dir)).await?;
        }

        // Probe write so an unwritable root fails at open, not mid-pull.
        let probe = root.join(format!(".probe.{}", Uuid::new_v4()));
        fs::write(&probe, b"").await?;
        fs::remove_file(&probe).await?;

        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root
            .join("blobs")
            .join(format!("{}-{}", digest.algorithm().as_str(), digest.to_hex()))
    }

    fn staging_path(&self, digest: &Digest) -> PathBuf {
        self.root
            .join("state")
            .join(format!("{}-{}.partial", digest.algorithm().as_str(), digest.to_hex()))
    }

    fn ranges_path(&self, digest: &Digest) -> PathBuf {
        self.root
            .join("state")
            .join(format!("{}-{}.ranges", digest.algorithm().as_str(), digest.to_hex()))
    }

    fn manifest_path(&self, name: &ModelRef) -> PathBuf {
        self.root
            .join("manifests")
            .join(name.host())
            .join(name.namespace())
            .join(name.name())
            .join(name.tag())
    }

    fn blob_lock(&self, digest: &Digest) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("blob lock map poisoned");
        locks.entry(*digest).or_default().clone()
    }

    /// Write a file atomically: temp name, fsync, rename.
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> CacheResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp = path.with_extension(format!("tmp.{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp, path).await?;
        Ok(())
    }

    async fn load_ranges(&self, digest: &Digest) -> CacheResult<RangeSet> {
        match fs::read(self.ranges_path(digest)).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RangeSet::new()),
            Err(e) => Err(CacheError::Io(e)),
        }
    }

    /// Size of a complete blob, or `NotFound` if absent or still partial.
    #[instrument(skip(self), fields(digest = %digest.short()))]
    pub async fn stat(&self, digest: &Digest) -> CacheResult<u64> {
        let meta = fs::metadata(self.blob_path(digest)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CacheError::NotFound(digest.to_string())
            } else {
                CacheError::Io(e)
            }
        })?;
        Ok(meta.len())
    }

    /// Read a complete blob into memory.
    #[instrument(skip(self), fields(digest = %digest.short()))]
    pub async fn get(&self, digest: &Digest) -> CacheResult<Bytes> {
        let data = fs::read(self.blob_path(digest)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CacheError::NotFound(digest.to_string())
            } else {
                CacheError::Io(e)
            }
        })?;
        Ok(Bytes::from(data))
    }

    /// Stream a complete blob without loading it whole.
    #[instrument(skip(self), fields(digest = %digest.short()))]
    pub async fn get_stream(&self, digest: &Digest) -> CacheResult<ByteStream> {
        let file = fs::File::open(self.blob_path(digest)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CacheError::NotFound(digest.to_string())
            } else {
                CacheError::Io(e)
            }
        })?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    /// Commit one verified chunk into the staging file for a blob.
    ///
    /// The caller must have verified `data` against the chunk's expected
    /// digest; the range is recorded as covered only after the bytes are
    /// durably in the staging file. Re-putting an already covered range is
    /// a no-op. Overlapping writes with different bytes are the caller's
    /// bug to prevent (ranges come from a disjoint chunk plan).
    #[instrument(skip(self, data), fields(digest = %digest.short(), range = %range, len = data.len()))]
    pub async fn put(&self, digest: &Digest, range: ByteRange, data: Bytes) -> CacheResult<()> {
        if data.len() as u64 != range.len() {
            return Err(CacheError::InvalidWrite(format!(
                "range {} is {} bytes but got {}",
                range,
                range.len(),
                data.len()
            )));
        }

        let lock = self.blob_lock(digest);
        let _guard = lock.lock().await;

        if fs::try_exists(self.blob_path(digest)).await? {
            return Ok(());
        }

        let mut ranges = self.load_ranges(digest).await?;
        if ranges.contains(&range) {
            return Ok(());
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.staging_path(digest))
            .await?;
        file.seek(std::io::SeekFrom::Start(range.start)).await?;
        file.write_all(&data).await?;
        // The sidecar must never claim coverage of bytes that are not
        // durable yet.
        file.sync_all().await?;

        ranges.insert(range);
        self.write_atomic(&self.ranges_path(digest), &serde_json::to_vec(&ranges)?)
            .await
    }

    /// The verified covered ranges of a partial blob.
    ///
    /// Empty for absent blobs; does not report complete blobs (use
    /// [`DiskCache::stat`] for those).
    pub async fn covered(&self, digest: &Digest) -> CacheResult<RangeSet> {
        self.load_ranges(digest).await
    }

    /// Verify a fully covered staging file and promote it to a complete blob.
    ///
    /// Returns `Incomplete` when the covered ranges do not span
    /// `[0, expected_size - 1]`, and `HashMismatch` when the staged content
    /// does not hash to the blob digest. Both leave the partial state on
    /// disk: a later pull re-downloads only what is missing or corrupt.
    #[instrument(skip(self), fields(digest = %digest.short(), expected_size))]
    pub async fn finalize(&self, digest: &Digest, expected_size: u64) -> CacheResult<()> {
        let lock = self.blob_lock(digest);
        let _guard = lock.lock().await;

        if fs::try_exists(self.blob_path(digest)).await? {
            return Ok(());
        }

        let ranges = self.load_ranges(digest).await?;
        if !ranges.covers(expected_size) {
            return Err(CacheError::Incomplete {
                digest: digest.to_string(),
                covered: ranges.total(),
                expected: expected_size,
            });
        }

        let staging = self.staging_path(digest);
        let mut file = fs::File::open(&staging).await?;
        let mut hasher = Digest::hasher();
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let actual = hasher.finalize();
        if &actual != digest {
            return Err(CacheError::HashMismatch {
                expected: digest.to_string(),
                actual: actual.to_string(),
            });
        }

        fs::rename(&staging, self.blob_path(digest)).await?;
        let _ = fs::remove_file(self.ranges_path(digest)).await;
        self.locks
            .lock()
            .expect("blob lock map poisoned")
            .remove(digest);
        Ok(())
    }

    /// Start a streaming whole-blob import.
    ///
    /// The writer hashes as bytes arrive and promotes the blob on
    /// [`BlobWriter::finish`], so no separate finalize pass is needed.
    pub async fn blob_writer(&self, digest: &Digest) -> CacheResult<BlobWriter> {
        BlobWriter::create(self.root.join("state"), *digest, self.blob_path(digest)).await
    }

    /// Store a manifest index entry for a reference.
    ///
    /// Only legal once every referenced blob is complete; the pull
    /// coordinator enforces that ordering. The raw manifest bytes are kept
    /// exactly as served.
    #[instrument(skip(self, raw), fields(name = %name))]
    pub async fn put_manifest(&self, name: &ModelRef, raw: &[u8]) -> CacheResult<()> {
        self.write_atomic(&self.manifest_path(name), raw).await
    }

    /// Look up a previously stored manifest.
    #[instrument(skip(self), fields(name = %name))]
    pub async fn resolve(&self, name: &ModelRef) -> CacheResult<Manifest> {
        let data = fs::read(self.manifest_path(name)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CacheError::NotFound(name.to_string())
            } else {
                CacheError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Enumerate stored manifest references as `host/namespace/name:tag`.
    pub async fn manifests(&self) -> CacheResult<Vec<String>> {
        let base = self.root.join("manifests");
        let mut results = Vec::new();
        let mut stack = vec![base.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(CacheError::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() {
                    if let Ok(rel) = path.strip_prefix(&base) {
                        let parts: Vec<_> = rel
                            .components()
                            .map(|c| c.as_os_str().to_string_lossy().to_string())
                            .collect();
                        if let [host, namespace, name, tag] = parts.as_slice() {
                            results.push(format!("{host}/{namespace}/{name}:{tag}"));
                        }
                    }
                }
            }
        }
        results.sort();
        Ok(results)
    }

    /// Remove a manifest index entry. Blobs are left for external GC.
    ///
    /// Returns whether an entry existed.
    #[instrument(skip(self), fields(name = %name))]
    pub async fn unlink(&self, name: &ModelRef) -> CacheResult<bool> {
        match fs::remove_file(self.manifest_path(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Io(e)),
        }
    }
}
