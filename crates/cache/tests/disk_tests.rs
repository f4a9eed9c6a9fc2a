//! Integration tests for the disk blob cache.

use bytes::Bytes;
use futures::StreamExt;
use hangar_cache::{CacheError, DiskCache};
use hangar_core::{ByteRange, Digest, Layer, Manifest, ModelRef, RangeSet};

fn range(start: u64, end: u64) -> ByteRange {
    ByteRange::new(start, end).unwrap()
}

async fn open_cache() -> (tempfile::TempDir, DiskCache) {
    let dir = tempfile::tempdir().unwrap();
    let cache = DiskCache::open(dir.path()).await.unwrap();
    (dir, cache)
}

#[tokio::test]
async fn test_put_finalize_get_roundtrip() {
    let (_dir, cache) = open_cache().await;
    let digest = Digest::compute(b"abc");

    cache
        .put(&digest, range(0, 1), Bytes::from_static(b"ab"))
        .await
        .unwrap();
    cache
        .put(&digest, range(2, 2), Bytes::from_static(b"c"))
        .await
        .unwrap();

    let covered = cache.covered(&digest).await.unwrap();
    assert!(covered.covers(3));

    cache.finalize(&digest, 3).await.unwrap();
    assert_eq!(cache.stat(&digest).await.unwrap(), 3);
    assert_eq!(cache.get(&digest).await.unwrap(), Bytes::from_static(b"abc"));
}

#[tokio::test]
async fn test_get_stream_yields_full_content() {
    let (_dir, cache) = open_cache().await;
    let digest = Digest::compute(b"abc");
    cache
        .put(&digest, range(0, 2), Bytes::from_static(b"abc"))
        .await
        .unwrap();
    cache.finalize(&digest, 3).await.unwrap();

    let mut stream = cache.get_stream(&digest).await.unwrap();
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(out, b"abc");
}

#[tokio::test]
async fn test_get_absent_blob_is_not_found() {
    let (_dir, cache) = open_cache().await;
    let digest = Digest::compute(b"missing");
    assert!(matches!(
        cache.get(&digest).await,
        Err(CacheError::NotFound(_))
    ));
    assert!(matches!(
        cache.stat(&digest).await,
        Err(CacheError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_partial_blob_is_not_gettable() {
    let (_dir, cache) = open_cache().await;
    let digest = Digest::compute(b"abc");
    cache
        .put(&digest, range(0, 1), Bytes::from_static(b"ab"))
        .await
        .unwrap();
    // Not promoted yet: absent under its final name.
    assert!(matches!(
        cache.get(&digest).await,
        Err(CacheError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_finalize_with_gap_is_incomplete() {
    let (_dir, cache) = open_cache().await;
    let digest = Digest::compute(b"abc");
    cache
        .put(&digest, range(0, 1), Bytes::from_static(b"ab"))
        .await
        .unwrap();

    let err = cache.finalize(&digest, 3).await.unwrap_err();
    match err {
        CacheError::Incomplete {
            covered, expected, ..
        } => {
            assert_eq!(covered, 2);
            assert_eq!(expected, 3);
        }
        other => panic!("expected Incomplete, got {other:?}"),
    }

    // The covered range survives for a later resumed pull.
    let covered = cache.covered(&digest).await.unwrap();
    assert!(covered.contains(&range(0, 1)));
}

#[tokio::test]
async fn test_finalize_hash_mismatch_keeps_partial() {
    let (_dir, cache) = open_cache().await;
    // Declare the blob as "abc" but stage different content of equal size.
    let digest = Digest::compute(b"abc");
    cache
        .put(&digest, range(0, 2), Bytes::from_static(b"abx"))
        .await
        .unwrap();

    let err = cache.finalize(&digest, 3).await.unwrap_err();
    assert!(matches!(err, CacheError::HashMismatch { .. }));

    // Staging state is retained, and the blob was never promoted.
    assert!(!cache.covered(&digest).await.unwrap().is_empty());
    assert!(matches!(
        cache.get(&digest).await,
        Err(CacheError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_put_is_idempotent_per_range() {
    let (_dir, cache) = open_cache().await;
    let digest = Digest::compute(b"abc");
    cache
        .put(&digest, range(0, 2), Bytes::from_static(b"abc"))
        .await
        .unwrap();
    // Re-putting the same range is a no-op.
    cache
        .put(&digest, range(0, 2), Bytes::from_static(b"abc"))
        .await
        .unwrap();
    cache.finalize(&digest, 3).await.unwrap();
    assert_eq!(cache.get(&digest).await.unwrap(), Bytes::from_static(b"abc"));
}

#[tokio::test]
async fn test_put_rejects_length_mismatch() {
    let (_dir, cache) = open_cache().await;
    let digest = Digest::compute(b"abc");
    let err = cache
        .put(&digest, range(0, 2), Bytes::from_static(b"ab"))
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::InvalidWrite(_)));
}

#[tokio::test]
async fn test_put_after_complete_is_noop() {
    let (_dir, cache) = open_cache().await;
    let digest = Digest::compute(b"abc");
    cache
        .put(&digest, range(0, 2), Bytes::from_static(b"abc"))
        .await
        .unwrap();
    cache.finalize(&digest, 3).await.unwrap();
    cache.finalize(&digest, 3).await.unwrap(); // idempotent

    cache
        .put(&digest, range(0, 1), Bytes::from_static(b"ab"))
        .await
        .unwrap();
    assert_eq!(cache.get(&digest).await.unwrap(), Bytes::from_static(b"abc"));
}

#[tokio::test]
async fn test_concurrent_disjoint_puts() {
    let (_dir, cache) = open_cache().await;
    let content = b"abcdefgh";
    let digest = Digest::compute(content);

    let puts = (0..4u64).map(|i| {
        let start = i * 2;
        cache.put(
            &digest,
            range(start, start + 1),
            Bytes::copy_from_slice(&content[start as usize..start as usize + 2]),
        )
    });
    for result in futures::future::join_all(puts).await {
        result.unwrap();
    }

    cache.finalize(&digest, 8).await.unwrap();
    assert_eq!(
        cache.get(&digest).await.unwrap(),
        Bytes::copy_from_slice(content)
    );
}

#[tokio::test]
async fn test_blob_writer_verifies_and_promotes() {
    let (_dir, cache) = open_cache().await;
    let digest = Digest::compute(b"hello world");

    let mut writer = cache.blob_writer(&digest).await.unwrap();
    writer.write(b"hello ").await.unwrap();
    writer.write(b"world").await.unwrap();
    assert_eq!(writer.bytes_written(), 11);
    writer.finish(11).await.unwrap();

    assert_eq!(
        cache.get(&digest).await.unwrap(),
        Bytes::from_static(b"hello world")
    );
}

#[tokio::test]
async fn test_blob_writer_rejects_size_mismatch() {
    let (_dir, cache) = open_cache().await;
    let digest = Digest::compute(b"hello");
    let mut writer = cache.blob_writer(&digest).await.unwrap();
    writer.write(b"hel").await.unwrap();
    let err = writer.finish(5).await.unwrap_err();
    assert!(matches!(err, CacheError::Incomplete { .. }));
    assert!(matches!(
        cache.get(&digest).await,
        Err(CacheError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_blob_writer_rejects_digest_mismatch() {
    let (_dir, cache) = open_cache().await;
    let digest = Digest::compute(b"hello");
    let mut writer = cache.blob_writer(&digest).await.unwrap();
    writer.write(b"jello").await.unwrap();
    let err = writer.finish(5).await.unwrap_err();
    assert!(matches!(err, CacheError::HashMismatch { .. }));
    assert!(matches!(
        cache.get(&digest).await,
        Err(CacheError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_blob_writer_abort_leaves_nothing() {
    let (_dir, cache) = open_cache().await;
    let digest = Digest::compute(b"hello");
    let mut writer = cache.blob_writer(&digest).await.unwrap();
    writer.write(b"hel").await.unwrap();
    writer.abort().await;
    assert!(matches!(
        cache.get(&digest).await,
        Err(CacheError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_manifest_put_resolve_unlink() {
    let (_dir, cache) = open_cache().await;
    let name = ModelRef::parse("http://o.com/library/abc").unwrap();

    assert!(matches!(
        cache.resolve(&name).await,
        Err(CacheError::NotFound(_))
    ));

    let manifest = Manifest {
        layers: vec![Layer::new(Digest::compute(b"abc"), 3)],
        config: None,
    };
    let raw = serde_json::to_vec(&manifest).unwrap();
    cache.put_manifest(&name, &raw).await.unwrap();

    let resolved = cache.resolve(&name).await.unwrap();
    assert_eq!(resolved, manifest);

    assert_eq!(cache.manifests().await.unwrap(), vec![name.to_string()]);

    assert!(cache.unlink(&name).await.unwrap());
    assert!(!cache.unlink(&name).await.unwrap());
    assert!(matches!(
        cache.resolve(&name).await,
        Err(CacheError::NotFound(_))
    ));
    assert!(cache.manifests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_covered_reports_coalesced_ranges() {
    let (_dir, cache) = open_cache().await;
    let digest = Digest::compute(b"abcd");
    cache
        .put(&digest, range(0, 0), Bytes::from_static(b"a"))
        .await
        .unwrap();
    cache
        .put(&digest, range(1, 1), Bytes::from_static(b"b"))
        .await
        .unwrap();

    let covered = cache.covered(&digest).await.unwrap();
    let mut expected = RangeSet::new();
    expected.insert(range(0, 1));
    assert_eq!(covered, expected);
}
