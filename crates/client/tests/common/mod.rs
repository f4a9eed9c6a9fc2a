//! Test harness: an in-process mock registry and trace counters.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc::UnboundedReceiver;
use hangar_cache::DiskCache;
use hangar_client::{Registry, Trace, TransferStatus};
use hangar_core::{Digest, Layer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A request as seen by the mock registry.
///
/// Harness items carry `allow(dead_code)` because each test file compiles
/// `common/` separately.
#[derive(Debug)]
#[allow(dead_code)]
pub struct MockRequest {
    pub method: String,
    pub path: String,
    pub range: Option<String>,
}

/// Response body: fully buffered, or fed by the test while the pull runs.
pub enum MockBody {
    Bytes(Vec<u8>),
    Stream(UnboundedReceiver<Bytes>),
}

/// A canned response from the mock registry.
pub struct MockResponse {
    pub status: StatusCode,
    pub content_location: Option<String>,
    pub body: MockBody,
}

#[allow(dead_code)]
impl MockResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: StatusCode::OK,
            content_location: None,
            body: MockBody::Bytes(body.into()),
        }
    }

    pub fn partial_content(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: StatusCode::PARTIAL_CONTENT,
            content_location: None,
            body: MockBody::Bytes(body.into()),
        }
    }

    pub fn status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            content_location: None,
            body: MockBody::Bytes(body.into()),
        }
    }

    /// A chunksums response: records plus the blob destination URL.
    pub fn chunksums(content_location: String, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: StatusCode::OK,
            content_location: Some(content_location),
            body: MockBody::Bytes(body.into()),
        }
    }

    /// A chunksums response whose body the test feeds incrementally.
    pub fn chunksums_stream(content_location: String, rx: UnboundedReceiver<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            content_location: Some(content_location),
            body: MockBody::Stream(rx),
        }
    }
}

pub type Handler = Arc<dyn Fn(MockRequest) -> MockResponse + Send + Sync>;

async fn serve(
    State(handler): State<Handler>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request = MockRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        range: headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };
    let mock = handler(request);

    let mut builder = Response::builder().status(mock.status);
    if let Some(location) = mock.content_location {
        builder = builder.header("Content-Location", location);
    }
    let body = match mock.body {
        MockBody::Bytes(bytes) => Body::from(bytes),
        MockBody::Stream(rx) => Body::from_stream(rx.map(Ok::<_, std::io::Error>)),
    };
    builder.body(body).unwrap()
}

/// An in-process registry server bound to an ephemeral port.
pub struct MockRegistry {
    pub addr: SocketAddr,
}

impl MockRegistry {
    pub async fn spawn(handler: Handler) -> Self {
        let app = axum::Router::new().fallback(serve).with_state(handler);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr }
    }

    /// The canonical test reference served by this registry.
    pub fn reference(&self) -> String {
        format!("http://{}/library/abc", self.addr)
    }

    /// A `Content-Location` pointing back at this registry's blob endpoint.
    pub fn blob_location(&self, digest: &Digest) -> String {
        format!("http://{}/v2/library/abc/blobs/{digest}", self.addr)
    }
}

/// A registry client over a fresh temp-dir cache.
pub async fn new_client(_registry: &MockRegistry) -> (tempfile::TempDir, Registry) {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(DiskCache::open(dir.path()).await.unwrap());
    (dir, Registry::new(cache))
}

/// Manifest JSON declaring one layer holding `content`.
pub fn manifest_json(content: &[u8]) -> String {
    format!(
        r#"{{"layers":[{{"size":{},"digest":"{}"}}]}}"#,
        content.len(),
        Digest::compute(content)
    )
}

/// One chunksum record line for a sub-slice of a blob.
pub fn chunksum_line(chunk: &[u8], start: u64, end: u64) -> String {
    format!("{} {start}-{end}\n", Digest::compute(chunk))
}

/// Concurrent-safe byte counters fed by a trace observer.
#[derive(Default)]
pub struct TraceCounters {
    pub written: AtomicU64,
    pub cached: AtomicU64,
    pub failed_events: AtomicU64,
    pub cached_events: AtomicU64,
}

#[allow(dead_code)]
impl TraceCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn as_trace(self: &Arc<Self>) -> Arc<dyn Trace> {
        let counters = self.clone();
        Arc::new(
            move |_layer: &Layer, n: u64, status: TransferStatus<'_>| {
                counters.written.fetch_add(n, Ordering::SeqCst);
                match status {
                    TransferStatus::Cached => {
                        counters.cached.fetch_add(n, Ordering::SeqCst);
                        counters.cached_events.fetch_add(1, Ordering::SeqCst);
                    }
                    TransferStatus::Failed(_) => {
                        counters.failed_events.fetch_add(1, Ordering::SeqCst);
                    }
                    TransferStatus::Downloaded => {}
                }
            },
        )
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::SeqCst)
    }

    pub fn cached(&self) -> u64 {
        self.cached.load(Ordering::SeqCst)
    }
}
