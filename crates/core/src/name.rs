//! Model reference parsing.

use serde::{Deserialize, Serialize};
use std::fmt;

const DEFAULT_SCHEME: &str = "https";
const DEFAULT_TAG: &str = "latest";

/// A parsed model reference: `[scheme://]host/namespace/name[:tag]`.
///
/// A missing tag defaults to `latest` and a missing scheme to `https`.
/// The host may carry a port (`localhost:8080/library/abc`). The display
/// form, `host/namespace/name:tag`, is the manifest index key.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    scheme: String,
    host: String,
    namespace: String,
    name: String,
    tag: String,
}

impl ModelRef {
    /// Parse a reference string.
    pub fn parse(reference: &str) -> crate::Result<Self> {
        let (scheme, rest) = match reference.split_once("://") {
            Some((s, rest)) => {
                if s != "http" && s != "https" {
                    return Err(crate::Error::InvalidName(format!(
                        "unsupported scheme: {s}"
                    )));
                }
                (s.to_string(), rest)
            }
            None => (DEFAULT_SCHEME.to_string(), reference),
        };

        let mut parts = rest.split('/');
        let host = parts.next().unwrap_or_default();
        let namespace = parts.next().unwrap_or_default();
        let model = parts.next().unwrap_or_default();
        if parts.next().is_some() {
            return Err(crate::Error::InvalidName(format!(
                "too many path segments: {reference}"
            )));
        }

        // The tag colon lives in the last segment; the host may contain a
        // port colon of its own.
        let (name, tag) = match model.split_once(':') {
            Some((name, tag)) => (name, tag),
            None => (model, DEFAULT_TAG),
        };

        for (field, value) in [
            ("host", host),
            ("namespace", namespace),
            ("name", name),
            ("tag", tag),
        ] {
            if value.is_empty() {
                return Err(crate::Error::InvalidName(format!(
                    "empty {field} in reference: {reference}"
                )));
            }
            // Segments become manifest index path components.
            if value == "." || value == ".." || value.contains('\\') {
                return Err(crate::Error::InvalidName(format!(
                    "unsafe {field} in reference: {reference}"
                )));
            }
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Base URL of the registry serving this reference.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// URL of the manifest for this reference.
    pub fn manifest_url(&self) -> String {
        format!(
            "{}/v2/{}/{}/manifests/{}",
            self.base_url(),
            self.namespace,
            self.name,
            self.tag
        )
    }

    /// URL of a blob within this reference's repository.
    pub fn blob_url(&self, digest: &crate::Digest) -> String {
        format!(
            "{}/v2/{}/{}/blobs/{digest}",
            self.base_url(),
            self.namespace,
            self.name
        )
    }

    /// URL of the chunksum listing for a blob in this repository.
    pub fn chunksums_url(&self, digest: &crate::Digest) -> String {
        format!(
            "{}/v2/{}/{}/chunksums/{digest}",
            self.base_url(),
            self.namespace,
            self.name
        )
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}:{}",
            self.host, self.namespace, self.name, self.tag
        )
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelRef({self})")
    }
}
