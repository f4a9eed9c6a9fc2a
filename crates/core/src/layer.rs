//! Manifest and layer types as read off the registry wire.

use crate::Digest;
use serde::{Deserialize, Serialize};

/// A blob referenced by a manifest together with its expected size.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub digest: Digest,
    pub size: u64,
    #[serde(
        default,
        rename = "mediaType",
        skip_serializing_if = "Option::is_none"
    )]
    pub media_type: Option<String>,
}

impl Layer {
    pub fn new(digest: Digest, size: u64) -> Self {
        Self {
            digest,
            size,
            media_type: None,
        }
    }
}

/// A manifest: the ordered list of layers making up a model, plus an
/// optional config blob.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Layer>,
}

impl Manifest {
    /// Every blob the manifest references: layers in order, then config.
    pub fn blobs(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().chain(self.config.as_ref())
    }

    /// Total byte size across all referenced blobs.
    pub fn total_size(&self) -> u64 {
        self.blobs().map(|l| l.size).sum()
    }
}
