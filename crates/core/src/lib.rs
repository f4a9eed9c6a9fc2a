//! Core domain types for the hangar registry client.
//!
//! This crate defines the canonical data model shared by the cache and
//! client crates:
//! - Content digests and incremental hashing
//! - Model references (`host/namespace/name:tag`)
//! - Manifests and layers
//! - Byte ranges, covered-range sets, and chunksum records

pub mod chunksum;
pub mod digest;
pub mod error;
pub mod layer;
pub mod name;
pub mod range;

pub use chunksum::Chunksum;
pub use digest::{Digest, DigestHasher};
pub use error::{Error, Result};
pub use layer::{Layer, Manifest};
pub use name::ModelRef;
pub use range::{ByteRange, RangeSet};
