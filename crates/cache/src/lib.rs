//! Local content-addressed blob cache.
//!
//! Blobs are stored under their full-content digest. Incomplete blobs live
//! in a staging area with a sidecar recording the verified byte ranges, so
//! an interrupted pull resumes where it left off. Completed blobs and
//! manifest index entries are promoted by atomic rename only.

pub mod disk;
pub mod error;
pub mod writer;

pub use disk::{ByteStream, DiskCache};
pub use error::{CacheError, CacheResult};
pub use writer::BlobWriter;
