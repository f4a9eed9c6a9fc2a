//! Chunksum records: expected digests for sub-ranges of a blob.

use crate::{ByteRange, Digest};
use std::fmt;

/// One chunksum record: the expected digest of a byte sub-range of a blob.
///
/// The wire form is a single line, `sha256:<hex> <start>-<end>`, with an
/// inclusive decimal range.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Chunksum {
    pub digest: Digest,
    pub range: ByteRange,
}

impl Chunksum {
    /// Parse one record line (without the trailing newline).
    pub fn parse(line: &str) -> crate::Result<Self> {
        let (digest, range) = line.split_once(' ').ok_or_else(|| {
            crate::Error::InvalidRange(format!("missing separator in record: {line:?}"))
        })?;
        let digest = Digest::parse(digest)?;
        let (start, end) = range.split_once('-').ok_or_else(|| {
            crate::Error::InvalidRange(format!("missing '-' in range: {range:?}"))
        })?;
        let start = start
            .parse::<u64>()
            .map_err(|e| crate::Error::InvalidRange(format!("bad start {start:?}: {e}")))?;
        let end = end
            .parse::<u64>()
            .map_err(|e| crate::Error::InvalidRange(format!("bad end {end:?}: {e}")))?;
        Ok(Self {
            digest,
            range: ByteRange::new(start, end)?,
        })
    }
}

impl fmt::Debug for Chunksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chunksum({} {})", self.digest.short(), self.range)
    }
}
