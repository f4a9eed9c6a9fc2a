//! Byte ranges and covered-range bookkeeping for partial blobs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive byte range `[start, end]` within a blob.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Create a range, validating `start <= end`.
    pub fn new(start: u64, end: u64) -> crate::Result<Self> {
        if end < start {
            return Err(crate::Error::InvalidRange(format!(
                "end ({end}) < start ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Number of bytes covered (both ends inclusive).
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl fmt::Debug for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteRange({self})")
    }
}

/// A sorted, coalesced set of byte ranges.
///
/// Tracks which parts of a partial blob have been written and verified.
/// Inserting a range merges it with any overlapping or adjacent entries,
/// so a fully covered blob collapses to a single range.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSet {
    ranges: Vec<ByteRange>,
}

impl RangeSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no bytes are covered.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Insert a range, merging with overlapping or adjacent entries.
    pub fn insert(&mut self, range: ByteRange) {
        let mut merged = range;
        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        let mut placed = false;
        for &r in &self.ranges {
            if r.end.saturating_add(1) < merged.start {
                out.push(r);
            } else if merged.end.saturating_add(1) < r.start {
                if !placed {
                    out.push(merged);
                    placed = true;
                }
                out.push(r);
            } else {
                merged = ByteRange {
                    start: merged.start.min(r.start),
                    end: merged.end.max(r.end),
                };
            }
        }
        if !placed {
            out.push(merged);
        }
        self.ranges = out;
    }

    /// Whether the given range is entirely covered.
    pub fn contains(&self, range: &ByteRange) -> bool {
        self.ranges
            .iter()
            .any(|r| r.start <= range.start && range.end <= r.end)
    }

    /// Total number of covered bytes.
    pub fn total(&self) -> u64 {
        self.ranges.iter().map(ByteRange::len).sum()
    }

    /// Whether the set covers exactly `[0, size-1]`.
    ///
    /// A zero-sized blob is trivially covered.
    pub fn covers(&self, size: u64) -> bool {
        if size == 0 {
            return true;
        }
        self.ranges.len() == 1 && self.ranges[0].start == 0 && self.ranges[0].end == size - 1
    }

    /// Iterate the covered ranges in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &ByteRange> {
        self.ranges.iter()
    }
}

impl fmt::Debug for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ranges.iter()).finish()
    }
}
