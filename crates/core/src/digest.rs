//! Content digest types and incremental hashing.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

/// Number of hex characters shown by [`Digest::short`].
const SHORT_LEN: usize = 12;

/// Digest algorithm tag.
///
/// Only SHA-256 is spoken by the registry protocol today; the tag exists so
/// digests order and compare by algorithm first, bytes second.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Algorithm {
    Sha256,
}

impl Algorithm {
    /// Wire prefix for this algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }
}

/// A content digest: algorithm tag plus 32 raw hash bytes.
///
/// The wire form is `sha256:<64 lowercase hex chars>`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    algorithm: Algorithm,
    bytes: [u8; 32],
}

impl Digest {
    /// Create from raw hash bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            algorithm: Algorithm::Sha256,
            bytes,
        }
    }

    /// Compute the SHA-256 digest of data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self::from_bytes(hasher.finalize().into())
    }

    /// Get the digest algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Get the raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Parse the wire form `sha256:<hex>`.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let (algo, hex) = s
            .split_once(':')
            .ok_or_else(|| crate::Error::InvalidDigest(format!("missing algorithm: {s}")))?;
        if algo != "sha256" {
            return Err(crate::Error::InvalidDigest(format!(
                "unsupported algorithm: {algo}"
            )));
        }
        if hex.len() != 64 {
            return Err(crate::Error::InvalidDigest(format!(
                "expected 64 hex chars, got {}",
                hex.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk)
                .map_err(|e| crate::Error::InvalidDigest(e.to_string()))?;
            bytes[i] = u8::from_str_radix(pair, 16)
                .map_err(|e| crate::Error::InvalidDigest(format!("bad hex {pair:?}: {e}")))?;
        }
        Ok(Self::from_bytes(bytes))
    }

    /// Encode the hash bytes as lowercase hex (no algorithm prefix).
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Abbreviated form for display: the first few hex chars.
    pub fn short(&self) -> String {
        self.to_hex()[..SHORT_LEN].to_string()
    }

    /// Create an incremental hasher for this digest's algorithm family.
    pub fn hasher() -> DigestHasher {
        DigestHasher(Sha256::new())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}:{})", self.algorithm.as_str(), self.short())
    }
}

impl TryFrom<String> for Digest {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        Self::parse(&s)
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.to_string()
    }
}

/// Incremental SHA-256 digest state.
///
/// Used per-chunk (fresh state per chunk) and per-blob (accumulated across
/// a full staging-file pass during finalization).
pub struct DigestHasher(Sha256);

impl DigestHasher {
    /// Update the hasher with data.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> Digest {
        Digest::from_bytes(self.0.finalize().into())
    }

    /// Finalize and check the result against an expected digest.
    pub fn verify(self, expected: &Digest) -> crate::Result<()> {
        let actual = self.finalize();
        if &actual != expected {
            return Err(crate::Error::HashMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }
}
