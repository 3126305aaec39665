//! Content digests over evidence plaintext.
//!
//! The digest is computed incrementally while evidence streams through the
//! vault, so a file is hashed in bounded memory regardless of its size. The
//! result depends only on the byte sequence, never on how it was chunked.

use std::{fmt, str::FromStr};

use sha2::{Digest, Sha256};

/// Length of a content digest in bytes (SHA-256).
pub const DIGEST_LEN: usize = 32;

/// SHA-256 digest of evidence plaintext.
///
/// Rendered as 64 lowercase hex characters. Used as the tamper-independent
/// fingerprint recorded when evidence is stored.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; DIGEST_LEN]);

impl ContentDigest {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex rendering (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

/// Error parsing a hex-rendered content digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("digest must be {} lowercase hex characters", DIGEST_LEN * 2)]
pub struct ParseDigestError;

impl FromStr for ContentDigest {
    type Err = ParseDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s).map_err(|_| ParseDigestError)?;
        let bytes: [u8; DIGEST_LEN] = raw.try_into().map_err(|_| ParseDigestError)?;
        Ok(Self(bytes))
    }
}

/// Incremental SHA-256 hasher for streaming evidence.
#[derive(Debug, Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    /// Create a hasher with empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb the next chunk of plaintext.
    ///
    /// Chunk boundaries do not affect the final digest.
    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    /// Consume the hasher and produce the digest.
    pub fn finish(self) -> ContentDigest {
        ContentDigest(self.inner.finalize().into())
    }
}

/// One-shot digest of a byte slice.
pub fn digest(bytes: &[u8]) -> ContentDigest {
    let mut hasher = ContentHasher::new();
    hasher.update(bytes);
    hasher.finish()
}
