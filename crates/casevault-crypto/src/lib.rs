//! Casevault Cryptographic Primitives
//!
//! Building blocks for the evidence vault: content hashing, streaming
//! authenticated encryption, and key handling. Everything in this crate is
//! sans-I/O: the engines consume and produce byte chunks, and the vault
//! layer drives them over whatever storage it has.
//!
//! # Evidence Lifecycle
//!
//! Each evidence file is hashed and sealed in a single pass over its
//! plaintext, then only ciphertext and the sidecar record leave the
//! pipeline.
//!
//! ```text
//! plaintext chunks
//!        │
//!        ├──────────────► ContentHasher ──► SHA-256 digest (receipt)
//!        ▼
//! StreamSealer (XChaCha20-Poly1305, 64 KiB segments)
//!        │
//!        ▼
//! ciphertext segments + {nonce, auth tag} (sidecar record)
//! ```
//!
//! Opening runs the same machinery in reverse: a [`StreamOpener`] verifies
//! every segment and the recorded tag, and refuses to produce a single
//! plaintext byte from anything that fails authentication.
//!
//! # Security
//!
//! Confidentiality and integrity:
//! - XChaCha20-Poly1305 AEAD; each 64 KiB segment carries its own tag
//! - The final segment's tag is recorded out of band and re-checked, so a
//!   swapped sidecar or swapped ciphertext is detected
//! - Truncation, reordering, and bit flips all fail authentication
//!
//! Nonce hygiene:
//! - One random 19-byte nonce per sealed file, drawn from the OS CSPRNG
//! - The remaining 5 nonce bytes are the segment counter and last-segment
//!   flag, managed by the STREAM construction
//!
//! Key hygiene:
//! - Key bytes are zeroized on drop and redacted from `Debug` output
//! - The deterministic development fallback key is for local use only and
//!   must be surfaced loudly by callers

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod digest;
pub mod error;
pub mod key;
pub mod seal;

pub use digest::{ContentDigest, ContentHasher, DIGEST_LEN, ParseDigestError, digest};
pub use error::{KeyError, SealError};
pub use key::{KEY_LEN, VaultKey};
pub use seal::{
    AuthTag, NONCE_LEN, SEGMENT_LEN, SealedTail, StreamOpener, StreamSealer, TAG_LEN, sealed_len,
};
