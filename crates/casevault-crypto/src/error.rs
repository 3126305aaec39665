//! Error types for key handling and sealing.
//!
//! Decrypt-side errors are deliberately coarse: callers learn that a
//! ciphertext failed verification, never which segment or why in detail.

use thiserror::Error;

/// Errors raised while loading or parsing key material.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Key material was not valid hexadecimal.
    #[error("key material is not valid hex")]
    InvalidHex,

    /// Key material decoded to the wrong number of bytes.
    #[error("key must be {expected} bytes, got {got}")]
    InvalidLength {
        /// Required key length in bytes.
        expected: usize,
        /// Length that was actually provided.
        got: usize,
    },
}

/// Errors raised while sealing or opening an evidence stream.
///
/// All open-side variants are fail-closed: when one is returned, no
/// plaintext from the failing segment has been produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SealError {
    /// The segment counter ran out (the stream is too large to seal).
    #[error("segment counter exhausted: stream exceeds the sealable size")]
    CounterExhausted,

    /// Ciphertext ended before a complete final segment.
    #[error("ciphertext truncated: {got} bytes is shorter than one authentication tag")]
    TruncatedCiphertext {
        /// Bytes present in the incomplete final segment.
        got: usize,
    },

    /// A segment failed Poly1305 authentication (tamper or wrong key).
    #[error("segment authentication failed")]
    AuthFailed,

    /// The recorded authentication tag does not match the ciphertext.
    #[error("recorded authentication tag does not match ciphertext")]
    TagMismatch,
}
