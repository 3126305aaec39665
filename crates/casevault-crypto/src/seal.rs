//! Streaming evidence sealing with `XChaCha20-Poly1305`.
//!
//! Evidence is sealed as a sequence of fixed-size segments so that files of
//! any size are processed in bounded memory. Segment boundaries are implied
//! by the fixed size; there are no framing bytes.
//!
//! ```text
//! nonce     : 19 random bytes, stored in the sidecar record
//! ciphertext: seg_0 ‖ seg_1 ‖ … ‖ seg_last
//!
//! seg_i     = AEAD(key, nonce ‖ counter_i ‖ 0x00, 64 KiB plaintext)
//! seg_last  = AEAD(key, nonce ‖ counter_n ‖ 0x01, 0..64 KiB plaintext)
//! ```
//!
//! Each segment carries its own 16-byte Poly1305 tag. The tag of the final
//! segment is additionally recorded next to the nonce and cross-checked
//! before the final segment is opened, which binds the sidecar record to
//! this exact ciphertext.
//!
//! # Security
//!
//! - Every segment is individually authenticated; a flipped bit anywhere
//!   fails that segment's tag check
//! - The big-endian segment counter in the nonce prevents reordering and
//!   replay of segments within a file
//! - The last-segment flag prevents truncation at a segment boundary from
//!   going unnoticed
//! - The opener buffers whole segments and never returns bytes from a
//!   segment that has not passed authentication
//! - After any error the engine state is undefined; callers must discard it

use chacha20poly1305::{
    AeadCore, XChaCha20Poly1305,
    aead::{
        KeyInit, OsRng,
        stream::{DecryptorBE32, EncryptorBE32},
    },
};

use crate::{error::SealError, key::VaultKey};

/// Length of the per-file stream nonce in bytes.
///
/// The 24-byte `XChaCha20` nonce is this random prefix plus a 4-byte
/// big-endian segment counter and a 1-byte last-segment flag.
pub const NONCE_LEN: usize = 19;

/// Poly1305 tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Plaintext bytes per segment.
pub const SEGMENT_LEN: usize = 64 * 1024;

/// Authentication tag of the final ciphertext segment.
///
/// Recorded in the sidecar next to the nonce. Tags are public data (they
/// are part of the ciphertext), so plain equality and `Debug` are fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthTag([u8; TAG_LEN]);

impl AuthTag {
    /// Wrap raw tag bytes.
    pub fn from_bytes(bytes: [u8; TAG_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw tag bytes.
    pub fn as_bytes(&self) -> &[u8; TAG_LEN] {
        &self.0
    }

    /// Lowercase hex rendering (32 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Final output of a seal: the last ciphertext segment and its tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedTail {
    /// Ciphertext of the final segment, tag included as its trailing bytes.
    pub ciphertext: Vec<u8>,
    /// The recorded authentication tag (trailing [`TAG_LEN`] bytes of
    /// `ciphertext`).
    pub tag: AuthTag,
}

/// Ciphertext size for a given plaintext size.
///
/// Every file costs one tag per full segment plus one for the final
/// (possibly empty) segment.
pub fn sealed_len(plaintext_len: u64) -> u64 {
    let full_segments = plaintext_len / SEGMENT_LEN as u64;
    plaintext_len + (full_segments + 1) * TAG_LEN as u64
}

/// Incremental sealing engine.
///
/// Pure byte-in, byte-out state machine; callers drive it over whatever
/// I/O they have. Feed plaintext with [`update`](Self::update), collect the
/// emitted ciphertext, then call [`finish`](Self::finish) for the final
/// segment and the recorded tag.
pub struct StreamSealer {
    enc: EncryptorBE32<XChaCha20Poly1305>,
    nonce: [u8; NONCE_LEN],
    pending: Vec<u8>,
}

impl StreamSealer {
    /// Start sealing with a fresh random nonce from the OS CSPRNG.
    ///
    /// A new nonce is drawn on every call; nonces are never derived from
    /// content or reused across files.
    pub fn new(key: &VaultKey) -> Self {
        let full = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&full[..NONCE_LEN]);
        Self::init(key, nonce)
    }

    /// Seal under a fixed nonce.
    ///
    /// Test and fuzz builds only; production sealing always draws a fresh
    /// random nonce.
    #[cfg(any(test, fuzzing))]
    pub fn with_nonce(key: &VaultKey, nonce: [u8; NONCE_LEN]) -> Self {
        Self::init(key, nonce)
    }

    fn init(key: &VaultKey, nonce: [u8; NONCE_LEN]) -> Self {
        let cipher = XChaCha20Poly1305::new(key.bytes().into());
        let enc = EncryptorBE32::from_aead(cipher, &nonce.into());
        Self { enc, nonce, pending: Vec::new() }
    }

    /// The nonce this stream is sealed under.
    pub fn nonce(&self) -> [u8; NONCE_LEN] {
        self.nonce
    }

    /// Absorb plaintext, returning any complete ciphertext segments.
    ///
    /// The returned buffer is empty while input is still being gathered
    /// into a segment. Chunk boundaries do not affect the ciphertext.
    ///
    /// # Errors
    ///
    /// - `CounterExhausted`: the stream exceeded 2^32 segments
    pub fn update(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
        self.pending.extend_from_slice(plaintext);

        let mut out = Vec::new();
        while self.pending.len() >= SEGMENT_LEN {
            let rest = self.pending.split_off(SEGMENT_LEN);
            let segment = std::mem::replace(&mut self.pending, rest);

            let ciphertext = self
                .enc
                .encrypt_next(segment.as_slice())
                .map_err(|_| SealError::CounterExhausted)?;
            out.extend_from_slice(&ciphertext);
        }

        Ok(out)
    }

    /// Seal the final segment and produce the recorded tag.
    ///
    /// The final segment may be empty; even an empty file produces one
    /// tag-only segment.
    pub fn finish(self) -> Result<SealedTail, SealError> {
        let Self { enc, nonce: _, pending } = self;

        let ciphertext =
            enc.encrypt_last(pending.as_slice()).map_err(|_| SealError::CounterExhausted)?;

        // encrypt_last output is always plaintext + TAG_LEN bytes
        let tag_start = ciphertext.len() - TAG_LEN;
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&ciphertext[tag_start..]);

        Ok(SealedTail { ciphertext, tag: AuthTag(tag) })
    }
}

/// Incremental opening engine.
///
/// Mirrors [`StreamSealer`]: feed ciphertext with
/// [`update`](Self::update), collect verified plaintext, then call
/// [`finish`](Self::finish) for the final segment. The engine holds back
/// the trailing bytes of the stream until [`finish`](Self::finish) because
/// the final segment is only identifiable at end of input.
pub struct StreamOpener {
    dec: DecryptorBE32<XChaCha20Poly1305>,
    pending: Vec<u8>,
    expected_tag: AuthTag,
}

impl StreamOpener {
    /// Start opening a stream sealed under `nonce`, expecting the recorded
    /// `tag` on its final segment.
    pub fn new(key: &VaultKey, nonce: [u8; NONCE_LEN], expected_tag: AuthTag) -> Self {
        let cipher = XChaCha20Poly1305::new(key.bytes().into());
        let dec = DecryptorBE32::from_aead(cipher, &nonce.into());
        Self { dec, pending: Vec::new(), expected_tag }
    }

    /// Absorb ciphertext, returning plaintext of fully verified segments.
    ///
    /// # Errors
    ///
    /// - `AuthFailed`: a segment failed authentication; no plaintext from
    ///   that segment has been returned
    pub fn update(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, SealError> {
        self.pending.extend_from_slice(ciphertext);

        let mut out = Vec::new();
        // Strictly greater: a buffered block of exactly one segment may be
        // the final one, which only finish() can decide.
        while self.pending.len() > SEGMENT_LEN + TAG_LEN {
            let rest = self.pending.split_off(SEGMENT_LEN + TAG_LEN);
            let segment = std::mem::replace(&mut self.pending, rest);

            let plaintext =
                self.dec.decrypt_next(segment.as_slice()).map_err(|_| SealError::AuthFailed)?;
            out.extend_from_slice(&plaintext);
        }

        Ok(out)
    }

    /// Open the final segment and verify the recorded tag.
    ///
    /// # Errors
    ///
    /// - `TruncatedCiphertext`: stream ended before one complete tag
    /// - `TagMismatch`: the recorded tag does not match the ciphertext
    /// - `AuthFailed`: the final segment failed authentication
    pub fn finish(self) -> Result<Vec<u8>, SealError> {
        let Self { dec, pending, expected_tag } = self;

        if pending.len() < TAG_LEN {
            return Err(SealError::TruncatedCiphertext { got: pending.len() });
        }

        let tag_start = pending.len() - TAG_LEN;
        if expected_tag.as_bytes()[..] != pending[tag_start..] {
            return Err(SealError::TagMismatch);
        }

        dec.decrypt_last(pending.as_slice()).map_err(|_| SealError::AuthFailed)
    }
}
