//! Vault key material.
//!
//! A single 32-byte symmetric key seals every evidence file; per-file
//! separation comes from the random stream nonce, not from key derivation.
//! Key bytes are zeroized when dropped and never appear in `Debug` output
//! or logs.

use std::fmt;

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::KeyError;

/// Length of the vault key in bytes.
pub const KEY_LEN: usize = 32;

/// Domain separation label for the development fallback key.
const DEV_KEY_LABEL: &[u8] = b"casevault dev key v1";

/// Fixed salt for the development fallback derivation.
const DEV_KEY_SALT: &[u8] = b"casevault-insecure-dev-salt";

/// Symmetric key for sealing and opening evidence.
#[derive(Clone)]
pub struct VaultKey {
    bytes: [u8; KEY_LEN],
}

// Implement Drop to zeroize key material
impl Drop for VaultKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl VaultKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Parse a hex-encoded key (64 hex characters).
    ///
    /// # Errors
    ///
    /// - `InvalidHex`: input is not valid hexadecimal
    /// - `InvalidLength`: input decodes to something other than 32 bytes
    pub fn from_hex(hex_key: &str) -> Result<Self, KeyError> {
        let raw = hex::decode(hex_key).map_err(|_| KeyError::InvalidHex)?;
        let got = raw.len();
        let bytes: [u8; KEY_LEN] =
            raw.try_into().map_err(|_| KeyError::InvalidLength { expected: KEY_LEN, got })?;
        Ok(Self { bytes })
    }

    /// Deterministic development key, derived with HKDF-SHA256 from fixed
    /// inputs.
    ///
    /// Every process that falls back to this key derives the same bytes, so
    /// anyone with this source code can decrypt evidence sealed under it.
    /// Callers must surface that loudly and refuse it in production.
    pub fn dev_fallback() -> Self {
        let hkdf = Hkdf::<Sha256>::new(Some(DEV_KEY_SALT), b"dev-key");

        let mut bytes = [0u8; KEY_LEN];
        let Ok(()) = hkdf.expand(DEV_KEY_LABEL, &mut bytes) else {
            unreachable!("32 bytes is a valid HKDF-SHA256 output length");
        };

        Self { bytes }
    }

    /// Raw key bytes, for cipher initialization within this crate.
    pub(crate) fn bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material stays out of Debug output.
        f.write_str("VaultKey(..)")
    }
}
