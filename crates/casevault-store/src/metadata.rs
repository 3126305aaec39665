//! Sidecar metadata records.
//!
//! Every ciphertext blob is paired with a small JSON record holding the
//! hex-encoded nonce and authentication tag. Writing this record is the
//! publication point of a store: a blob with no sidecar is invisible to
//! listing and unreadable by retrieval.

use casevault_crypto::{AuthTag, NONCE_LEN, TAG_LEN};
use serde::{Deserialize, Serialize};

use crate::error::MetadataError;

/// Decryption parameters recorded next to a ciphertext blob.
///
/// Both fields are lowercase hex. The key itself is never recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionMetadata {
    /// Nonce prefix the sealing stream was initialized with.
    pub nonce: String,
    /// Authentication tag of the final ciphertext segment.
    pub auth_tag: String,
}

impl EncryptionMetadata {
    /// Record the parameters of a completed seal.
    pub fn new(nonce: &[u8; NONCE_LEN], tag: &AuthTag) -> Self {
        Self { nonce: hex::encode(nonce), auth_tag: tag.to_hex() }
    }

    /// Decode the recorded nonce prefix.
    pub fn nonce_bytes(&self) -> Result<[u8; NONCE_LEN], MetadataError> {
        decode_fixed(&self.nonce, "nonce")
    }

    /// Decode the recorded authentication tag.
    pub fn tag(&self) -> Result<AuthTag, MetadataError> {
        decode_fixed::<TAG_LEN>(&self.auth_tag, "auth_tag").map(AuthTag::from_bytes)
    }

    /// Serialize for the sidecar blob.
    pub fn to_json(&self) -> Result<Vec<u8>, MetadataError> {
        serde_json::to_vec(self).map_err(|e| MetadataError::MalformedRecord(e.to_string()))
    }

    /// Parse a sidecar blob.
    pub fn from_json(bytes: &[u8]) -> Result<Self, MetadataError> {
        serde_json::from_slice(bytes).map_err(|e| MetadataError::MalformedRecord(e.to_string()))
    }
}

fn decode_fixed<const N: usize>(
    hex_str: &str,
    field: &'static str,
) -> Result<[u8; N], MetadataError> {
    let bytes = hex::decode(hex_str).map_err(|_| MetadataError::BadField { field })?;
    bytes.try_into().map_err(|_| MetadataError::BadField { field })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EncryptionMetadata {
        EncryptionMetadata::new(&[0xab; NONCE_LEN], &AuthTag::from_bytes([0x11; TAG_LEN]))
    }

    #[test]
    fn json_roundtrip() {
        let meta = sample();
        let parsed = EncryptionMetadata::from_json(&meta.to_json().unwrap()).unwrap();
        assert_eq!(parsed, meta);
        assert_eq!(parsed.nonce_bytes().unwrap(), [0xab; NONCE_LEN]);
        assert_eq!(parsed.tag().unwrap().as_bytes(), &[0x11; TAG_LEN]);
    }

    #[test]
    fn record_is_plain_hex_json() {
        let json = sample().to_json().unwrap();
        let text = std::str::from_utf8(&json).unwrap();
        assert!(text.contains("\"nonce\":\"abab"));
        assert!(text.contains("\"auth_tag\":\"1111"));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            EncryptionMetadata::from_json(b"not json"),
            Err(MetadataError::MalformedRecord(_))
        ));
        assert!(matches!(
            EncryptionMetadata::from_json(b"{\"nonce\":\"00\"}"),
            Err(MetadataError::MalformedRecord(_))
        ));
    }

    #[test]
    fn bad_hex_fields_are_rejected() {
        let mut meta = sample();
        meta.nonce = "zz".to_string();
        assert_eq!(meta.nonce_bytes(), Err(MetadataError::BadField { field: "nonce" }));

        let mut meta = sample();
        meta.auth_tag = "11".to_string();
        assert_eq!(meta.tag().map(|t| t.to_hex()), Err(MetadataError::BadField { field: "auth_tag" }));
    }
}
