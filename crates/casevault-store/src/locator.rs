//! Evidence locators and object naming.
//!
//! A locator is the public handle for one stored evidence file:
//!
//! ```text
//! /evidence/<millis>-<rand8><ext>.enc
//!           └──────── base ───────┘
//! ```
//!
//! The base is allocated at store time from the wall clock, 4 bytes of OS
//! randomness, and the sanitized extension of the submitted filename. The
//! locator maps 1:1 to backend object names: `<base>.enc` for ciphertext
//! and `<base>.meta.json` for the sidecar record, never discovered by
//! scanning.

use std::{fmt, path::Path, str::FromStr, time::SystemTime};

use crate::error::{StorageError, VaultError};

/// URL-style prefix all locators carry.
pub const LOCATOR_PREFIX: &str = "/evidence/";

/// Suffix of ciphertext object names.
pub const CIPHERTEXT_SUFFIX: &str = ".enc";

/// Suffix of sidecar metadata object names.
pub const METADATA_SUFFIX: &str = ".meta.json";

/// Longest accepted base name.
const MAX_BASE_LEN: usize = 200;

/// Longest sanitized extension, dot excluded.
const MAX_EXT_LEN: usize = 16;

/// Public handle for one stored evidence file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Locator {
    base: String,
}

impl Locator {
    /// Build a locator from a validated base name.
    pub(crate) fn from_base(base: &str) -> Result<Self, VaultError> {
        if base.is_empty() {
            return Err(invalid("empty name"));
        }
        if base.len() > MAX_BASE_LEN {
            return Err(invalid("name too long"));
        }
        // A trailing dot would turn into ".." once a suffix is appended.
        if base.starts_with('.') || base.ends_with('.') || base.contains("..") {
            return Err(invalid("dot segments are not allowed"));
        }
        if !base.chars().all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.'
        }) {
            return Err(invalid("name contains characters outside [a-z0-9.-]"));
        }

        Ok(Self { base: base.to_string() })
    }

    /// Backend object name of the ciphertext blob.
    pub fn object_name(&self) -> String {
        format!("{}{CIPHERTEXT_SUFFIX}", self.base)
    }

    /// Backend object name of the sidecar metadata record.
    pub fn metadata_name(&self) -> String {
        format!("{}{METADATA_SUFFIX}", self.base)
    }

    /// Filename to offer when the decrypted evidence is handed out.
    ///
    /// The base with no `.enc` suffix, as the original upload tree would
    /// have named it.
    pub fn download_name(&self) -> &str {
        &self.base
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{LOCATOR_PREFIX}{}{CIPHERTEXT_SUFFIX}", self.base)
    }
}

impl FromStr for Locator {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(rest) = s.strip_prefix(LOCATOR_PREFIX) else {
            return Err(invalid("missing /evidence/ prefix"));
        };
        let Some(base) = rest.strip_suffix(CIPHERTEXT_SUFFIX) else {
            return Err(invalid("missing .enc suffix"));
        };
        Self::from_base(base)
    }
}

fn invalid(reason: &str) -> VaultError {
    VaultError::Validation { reason: reason.to_string() }
}

/// Allocate a fresh base name: `<millis>-<rand8><ext>`.
///
/// Uniqueness rests on the random suffix; callers additionally check the
/// name against existing blobs before using it.
pub(crate) fn generate_base(extension: &str) -> Result<String, StorageError> {
    // A pre-epoch clock still yields a usable name; uniqueness comes from
    // the random suffix.
    let millis = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();

    let mut random = [0u8; 4];
    getrandom::fill(&mut random).map_err(|e| StorageError::Io(e.to_string()))?;

    Ok(format!("{millis}-{}{extension}", hex::encode(random)))
}

/// Sanitized extension of a submitted filename, leading dot included.
///
/// Lowercase ASCII alphanumerics only, capped at [`MAX_EXT_LEN`] chars;
/// anything else is dropped. Returns the empty string when nothing usable
/// remains.
pub(crate) fn sanitize_extension(submitted_name: &str) -> String {
    let Some(ext) = Path::new(submitted_name).extension().and_then(|e| e.to_str()) else {
        return String::new();
    };

    let cleaned: String = ext
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .take(MAX_EXT_LEN)
        .collect();

    if cleaned.is_empty() { String::new() } else { format!(".{cleaned}") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_roundtrip() {
        let locator: Locator = "/evidence/1724300000000-ab12cd34.jpg.enc".parse().unwrap();
        assert_eq!(locator.to_string(), "/evidence/1724300000000-ab12cd34.jpg.enc");
        assert_eq!(locator.object_name(), "1724300000000-ab12cd34.jpg.enc");
        assert_eq!(locator.metadata_name(), "1724300000000-ab12cd34.jpg.meta.json");
        assert_eq!(locator.download_name(), "1724300000000-ab12cd34.jpg");
    }

    #[test]
    fn parse_rejects_missing_prefix() {
        assert!("1724-ab.enc".parse::<Locator>().is_err());
        assert!("/uploads/1724-ab.enc".parse::<Locator>().is_err());
    }

    #[test]
    fn parse_rejects_missing_suffix() {
        assert!("/evidence/1724-ab.jpg".parse::<Locator>().is_err());
    }

    #[test]
    fn parse_rejects_traversal() {
        assert!("/evidence/../../etc/passwd.enc".parse::<Locator>().is_err());
        assert!("/evidence/a..b.enc".parse::<Locator>().is_err());
        assert!("/evidence/.hidden.enc".parse::<Locator>().is_err());
        // "x." would become "x..enc" as an object name
        assert!("/evidence/x..enc".parse::<Locator>().is_err());
    }

    #[test]
    fn parse_rejects_foreign_characters() {
        assert!("/evidence/UPPER.enc".parse::<Locator>().is_err());
        assert!("/evidence/with space.enc".parse::<Locator>().is_err());
        assert!("/evidence/sub/dir.enc".parse::<Locator>().is_err());
        assert!("/evidence/.enc".parse::<Locator>().is_err());
    }

    #[test]
    fn generated_base_parses_back() {
        let base = generate_base(".jpg").unwrap();
        let locator = Locator::from_base(&base).unwrap();
        assert!(locator.object_name().ends_with(".jpg.enc"));

        let (millis, rest) = base.split_once('-').unwrap();
        assert!(millis.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(&rest[8..], ".jpg");
        assert!(rest[..8].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_bases_differ() {
        let a = generate_base("").unwrap();
        let b = generate_base("").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn extension_sanitizing() {
        assert_eq!(sanitize_extension("photo.jpg"), ".jpg");
        assert_eq!(sanitize_extension("REPORT.PDF"), ".pdf");
        assert_eq!(sanitize_extension("archive.tar.gz"), ".gz");
        assert_eq!(sanitize_extension("no_extension"), "");
        assert_eq!(sanitize_extension(""), "");
        assert_eq!(sanitize_extension("weird.j<p>g"), ".jpg");
        assert_eq!(sanitize_extension("noise.!!!"), "");
        assert_eq!(sanitize_extension("x.aaaaaaaaaaaaaaaaaaaaaaaaaa"), ".aaaaaaaaaaaaaaaa");
    }
}
