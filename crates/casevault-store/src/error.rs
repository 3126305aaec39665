//! Vault error types.
//!
//! Two layers of errors, mirroring the two layers of the crate:
//! - [`StorageError`]: raw backend failures (missing blobs, I/O)
//! - [`VaultError`]: the public taxonomy callers match on
//!
//! A failed plaintext cleanup after a successful store is deliberately not
//! an error: it is reported as a [`CleanupWarning`] on the receipt so the
//! stored evidence is not lost to a leftover temp file.

use std::path::PathBuf;

use casevault_crypto::KeyError;
use thiserror::Error;

use crate::locator::Locator;

/// Errors from a storage backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The named blob does not exist.
    #[error("blob not found: {name}")]
    NotFound {
        /// Object name that was requested.
        name: String,
    },

    /// A blob with this name already exists (or is being staged).
    #[error("blob already exists: {name}")]
    AlreadyExists {
        /// Object name that collided.
        name: String,
    },

    /// I/O error (filesystem, injected fault, etc.).
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// Errors decoding a sidecar metadata record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// The record was not parseable JSON of the expected shape.
    #[error("malformed metadata record: {0}")]
    MalformedRecord(String),

    /// A field decoded to the wrong length or was not hex.
    #[error("metadata field `{field}` is not valid hex of the expected length")]
    BadField {
        /// Name of the offending field.
        field: &'static str,
    },
}

/// Errors surfaced by vault operations.
///
/// The two not-found conditions are distinct on purpose: a locator whose
/// sidecar is gone reads differently in an audit than one whose ciphertext
/// blob is gone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// Malformed caller input (locator syntax, oversized stream).
    #[error("invalid evidence reference: {reason}")]
    Validation {
        /// What was wrong with the input.
        reason: String,
    },

    /// The caller's roles do not permit decryption.
    ///
    /// Raised before any storage access is attempted.
    #[error("decryption denied for roles [{roles}]")]
    Authorization {
        /// Comma-separated roles the caller presented.
        roles: String,
    },

    /// No sidecar metadata record exists for this locator.
    #[error("no metadata recorded for {locator}")]
    MetadataMissing {
        /// Locator that was requested.
        locator: Locator,
    },

    /// No ciphertext blob exists for this locator.
    #[error("no ciphertext stored for {locator}")]
    CiphertextMissing {
        /// Locator that was requested.
        locator: Locator,
    },

    /// The ciphertext or its sidecar failed verification.
    ///
    /// Zero plaintext bytes have been released when this is returned.
    #[error("integrity verification failed for {locator}: {detail}")]
    Integrity {
        /// Locator that failed verification.
        locator: Locator,
        /// Which check failed.
        detail: String,
    },

    /// The backup copy is absent or not byte-identical to the primary.
    ///
    /// Only raised by the audit operation; retrieval never reads the
    /// backup.
    #[error("backup copy of {locator} is missing or diverges from primary")]
    BackupDiverged {
        /// Locator whose backup diverged.
        locator: Locator,
    },

    /// Key material could not be loaded or parsed.
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// A storage backend operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Non-fatal warning: the plaintext source survived a successful store.
///
/// Carried on [`StoredEvidence`](crate::store::StoredEvidence) instead of
/// failing the operation; the evidence itself is sealed and safe.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("could not remove plaintext source {}: {reason}", path.display())]
pub struct CleanupWarning {
    /// Path of the plaintext file that could not be removed.
    pub path: PathBuf,
    /// Why removal failed.
    pub reason: String,
}

/// Error parsing a role name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);
