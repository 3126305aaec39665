//! Casevault - encrypted evidence vault.
//!
//! Evidence files are sealed with a streaming AEAD, hashed for custody
//! receipts, written to a primary blob store, replicated byte for byte to
//! a backup store, and published through a sidecar metadata record:
//!
//! ```text
//!                 ┌────────────┐   verbatim copy   ┌────────────┐
//! plaintext ───>  │  primary   │ ────────────────> │   backup   │
//!   (sealed)      │ <base>.enc │                   │ <base>.enc │
//!                 │ <base>.meta.json  <- publication point
//!                 └────────────┘
//! ```
//!
//! Decryption is gated by [`AccessGate`] roles and never releases a byte
//! of plaintext before the whole ciphertext has verified against its
//! recorded authentication tag.
//!
//! Backends are pluggable through the [`Backend`] trait: filesystem
//! ([`FsBackend`]) for real vaults, in-memory ([`MemoryBackend`]) for
//! tests, and a fault-injecting wrapper ([`ChaosBackend`]) for crash and
//! atomicity testing.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod access;
pub mod backend;
pub mod config;
pub mod error;
pub mod locator;
pub mod metadata;
pub mod store;

pub use access::{AccessGate, Role};
pub use backend::{Backend, BlobWriter, ChaosBackend, FsBackend, MemoryBackend};
pub use config::{KEY_ENV, KeySource, VaultConfig, key_from_env_value, load_key_from_env};
pub use error::{CleanupWarning, MetadataError, StorageError, UnknownRole, VaultError};
pub use locator::{CIPHERTEXT_SUFFIX, LOCATOR_PREFIX, Locator, METADATA_SUFFIX};
pub use metadata::EncryptionMetadata;
pub use store::{EvidenceReader, EvidenceSource, EvidenceStore, StoredEvidence, VerifyReport};
