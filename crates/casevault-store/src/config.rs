//! Vault configuration and key loading.

use std::path::{Path, PathBuf};

use casevault_crypto::{KeyError, VaultKey};

use crate::{backend::FsBackend, error::StorageError};

/// Environment variable holding the hex-encoded vault key.
pub const KEY_ENV: &str = "EVIDENCE_KEY";

/// Where the active vault key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Key material supplied through [`KEY_ENV`].
    Environment,
    /// Derived development key; not safe for real evidence.
    DevFallback,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Environment => write!(f, "environment"),
            Self::DevFallback => write!(f, "dev-fallback"),
        }
    }
}

/// Resolve a key from the raw environment value.
///
/// An absent or empty value falls back to the deterministic development
/// key. A present but malformed value is a hard error rather than a
/// silent fallback.
///
/// # Errors
///
/// `KeyError` when the value is not 64 hex characters.
pub fn key_from_env_value(value: Option<&str>) -> Result<(VaultKey, KeySource), KeyError> {
    match value {
        None => Ok((VaultKey::dev_fallback(), KeySource::DevFallback)),
        Some(hex_key) if hex_key.is_empty() => {
            Ok((VaultKey::dev_fallback(), KeySource::DevFallback))
        },
        Some(hex_key) => Ok((VaultKey::from_hex(hex_key)?, KeySource::Environment)),
    }
}

/// Load the vault key from the process environment.
///
/// # Errors
///
/// `KeyError` when [`KEY_ENV`] is set but malformed.
pub fn load_key_from_env() -> Result<(VaultKey, KeySource), KeyError> {
    let value = std::env::var(KEY_ENV).ok();
    key_from_env_value(value.as_deref())
}

/// On-disk layout of one vault data directory.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    data_dir: PathBuf,
}

impl VaultConfig {
    /// Describe a vault rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    /// Root directory of this vault.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding primary ciphertext and sidecar objects.
    #[must_use]
    pub fn primary_dir(&self) -> PathBuf {
        self.data_dir.join("enc")
    }

    /// Directory holding backup ciphertext replicas.
    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    /// Open both filesystem backends, creating the directories if needed.
    ///
    /// # Errors
    ///
    /// `StorageError::Io` when a directory cannot be created.
    pub fn open_backends(&self) -> Result<(FsBackend, FsBackend), StorageError> {
        let primary = FsBackend::open(self.primary_dir())?;
        let backup = FsBackend::open(self.backup_dir())?;
        Ok((primary, backup))
    }
}
