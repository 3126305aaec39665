//! Evidence vault orchestration.
//!
//! [`EvidenceStore`] drives the full custody pipeline over two injected
//! blob backends:
//!
//! ```text
//!              ┌─> ContentHasher ──────────────> digest (receipt)
//! plaintext ───┤
//!              └─> StreamSealer ──> primary ──> backup (byte copy)
//!                                     │
//!                                     └──> sidecar metadata (publication)
//! ```
//!
//! The sidecar commit is the publication point: until it lands, the
//! locator is invisible to [`EvidenceStore::list`] and unretrievable.
//! Retrieval verifies the entire ciphertext against its recorded tag
//! before the first plaintext byte is released, then decrypts again
//! lazily; a tampered file therefore yields zero plaintext, not a
//! truncated prefix. Retrieval reads the primary copy only.

use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use casevault_crypto::{
    ContentDigest, ContentHasher, SealError, StreamOpener, StreamSealer, VaultKey,
};
use tokio::{
    fs,
    io::{AsyncRead, AsyncReadExt},
};

use crate::{
    access::{AccessGate, Role},
    backend::Backend,
    error::{CleanupWarning, StorageError, VaultError},
    locator::{self, CIPHERTEXT_SUFFIX, Locator, METADATA_SUFFIX},
    metadata::EncryptionMetadata,
};

/// Read granularity for plaintext and ciphertext streaming.
const READ_CHUNK: usize = 64 * 1024;

/// Rolls of the name allocator before giving up on collisions.
const NAME_ATTEMPTS: usize = 8;

/// Plaintext input to a store operation.
pub enum EvidenceSource {
    /// Spooled plaintext file, destroyed once the store succeeds.
    Path(PathBuf),
    /// Arbitrary plaintext stream; the caller keeps its own copy.
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl EvidenceSource {
    /// Evidence spooled to a file that the vault should consume.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Evidence streamed from an arbitrary reader.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }

    /// Evidence held in memory.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Reader(Box::new(std::io::Cursor::new(bytes.into())))
    }

    async fn into_parts(
        self,
    ) -> Result<(Box<dyn AsyncRead + Send + Unpin>, Option<PathBuf>), VaultError> {
        match self {
            Self::Path(path) => {
                let file = fs::File::open(&path).await.map_err(StorageError::from)?;
                Ok((Box::new(file), Some(path)))
            },
            Self::Reader(reader) => Ok((reader, None)),
        }
    }
}

/// Receipt for a completed store.
#[derive(Debug)]
pub struct StoredEvidence {
    /// Locator for later retrieval.
    pub locator: Locator,
    /// SHA-256 of the plaintext, computed in the same pass that sealed it.
    pub digest: ContentDigest,
    /// Plaintext length in bytes.
    pub size: u64,
    /// Present when the plaintext source could not be destroyed.
    pub cleanup: Option<CleanupWarning>,
}

/// Outcome of a replica audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    /// Locator that was audited.
    pub locator: Locator,
    /// Length of the verified ciphertext, identical on both backends.
    pub ciphertext_len: u64,
}

/// Encrypted evidence vault over a primary and a backup backend.
pub struct EvidenceStore<P: Backend, B: Backend> {
    primary: P,
    backup: B,
    key: VaultKey,
    gate: AccessGate,
}

impl<P: Backend, B: Backend> EvidenceStore<P, B> {
    /// Assemble a vault from its injected parts.
    pub fn new(primary: P, backup: B, key: VaultKey, gate: AccessGate) -> Self {
        Self { primary, backup, key, gate }
    }

    /// Ingest one piece of evidence.
    ///
    /// Hashes and seals the plaintext in a single bounded-memory pass,
    /// commits the ciphertext to the primary, replicates it byte for byte
    /// to the backup, then publishes the sidecar record. A failure at any
    /// point unwinds the artifacts already written and leaves the locator
    /// invisible. `submitted_name` only contributes its file extension.
    ///
    /// # Errors
    ///
    /// `VaultError::Storage` when either backend fails;
    /// `VaultError::Validation` when the plaintext outgrows the segment
    /// counter. The plaintext source is never destroyed on failure.
    pub async fn store(
        &self,
        source: EvidenceSource,
        submitted_name: &str,
    ) -> Result<StoredEvidence, VaultError> {
        let (mut reader, spooled) = source.into_parts().await?;

        let extension = locator::sanitize_extension(submitted_name);
        let locator = self.allocate(&extension).await?;
        tracing::debug!(locator = %locator, "Staging evidence");

        // Hash-and-seal fork: one pass, ciphertext streamed to staging.
        let mut writer = self.primary.create(&locator.object_name()).await?;
        let mut hasher = ContentHasher::new();
        let mut sealer = StreamSealer::new(&self.key);
        let nonce = sealer.nonce();

        let mut size = 0u64;
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = reader.read(&mut buf).await.map_err(StorageError::from)?;
            if n == 0 {
                break;
            }
            size += n as u64;
            hasher.update(&buf[..n]);
            let segments = sealer.update(&buf[..n]).map_err(oversized_input)?;
            if !segments.is_empty() {
                writer.write_chunk(Bytes::from(segments)).await?;
            }
        }
        let tail = sealer.finish().map_err(oversized_input)?;
        let metadata = EncryptionMetadata::new(&nonce, &tail.tag);
        writer.write_chunk(Bytes::from(tail.ciphertext)).await?;
        writer.commit().await?;
        let digest = hasher.finish();

        // The primary ciphertext is durable. Replicate and publish,
        // unwinding everything for this locator on failure.
        if let Err(e) = self.replicate_backup(&locator).await {
            self.scrub(&locator).await;
            return Err(e);
        }
        if let Err(e) = self.write_sidecar(&locator, &metadata).await {
            self.scrub(&locator).await;
            return Err(e);
        }

        // Published. Failing to destroy the plaintext source degrades to
        // a warning on the receipt.
        let cleanup = match spooled {
            Some(path) => destroy_plaintext(&path).await,
            None => None,
        };

        tracing::info!(locator = %locator, size, digest = %digest, "Stored evidence");
        Ok(StoredEvidence { locator, digest, size, cleanup })
    }

    /// Locators of every published evidence file on the primary.
    ///
    /// A ciphertext blob whose sidecar is absent was never published and
    /// is not listed. Sorted for stable output within one call.
    ///
    /// # Errors
    ///
    /// `VaultError::Storage` when the primary cannot be enumerated.
    pub async fn list(&self) -> Result<Vec<Locator>, VaultError> {
        let names = self.primary.list("").await?;
        let name_set: HashSet<&str> = names.iter().map(String::as_str).collect();

        let mut locators = Vec::new();
        for name in &names {
            let Some(base) = name.strip_suffix(CIPHERTEXT_SUFFIX) else {
                continue;
            };
            if !name_set.contains(format!("{base}{METADATA_SUFFIX}").as_str()) {
                continue;
            }
            match Locator::from_base(base) {
                Ok(locator) => locators.push(locator),
                Err(_) => tracing::debug!("Skipping foreign object {name}"),
            }
        }
        locators.sort();
        Ok(locators)
    }

    /// Decrypt one evidence file for an authorized caller.
    ///
    /// The role check runs before any storage access. The entire
    /// ciphertext is then verified against its recorded tag; only after
    /// that pass succeeds is a lazily decrypting [`EvidenceReader`]
    /// handed out.
    ///
    /// # Errors
    ///
    /// `VaultError::Authorization` before any storage access when no
    /// presented role may decrypt; `VaultError::Validation` for a
    /// malformed locator; `VaultError::MetadataMissing` and
    /// `VaultError::CiphertextMissing` for absent artifacts;
    /// `VaultError::Integrity` when verification fails, with zero
    /// plaintext released.
    pub async fn retrieve(
        &self,
        locator: &str,
        roles: &[Role],
    ) -> Result<EvidenceReader, VaultError> {
        if !self.gate.permits_decrypt(roles) {
            let roles = roles.iter().map(Role::as_str).collect::<Vec<_>>().join(",");
            tracing::warn!(roles = %roles, "Denied decrypt request");
            return Err(VaultError::Authorization { roles });
        }

        let locator: Locator = locator.parse()?;
        let metadata = self.load_sidecar(&locator).await?;
        let (plaintext_len, _) = self.verification_pass(&locator, &metadata).await?;

        // Verified end to end. Open again and decrypt for real.
        let nonce = metadata.nonce_bytes().map_err(|e| integrity(&locator, &e))?;
        let tag = metadata.tag().map_err(|e| integrity(&locator, &e))?;
        let source = self
            .primary
            .open(&locator.object_name())
            .await
            .map_err(|e| ciphertext_open_error(&locator, e))?;

        tracing::info!(locator = %locator, size = plaintext_len, "Releasing verified evidence");
        Ok(EvidenceReader {
            source,
            opener: Some(StreamOpener::new(&self.key, nonce, tag)),
            locator,
            plaintext_len,
            scratch: vec![0u8; READ_CHUNK],
        })
    }

    /// Audit one evidence file without releasing plaintext.
    ///
    /// Verifies the primary ciphertext end to end, then checks that the
    /// backup replica is byte-identical to it. No role gate: nothing is
    /// decrypted for the caller.
    ///
    /// # Errors
    ///
    /// `VaultError::Integrity` when the primary fails verification;
    /// `VaultError::BackupDiverged` when the backup is missing or differs
    /// from the primary.
    pub async fn verify(&self, locator: &str) -> Result<VerifyReport, VaultError> {
        let locator: Locator = locator.parse()?;
        let metadata = self.load_sidecar(&locator).await?;
        let (_, ciphertext_len) = self.verification_pass(&locator, &metadata).await?;

        let name = locator.object_name();
        let Some((primary_digest, primary_len)) = digest_blob(&self.primary, &name).await? else {
            return Err(VaultError::CiphertextMissing { locator: locator.clone() });
        };
        let Some((backup_digest, backup_len)) = digest_blob(&self.backup, &name).await? else {
            tracing::warn!(locator = %locator, "Backup replica is missing");
            return Err(VaultError::BackupDiverged { locator: locator.clone() });
        };
        if primary_len != backup_len || primary_digest != backup_digest {
            tracing::warn!(locator = %locator, "Backup replica diverges from primary");
            return Err(VaultError::BackupDiverged { locator: locator.clone() });
        }
        debug_assert_eq!(primary_len, ciphertext_len);

        tracing::debug!(locator = %locator, ciphertext_len, "Replica audit passed");
        Ok(VerifyReport { locator, ciphertext_len })
    }

    /// Allocate an unused locator, re-rolling on name collisions.
    async fn allocate(&self, extension: &str) -> Result<Locator, VaultError> {
        for _ in 0..NAME_ATTEMPTS {
            let base = locator::generate_base(extension)?;
            let locator = Locator::from_base(&base)?;
            if !self.primary.exists(&locator.object_name()).await? {
                return Ok(locator);
            }
        }
        Err(StorageError::Io(format!("no free object name after {NAME_ATTEMPTS} attempts")).into())
    }

    /// Copy the committed primary ciphertext to the backup, verbatim.
    async fn replicate_backup(&self, locator: &Locator) -> Result<(), VaultError> {
        let name = locator.object_name();
        let mut source = self.primary.open(&name).await?;
        let mut writer = self.backup.create(&name).await?;

        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = source.read(&mut buf).await.map_err(StorageError::from)?;
            if n == 0 {
                break;
            }
            writer.write_chunk(Bytes::copy_from_slice(&buf[..n])).await?;
        }
        writer.commit().await?;
        Ok(())
    }

    /// Publish the sidecar record. This commit makes the locator visible.
    async fn write_sidecar(
        &self,
        locator: &Locator,
        metadata: &EncryptionMetadata,
    ) -> Result<(), VaultError> {
        let json = metadata
            .to_json()
            .map_err(|e| StorageError::Io(format!("sidecar encode: {e}")))?;
        let mut writer = self.primary.create(&locator.metadata_name()).await?;
        writer.write_chunk(Bytes::from(json)).await?;
        writer.commit().await?;
        Ok(())
    }

    /// Best-effort removal of every artifact of a failed store.
    ///
    /// Never masks the error that triggered it.
    async fn scrub(&self, locator: &Locator) {
        let object = locator.object_name();
        let sidecar = locator.metadata_name();
        for name in [object.as_str(), sidecar.as_str()] {
            if let Err(e) = self.primary.delete(name).await {
                tracing::debug!(locator = %locator, "Scrub of primary {name} failed: {e}");
            }
            if let Err(e) = self.backup.delete(name).await {
                tracing::debug!(locator = %locator, "Scrub of backup {name} failed: {e}");
            }
        }
    }

    async fn load_sidecar(&self, locator: &Locator) -> Result<EncryptionMetadata, VaultError> {
        let mut reader = match self.primary.open(&locator.metadata_name()).await {
            Ok(reader) => reader,
            Err(StorageError::NotFound { .. }) => {
                return Err(VaultError::MetadataMissing { locator: locator.clone() });
            },
            Err(e) => return Err(e.into()),
        };
        let mut json = Vec::new();
        reader.read_to_end(&mut json).await.map_err(StorageError::from)?;
        EncryptionMetadata::from_json(&json).map_err(|e| integrity(locator, &e))
    }

    /// Decrypt-and-discard pass over the whole primary ciphertext.
    ///
    /// Returns `(plaintext_len, ciphertext_len)`. No plaintext leaves
    /// this function.
    async fn verification_pass(
        &self,
        locator: &Locator,
        metadata: &EncryptionMetadata,
    ) -> Result<(u64, u64), VaultError> {
        let nonce = metadata.nonce_bytes().map_err(|e| integrity(locator, &e))?;
        let tag = metadata.tag().map_err(|e| integrity(locator, &e))?;
        let mut opener = StreamOpener::new(&self.key, nonce, tag);

        let mut source = self
            .primary
            .open(&locator.object_name())
            .await
            .map_err(|e| ciphertext_open_error(locator, e))?;

        let mut plaintext_len = 0u64;
        let mut ciphertext_len = 0u64;
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = source.read(&mut buf).await.map_err(StorageError::from)?;
            if n == 0 {
                break;
            }
            ciphertext_len += n as u64;
            let cleartext = opener.update(&buf[..n]).map_err(|e| integrity(locator, &e))?;
            plaintext_len += cleartext.len() as u64;
        }
        let tail = opener.finish().map_err(|e| integrity(locator, &e))?;
        plaintext_len += tail.len() as u64;

        Ok((plaintext_len, ciphertext_len))
    }
}

/// Streaming plaintext handle, handed out only after verification.
pub struct EvidenceReader {
    source: Box<dyn AsyncRead + Send + Unpin>,
    opener: Option<StreamOpener>,
    locator: Locator,
    plaintext_len: u64,
    scratch: Vec<u8>,
}

impl fmt::Debug for EvidenceReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvidenceReader")
            .field("locator", &self.locator)
            .field("plaintext_len", &self.plaintext_len)
            .finish_non_exhaustive()
    }
}

impl EvidenceReader {
    /// Next decrypted chunk, `None` once the evidence is drained.
    ///
    /// # Errors
    ///
    /// `VaultError::Integrity` if the ciphertext changed between the
    /// verification pass and this read; `VaultError::Storage` on read
    /// failures.
    pub async fn read_chunk(&mut self) -> Result<Option<Bytes>, VaultError> {
        while self.opener.is_some() {
            let n = self.source.read(&mut self.scratch).await.map_err(StorageError::from)?;
            if n == 0 {
                let Some(opener) = self.opener.take() else {
                    break;
                };
                let tail = opener.finish().map_err(|e| integrity(&self.locator, &e))?;
                if tail.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(Bytes::from(tail)));
            }
            let Some(opener) = self.opener.as_mut() else {
                break;
            };
            let emitted = opener.update(&self.scratch[..n]).map_err(|e| integrity(&self.locator, &e))?;
            if !emitted.is_empty() {
                return Ok(Some(Bytes::from(emitted)));
            }
        }
        Ok(None)
    }

    /// Drain the remaining evidence into one buffer.
    ///
    /// # Errors
    ///
    /// Same conditions as [`EvidenceReader::read_chunk`].
    pub async fn read_all(&mut self) -> Result<Vec<u8>, VaultError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.read_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// Filename to offer for the decrypted evidence.
    #[must_use]
    pub fn download_name(&self) -> &str {
        self.locator.download_name()
    }

    /// Plaintext length established by the verification pass.
    #[must_use]
    pub fn plaintext_len(&self) -> u64 {
        self.plaintext_len
    }

    /// Locator this reader was opened for.
    #[must_use]
    pub fn locator(&self) -> &Locator {
        &self.locator
    }
}

/// Hash a committed blob, `None` if the name does not exist.
async fn digest_blob<Bk: Backend>(
    backend: &Bk,
    name: &str,
) -> Result<Option<(ContentDigest, u64)>, StorageError> {
    let mut reader = match backend.open(name).await {
        Ok(reader) => reader,
        Err(StorageError::NotFound { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut hasher = ContentHasher::new();
    let mut len = 0u64;
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        len += n as u64;
        hasher.update(&buf[..n]);
    }
    Ok(Some((hasher.finish(), len)))
}

async fn destroy_plaintext(path: &Path) -> Option<CleanupWarning> {
    match fs::remove_file(path).await {
        Ok(()) => None,
        Err(e) => {
            let warning = CleanupWarning { path: path.to_path_buf(), reason: e.to_string() };
            tracing::warn!("{warning}");
            Some(warning)
        },
    }
}

fn integrity(locator: &Locator, detail: &dyn fmt::Display) -> VaultError {
    tracing::warn!(locator = %locator, %detail, "Evidence failed integrity verification");
    VaultError::Integrity { locator: locator.clone(), detail: detail.to_string() }
}

fn ciphertext_open_error(locator: &Locator, e: StorageError) -> VaultError {
    match e {
        StorageError::NotFound { .. } => {
            VaultError::CiphertextMissing { locator: locator.clone() }
        },
        other => other.into(),
    }
}

/// A seal can only fail at store time when the input outgrows the
/// segment counter.
fn oversized_input(e: SealError) -> VaultError {
    VaultError::Validation { reason: e.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn test_vault() -> EvidenceStore<MemoryBackend, MemoryBackend> {
        EvidenceStore::new(
            MemoryBackend::new(),
            MemoryBackend::new(),
            VaultKey::from_bytes([7u8; 32]),
            AccessGate::default(),
        )
    }

    #[tokio::test]
    async fn store_retrieve_roundtrip() {
        let vault = test_vault();
        let receipt = vault
            .store(EvidenceSource::from_bytes(&b"body camera footage"[..]), "cam.mp4")
            .await
            .unwrap();

        assert_eq!(receipt.size, 19);
        assert!(receipt.cleanup.is_none());
        assert!(receipt.locator.object_name().ends_with(".mp4.enc"));

        let mut reader = vault
            .retrieve(&receipt.locator.to_string(), &[Role::Dispatcher])
            .await
            .unwrap();
        assert_eq!(reader.plaintext_len(), 19);
        assert_eq!(reader.read_all().await.unwrap(), b"body camera footage");
        assert_eq!(reader.read_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_evidence_roundtrips() {
        let vault = test_vault();
        let receipt = vault.store(EvidenceSource::from_bytes(Vec::new()), "empty").await.unwrap();
        assert_eq!(receipt.size, 0);

        let mut reader =
            vault.retrieve(&receipt.locator.to_string(), &[Role::Responder]).await.unwrap();
        assert_eq!(reader.plaintext_len(), 0);
        assert_eq!(reader.read_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_hides_blob_without_sidecar() {
        let vault = test_vault();
        let receipt =
            vault.store(EvidenceSource::from_bytes(&b"x"[..]), "a.txt").await.unwrap();
        assert_eq!(vault.list().await.unwrap(), vec![receipt.locator.clone()]);

        vault.primary.delete(&receipt.locator.metadata_name()).await.unwrap();
        assert!(vault.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_locator_is_rejected_without_io() {
        let vault = test_vault();
        let err = vault.retrieve("/evidence/../sneaky.enc", &[Role::Responder]).await.unwrap_err();
        assert!(matches!(err, VaultError::Validation { .. }));
    }
}
