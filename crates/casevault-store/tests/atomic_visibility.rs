//! Publication atomicity tests.
//!
//! The sidecar commit is the publication point: a locator either has
//! ciphertext on both backends plus a sidecar, or it does not exist.
//! Chaotic backends inject failures at chosen steps of the store
//! pipeline and the tests check that nothing half-written stays behind
//! or becomes visible.

use bytes::Bytes;
use casevault_crypto::VaultKey;
use casevault_store::{
    AccessGate, Backend, ChaosBackend, EncryptionMetadata, EvidenceSource, EvidenceStore,
    MemoryBackend, Role, VaultError,
};

fn key() -> VaultKey {
    VaultKey::from_bytes([0x42; 32])
}

/// Commit an object directly, bypassing the store pipeline.
async fn commit_blob(backend: &MemoryBackend, name: &str, bytes: &[u8]) {
    let mut writer = backend.create(name).await.unwrap();
    writer.write_chunk(Bytes::from(bytes.to_vec())).await.unwrap();
    writer.commit().await.unwrap();
}

#[tokio::test]
async fn test_sidecar_failure_unwinds_both_backends() {
    let primary = ChaosBackend::new(MemoryBackend::new(), 1.0).fail_matching(".meta.json");
    let backup = MemoryBackend::new();
    let vault =
        EvidenceStore::new(primary.clone(), backup.clone(), key(), AccessGate::default());

    let err = vault
        .store(EvidenceSource::from_bytes(&b"will not survive"[..]), "doc.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Storage(_)), "got {err:?}");

    // The ciphertext had already landed on both backends; the failed
    // publication must have scrubbed it back out.
    assert_eq!(primary.inner().object_count(), 0);
    assert_eq!(backup.object_count(), 0);
    assert!(vault.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_backup_failure_unwinds_primary() {
    let primary = MemoryBackend::new();
    let backup = ChaosBackend::new(MemoryBackend::new(), 1.0);
    let vault =
        EvidenceStore::new(primary.clone(), backup.clone(), key(), AccessGate::default());

    let err = vault
        .store(EvidenceSource::from_bytes(&b"replica or nothing"[..]), "doc.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Storage(_)), "got {err:?}");

    assert_eq!(primary.object_count(), 0, "committed primary ciphertext must be scrubbed");
    assert_eq!(backup.inner().object_count(), 0);
    assert!(vault.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_primary_failure_never_reaches_backup() {
    let primary = ChaosBackend::new(MemoryBackend::new(), 1.0).fail_matching(".enc");
    let backup = ChaosBackend::new(MemoryBackend::new(), 0.0);
    let vault =
        EvidenceStore::new(primary.clone(), backup.clone(), key(), AccessGate::default());

    let err = vault
        .store(EvidenceSource::from_bytes(&b"never staged"[..]), "doc.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Storage(_)), "got {err:?}");

    assert_eq!(backup.operation_count(), 0, "replication must not start");
    assert_eq!(primary.inner().object_count(), 0);
}

#[tokio::test]
async fn test_blob_without_sidecar_is_invisible() {
    let primary = MemoryBackend::new();
    let vault =
        EvidenceStore::new(primary.clone(), MemoryBackend::new(), key(), AccessGate::default());

    let receipt =
        vault.store(EvidenceSource::from_bytes(&b"published"[..]), "real.txt").await.unwrap();
    commit_blob(&primary, "999-orphan.enc", b"ciphertext with no record").await;

    let listed = vault.list().await.unwrap();
    assert_eq!(listed, vec![receipt.locator]);

    let err =
        vault.retrieve("/evidence/999-orphan.enc", &[Role::Responder]).await.unwrap_err();
    assert!(matches!(err, VaultError::MetadataMissing { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_sidecar_without_blob_reports_missing_ciphertext() {
    let primary = MemoryBackend::new();
    let vault =
        EvidenceStore::new(primary.clone(), MemoryBackend::new(), key(), AccessGate::default());

    let record = EncryptionMetadata { nonce: "ab".repeat(19), auth_tag: "cd".repeat(16) };
    commit_blob(&primary, "999-orphan.meta.json", &record.to_json().unwrap()).await;

    assert!(vault.list().await.unwrap().is_empty());

    let err =
        vault.retrieve("/evidence/999-orphan.enc", &[Role::Responder]).await.unwrap_err();
    assert!(matches!(err, VaultError::CiphertextMissing { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_failed_store_does_not_disturb_published_evidence() {
    let chaos = ChaosBackend::new(MemoryBackend::new(), 0.0);
    let vault = EvidenceStore::new(
        chaos.clone(),
        MemoryBackend::new(),
        key(),
        AccessGate::default(),
    );

    let receipt =
        vault.store(EvidenceSource::from_bytes(&b"keep me"[..]), "keep.txt").await.unwrap();

    // Reconfigure the same objects to reject sidecar writes, then fail a
    // second store.
    let failing = ChaosBackend::new(chaos.inner().clone(), 1.0).fail_matching(".meta.json");
    let flaky_vault =
        EvidenceStore::new(failing, MemoryBackend::new(), key(), AccessGate::default());
    flaky_vault
        .store(EvidenceSource::from_bytes(&b"lost"[..]), "lost.txt")
        .await
        .unwrap_err();

    // The earlier evidence is intact and still the only one listed.
    assert_eq!(vault.list().await.unwrap(), vec![receipt.locator.clone()]);
    let mut reader = vault.retrieve(&receipt.locator.to_string(), &[Role::Responder]).await.unwrap();
    assert_eq!(reader.read_all().await.unwrap(), b"keep me");
}
