//! In-memory blob backend for testing and simulation.

use std::{
    collections::HashMap,
    io::Cursor,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

use super::{Backend, BlobWriter};
use crate::error::StorageError;

/// In-memory blob backend for testing and simulation.
///
/// Committed objects live in a `HashMap` behind `Arc<Mutex<>>` so clones
/// share one store. Thread-safe through Mutex, but uses `lock().expect()`
/// which will panic if the mutex is poisoned - acceptable for test code.
/// Staged writes buffer in the writer and only touch the map on commit.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    objects: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl MemoryBackend {
    /// Create a new empty `MemoryBackend`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed objects.
    ///
    /// Useful for debugging and testing.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (a thread panicked while
    /// holding the lock). This is acceptable for test/simulation code.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.lock().expect("Mutex poisoned").len()
    }

    /// Raw bytes of a committed object, if present.
    ///
    /// Lets tamper tests inspect ciphertext directly.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn blob(&self, name: &str) -> Option<Bytes> {
        self.objects.lock().expect("Mutex poisoned").get(name).cloned()
    }

    /// Overwrite a committed object in place, bypassing staging.
    ///
    /// Lets tamper tests corrupt ciphertext or sidecar records after the
    /// fact. Returns `false` if no object with this name exists.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    pub fn replace(&self, name: &str, bytes: impl Into<Bytes>) -> bool {
        let mut objects = self.objects.lock().expect("Mutex poisoned");
        match objects.get_mut(name) {
            Some(slot) => {
                *slot = bytes.into();
                true
            },
            None => false,
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn create(&self, name: &str) -> Result<Box<dyn BlobWriter>, StorageError> {
        Ok(Box::new(MemoryWriter {
            name: name.to_string(),
            buf: Vec::new(),
            objects: Arc::clone(&self.objects),
        }))
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    async fn open(&self, name: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>, StorageError> {
        let objects = self.objects.lock().expect("Mutex poisoned");
        let bytes = objects
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { name: name.to_string() })?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.objects.lock().expect("Mutex poisoned").contains_key(name))
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        self.objects.lock().expect("Mutex poisoned").remove(name);
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let objects = self.objects.lock().expect("Mutex poisoned");
        Ok(objects.keys().filter(|name| name.starts_with(prefix)).cloned().collect())
    }
}

/// Staged write buffered in memory until commit.
struct MemoryWriter {
    name: String,
    buf: Vec<u8>,
    objects: Arc<Mutex<HashMap<String, Bytes>>>,
}

#[async_trait]
impl BlobWriter for MemoryWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), StorageError> {
        self.buf.extend_from_slice(&chunk);
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        use std::collections::hash_map::Entry;

        let Self { name, buf, objects } = *self;
        let mut objects = objects.lock().expect("Mutex poisoned");
        match objects.entry(name) {
            Entry::Occupied(occupied) => {
                Err(StorageError::AlreadyExists { name: occupied.key().clone() })
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Bytes::from(buf));
                Ok(())
            },
        }
    }

    async fn abort(self: Box<Self>) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    async fn read_all(backend: &MemoryBackend, name: &str) -> Vec<u8> {
        let mut reader = backend.open(name).await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_new_backend_is_empty() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.object_count(), 0);
        assert!(backend.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_staged_write_is_invisible_until_commit() {
        let backend = MemoryBackend::new();

        let mut writer = backend.create("a.enc").await.unwrap();
        writer.write_chunk(Bytes::from_static(b"ci")).await.unwrap();
        writer.write_chunk(Bytes::from_static(b"pher")).await.unwrap();

        assert!(!backend.exists("a.enc").await.unwrap());
        assert_eq!(backend.object_count(), 0);

        writer.commit().await.unwrap();

        assert!(backend.exists("a.enc").await.unwrap());
        assert_eq!(read_all(&backend, "a.enc").await, b"cipher");
    }

    #[tokio::test]
    async fn test_duplicate_commit_is_rejected() {
        let backend = MemoryBackend::new();

        backend.create("dup").await.unwrap().commit().await.unwrap();

        let writer = backend.create("dup").await.unwrap();
        let err = writer.commit().await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_abort_discards_staged_bytes() {
        let backend = MemoryBackend::new();

        let mut writer = backend.create("gone").await.unwrap();
        writer.write_chunk(Bytes::from_static(b"partial")).await.unwrap();
        writer.abort().await.unwrap();

        assert!(!backend.exists("gone").await.unwrap());
        assert_eq!(backend.object_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let backend = MemoryBackend::new();
        backend.create("once").await.unwrap().commit().await.unwrap();

        backend.delete("once").await.unwrap();
        backend.delete("once").await.unwrap();
        assert!(!backend.exists("once").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix() {
        let backend = MemoryBackend::new();
        for name in ["1-aa.enc", "1-aa.meta.json", "2-bb.enc"] {
            backend.create(name).await.unwrap().commit().await.unwrap();
        }

        let mut matching = backend.list("1-aa").await.unwrap();
        matching.sort();
        assert_eq!(matching, vec!["1-aa.enc".to_string(), "1-aa.meta.json".to_string()]);
    }

    #[tokio::test]
    async fn test_replace_corrupts_in_place() {
        let backend = MemoryBackend::new();
        let mut writer = backend.create("evidence.enc").await.unwrap();
        writer.write_chunk(Bytes::from_static(b"original")).await.unwrap();
        writer.commit().await.unwrap();

        assert!(backend.replace("evidence.enc", Bytes::from_static(b"tampered")));
        assert_eq!(read_all(&backend, "evidence.enc").await, b"tampered");

        assert!(!backend.replace("missing", Bytes::new()));
    }

    #[tokio::test]
    async fn test_open_missing_is_not_found() {
        let backend = MemoryBackend::new();
        let err = backend.open("missing").await.err().unwrap();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }
}
