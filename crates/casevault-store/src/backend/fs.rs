//! Filesystem blob backend.
//!
//! Objects live as flat files under one root directory. Writes are staged
//! to a `<name>.part` sibling and renamed into place on commit, so a crash
//! mid-write never leaves a half-written object under its final name.

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{
    fs,
    io::{AsyncRead, AsyncWriteExt},
};

use super::{Backend, BlobWriter};
use crate::error::StorageError;

/// Suffix of staged-but-uncommitted files.
const STAGING_SUFFIX: &str = ".part";

/// Blob backend rooted at one flat directory.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Open a backend rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// `StorageError::Io` when the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Directory this backend stores objects under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        // Names come from the locator allocator and are flat. Refuse
        // anything that would resolve outside the root.
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(StorageError::Io(format!("invalid object name: {name:?}")));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl Backend for FsBackend {
    async fn create(&self, name: &str) -> Result<Box<dyn BlobWriter>, StorageError> {
        let final_path = self.object_path(name)?;
        let staged_path = self.object_path(&format!("{name}{STAGING_SUFFIX}"))?;

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged_path)
            .await
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    StorageError::AlreadyExists { name: name.to_string() }
                } else {
                    StorageError::from(e)
                }
            })?;

        Ok(Box::new(FsWriter {
            name: name.to_string(),
            file: Some(file),
            staged_path,
            final_path,
            finished: false,
        }))
    }

    async fn open(&self, name: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>, StorageError> {
        let path = self.object_path(name)?;
        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StorageError::NotFound { name: name.to_string() }
            } else {
                StorageError::from(e)
            }
        })?;
        Ok(Box::new(file))
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        let path = self.object_path(name)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let path = self.object_path(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.ends_with(STAGING_SUFFIX) || !name.starts_with(prefix) {
                continue;
            }
            names.push(name);
        }
        Ok(names)
    }
}

/// Staged write to a `.part` file, renamed into place on commit.
struct FsWriter {
    name: String,
    file: Option<fs::File>,
    staged_path: PathBuf,
    final_path: PathBuf,
    finished: bool,
}

#[async_trait]
impl BlobWriter for FsWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), StorageError> {
        let Some(file) = self.file.as_mut() else {
            return Err(StorageError::Io("write to a finished blob".to_string()));
        };
        file.write_all(&chunk).await?;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        let Some(mut file) = self.file.take() else {
            return Err(StorageError::Io("blob already finished".to_string()));
        };
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if fs::try_exists(&self.final_path).await? {
            // Leave the staged file to the Drop cleanup below.
            return Err(StorageError::AlreadyExists { name: self.name.clone() });
        }
        fs::rename(&self.staged_path, &self.final_path).await?;
        self.finished = true;
        Ok(())
    }

    async fn abort(mut self: Box<Self>) -> Result<(), StorageError> {
        self.file.take();
        fs::remove_file(&self.staged_path).await?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for FsWriter {
    fn drop(&mut self) {
        // Cancelled or abandoned writes must not leave staging files
        // behind. Removal failure here is unreportable.
        if !self.finished {
            self.file.take();
            let _ = std::fs::remove_file(&self.staged_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    async fn read_all(backend: &FsBackend, name: &str) -> Vec<u8> {
        let mut reader = backend.open(name).await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn staged_write_is_invisible_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::open(dir.path()).unwrap();

        let mut writer = backend.create("a.enc").await.unwrap();
        writer.write_chunk(Bytes::from_static(b"cipher")).await.unwrap();

        assert!(!backend.exists("a.enc").await.unwrap());
        assert!(backend.list("").await.unwrap().is_empty());

        writer.commit().await.unwrap();

        assert!(backend.exists("a.enc").await.unwrap());
        assert_eq!(backend.list("").await.unwrap(), vec!["a.enc".to_string()]);
        assert_eq!(read_all(&backend, "a.enc").await, b"cipher");
    }

    #[tokio::test]
    async fn commit_rejects_duplicate_name() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::open(dir.path()).unwrap();

        let mut writer = backend.create("dup.enc").await.unwrap();
        writer.write_chunk(Bytes::from_static(b"one")).await.unwrap();
        writer.commit().await.unwrap();

        let mut writer = backend.create("dup.enc").await.unwrap();
        writer.write_chunk(Bytes::from_static(b"two")).await.unwrap();
        let err = writer.commit().await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));

        assert_eq!(read_all(&backend, "dup.enc").await, b"one");
    }

    #[tokio::test]
    async fn concurrent_staging_of_same_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::open(dir.path()).unwrap();

        let _writer = backend.create("race.enc").await.unwrap();
        let err = backend.create("race.enc").await.err().unwrap();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn abort_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::open(dir.path()).unwrap();

        let mut writer = backend.create("gone.enc").await.unwrap();
        writer.write_chunk(Bytes::from_static(b"partial")).await.unwrap();
        writer.abort().await.unwrap();

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(!backend.exists("gone.enc").await.unwrap());
    }

    #[tokio::test]
    async fn dropped_writer_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::open(dir.path()).unwrap();

        {
            let mut writer = backend.create("dropped.enc").await.unwrap();
            writer.write_chunk(Bytes::from_static(b"partial")).await.unwrap();
        }

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::open(dir.path()).unwrap();

        backend.delete("never-existed.enc").await.unwrap();

        let writer = backend.create("once.enc").await.unwrap();
        writer.commit().await.unwrap();
        backend.delete("once.enc").await.unwrap();
        backend.delete("once.enc").await.unwrap();
        assert!(!backend.exists("once.enc").await.unwrap());
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::open(dir.path()).unwrap();

        for name in ["1-aa.enc", "1-aa.meta.json", "2-bb.enc"] {
            backend.create(name).await.unwrap().commit().await.unwrap();
        }

        let mut encs = backend.list("1-aa").await.unwrap();
        encs.sort();
        assert_eq!(encs, vec!["1-aa.enc".to_string(), "1-aa.meta.json".to_string()]);
        assert_eq!(backend.list("nope").await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn names_with_separators_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::open(dir.path()).unwrap();

        assert!(backend.create("../escape.enc").await.is_err());
        assert!(backend.open("sub/dir.enc").await.is_err());
        assert!(backend.exists("").await.is_err());
    }
}
