//! Storage backends for ciphertext and sidecar blobs.
//!
//! Trait-based abstraction over flat blob stores. The vault drives two
//! independent backends, one primary and one backup, and only ever deals
//! in whole named objects. Writes go through a staged [`BlobWriter`] so a
//! crashed or aborted store leaves no partially written object visible.

mod chaos;
mod fs;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;
pub use chaos::ChaosBackend;
pub use fs::FsBackend;
pub use memory::MemoryBackend;
use tokio::io::AsyncRead;

use crate::error::StorageError;

/// Blob store abstraction.
///
/// Must be Clone (the vault hands clones to concurrent operations), Send +
/// Sync, and cheap to clone. Implementations share internal state via Arc,
/// so clones access the same underlying objects.
///
/// Object names are flat, no directory structure. Names are produced by
/// the vault's locator allocator and are never interpreted by backends.
#[async_trait]
pub trait Backend: Clone + Send + Sync + 'static {
    /// Begin a staged write of a new object.
    ///
    /// Data written through the returned handle must not become visible to
    /// [`Backend::open`], [`Backend::exists`], or [`Backend::list`] until
    /// [`BlobWriter::commit`] returns.
    ///
    /// # Invariants
    ///
    /// - Post (commit): the object is durably visible under `name`
    /// - Post (abort or drop): no trace of the write remains
    async fn create(&self, name: &str) -> Result<Box<dyn BlobWriter>, StorageError>;

    /// Open a committed object for streamed reading.
    ///
    /// Returns [`StorageError::NotFound`] if no object with this name has
    /// been committed.
    async fn open(&self, name: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>, StorageError>;

    /// Whether a committed object with this name exists.
    async fn exists(&self, name: &str) -> Result<bool, StorageError>;

    /// Remove a committed object.
    ///
    /// Idempotent: removing a name that does not exist is not an error.
    async fn delete(&self, name: &str) -> Result<(), StorageError>;

    /// Names of all committed objects starting with `prefix`, unordered.
    ///
    /// Pass `""` to list everything. Staged writes never appear.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Handle for one staged object write.
///
/// Consuming methods take `Box<Self>` so a writer can only be finished
/// once. Dropping a writer without calling either is equivalent to
/// [`BlobWriter::abort`].
#[async_trait]
pub trait BlobWriter: Send {
    /// Append a chunk to the staged object.
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), StorageError>;

    /// Durably publish the staged object under its name.
    ///
    /// Returns [`StorageError::AlreadyExists`] if another object was
    /// committed under the same name in the meantime.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Discard the staged object.
    async fn abort(self: Box<Self>) -> Result<(), StorageError>;
}
