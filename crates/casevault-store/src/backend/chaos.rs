//! Chaotic backend wrapper for fault injection testing.
//!
//! Backend wrapper that randomly fails operations to test error handling
//! and crash recovery. Failures can also be targeted at object names
//! matching a substring, which lets tests kill exactly the sidecar write
//! or exactly the backup copy of a store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

use super::{Backend, BlobWriter};
use crate::error::StorageError;

/// Chaotic backend wrapper that randomly injects failures.
///
/// Delegates to an underlying backend but fails operations based on a
/// configured failure rate, optionally restricted to object names
/// containing a target substring. Uses Arc<Mutex<>> for the RNG state,
/// making it Clone and thread-safe. The operation counter covers every
/// delegated call, so tests can assert that a rejected request never
/// touched storage at all.
#[derive(Clone)]
pub struct ChaosBackend<B: Backend> {
    inner: B,
    state: Arc<ChaosState>,
}

struct ChaosState {
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// Only operations on names containing this substring are failed
    fail_matching: Option<String>,
    /// RNG state for deterministic chaos
    rng: Mutex<ChaosRng>,
    /// Operation counter, incremented by every backend call
    operation_count: Mutex<usize>,
}

impl ChaosState {
    fn record_operation(&self) {
        #[allow(clippy::expect_used)]
        let mut count = self.operation_count.lock().expect("operation_count mutex poisoned");
        *count += 1;
    }

    fn should_fail(&self, name: &str) -> bool {
        if let Some(pattern) = &self.fail_matching {
            if !name.contains(pattern.as_str()) {
                return false;
            }
        }
        #[allow(clippy::expect_used)]
        self.rng.lock().expect("ChaosRng mutex poisoned").should_fail(self.failure_rate)
    }

    fn injected(&self, name: &str) -> Result<(), StorageError> {
        if self.should_fail(name) {
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

/// Simple deterministic RNG for chaos injection.
///
/// Uses a linear congruential generator (LCG) for fast, deterministic
/// randomness. This ensures chaos tests are reproducible with the same
/// seed.
struct ChaosRng {
    state: u64,
}

impl ChaosRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    /// Check if we should fail (returns true with probability = `failure_rate`)
    fn should_fail(&mut self, failure_rate: f64) -> bool {
        self.next() < failure_rate
    }
}

impl<B: Backend> ChaosBackend<B> {
    /// Create a new chaotic backend wrapper.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: B, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x9E37_79B9_7F4A_7C15)
    }

    /// Create with explicit seed for reproducible chaos.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: B, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            state: Arc::new(ChaosState {
                failure_rate,
                fail_matching: None,
                rng: Mutex::new(ChaosRng::new(seed)),
                operation_count: Mutex::new(0),
            }),
        }
    }

    /// Restrict injected failures to object names containing `pattern`.
    ///
    /// Operations on other names always pass through. Intended for setup,
    /// before the backend is cloned; counters reset.
    #[must_use]
    pub fn fail_matching(self, pattern: impl Into<String>) -> Self {
        #[allow(clippy::expect_used)]
        let rng_state = self.state.rng.lock().expect("ChaosRng mutex poisoned").state;

        Self {
            inner: self.inner,
            state: Arc::new(ChaosState {
                failure_rate: self.state.failure_rate,
                fail_matching: Some(pattern.into()),
                rng: Mutex::new(ChaosRng::new(rng_state)),
                operation_count: Mutex::new(0),
            }),
        }
    }

    /// Underlying backend (for checking invariants after chaos).
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Total number of backend operations attempted.
    ///
    /// Each call to any backend or writer method increments this counter,
    /// whether or not a failure was injected.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.state.operation_count.lock().expect("operation_count mutex poisoned")
    }
}

#[async_trait]
impl<B: Backend> Backend for ChaosBackend<B> {
    async fn create(&self, name: &str) -> Result<Box<dyn BlobWriter>, StorageError> {
        self.state.record_operation();
        self.state.injected(name)?;
        let inner = self.inner.create(name).await?;
        Ok(Box::new(ChaosWriter {
            name: name.to_string(),
            inner,
            state: Arc::clone(&self.state),
        }))
    }

    async fn open(&self, name: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>, StorageError> {
        self.state.record_operation();
        self.state.injected(name)?;
        self.inner.open(name).await
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        self.state.record_operation();
        self.state.injected(name)?;
        self.inner.exists(name).await
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        self.state.record_operation();
        self.state.injected(name)?;
        self.inner.delete(name).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.state.record_operation();
        self.state.injected(prefix)?;
        self.inner.list(prefix).await
    }
}

/// Writer wrapper that keeps injecting against the object's name.
struct ChaosWriter {
    name: String,
    inner: Box<dyn BlobWriter>,
    state: Arc<ChaosState>,
}

#[async_trait]
impl BlobWriter for ChaosWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), StorageError> {
        self.state.record_operation();
        self.state.injected(&self.name)?;
        self.inner.write_chunk(chunk).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.state.record_operation();
        // An injected commit failure drops the inner writer, which
        // discards its staging just like a crash would.
        self.state.injected(&self.name)?;
        self.inner.commit().await
    }

    /// Abort is counted but never injected; cleanup paths always run.
    async fn abort(self: Box<Self>) -> Result<(), StorageError> {
        self.state.record_operation();
        self.inner.abort().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[tokio::test]
    async fn test_zero_failure_rate_never_fails() {
        let chaotic = ChaosBackend::new(MemoryBackend::new(), 0.0);

        for i in 0..50 {
            let name = format!("{i}.enc");
            let mut writer = chaotic.create(&name).await.expect("should not fail with 0% rate");
            writer.write_chunk(Bytes::from_static(b"x")).await.unwrap();
            writer.commit().await.unwrap();
        }

        assert_eq!(chaotic.list("").await.unwrap().len(), 50);
    }

    #[tokio::test]
    async fn test_full_failure_rate_always_fails() {
        let chaotic = ChaosBackend::new(MemoryBackend::new(), 1.0);

        assert!(chaotic.create("a.enc").await.is_err());
        assert!(chaotic.open("a.enc").await.is_err());
        assert!(chaotic.exists("a.enc").await.is_err());
        assert!(chaotic.list("").await.is_err());
        assert!(chaotic.inner().list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deterministic_with_seed() {
        let chaotic1 = ChaosBackend::with_seed(MemoryBackend::new(), 0.5, 42);
        let chaotic2 = ChaosBackend::with_seed(MemoryBackend::new(), 0.5, 42);

        for i in 0..100 {
            let name = format!("{i}.enc");
            let result1 = chaotic1.exists(&name).await;
            let result2 = chaotic2.exists(&name).await;
            assert_eq!(result1.is_ok(), result2.is_ok(), "determinism violated at iteration {i}");
        }
    }

    #[tokio::test]
    async fn test_targeted_failures_only_hit_matching_names() {
        let chaotic = ChaosBackend::new(MemoryBackend::new(), 1.0).fail_matching(".meta.json");

        let writer = chaotic.create("1-aa.enc").await.expect("non-matching name must pass");
        writer.commit().await.unwrap();

        assert!(chaotic.create("1-aa.meta.json").await.is_err());
        assert!(chaotic.exists("1-aa.meta.json").await.is_err());
        assert!(chaotic.exists("1-aa.enc").await.unwrap());
    }

    #[tokio::test]
    async fn test_operation_count_covers_writer_calls() {
        let chaotic = ChaosBackend::new(MemoryBackend::new(), 0.0);
        assert_eq!(chaotic.operation_count(), 0);

        let mut writer = chaotic.create("count.enc").await.unwrap();
        writer.write_chunk(Bytes::from_static(b"x")).await.unwrap();
        writer.commit().await.unwrap();
        chaotic.exists("count.enc").await.unwrap();

        // create + write_chunk + commit + exists
        assert_eq!(chaotic.operation_count(), 4);
    }

    #[tokio::test]
    async fn test_chaos_accesses_underlying_backend() {
        let chaotic = ChaosBackend::new(MemoryBackend::new(), 0.0);

        let mut writer = chaotic.create("real.enc").await.unwrap();
        writer.write_chunk(Bytes::from_static(b"cipher")).await.unwrap();
        writer.commit().await.unwrap();

        assert_eq!(chaotic.inner().blob("real.enc").unwrap(), Bytes::from_static(b"cipher"));
    }

    #[tokio::test]
    async fn test_targeted_create_never_reaches_inner_backend() {
        let chaotic = ChaosBackend::new(MemoryBackend::new(), 1.0).fail_matching(".enc");

        assert!(chaotic.create("x.enc").await.is_err());
        assert!(chaotic.inner().list("").await.unwrap().is_empty());
    }

    #[test]
    #[should_panic(expected = "failure_rate must be between 0.0 and 1.0")]
    fn test_rejects_invalid_failure_rate() {
        let _chaotic = ChaosBackend::new(MemoryBackend::new(), 1.5);
    }
}
