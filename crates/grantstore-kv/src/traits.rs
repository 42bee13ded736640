//! Provider traits: the abstract interface for transactional bucket storage.
//!
//! The grant store only ever talks to these traits, so any engine that can
//! offer isolated read transactions and atomic write transactions over named
//! buckets can back it.

use crate::error::{Result, StoreError};

/// Operations available inside any transaction.
pub trait ReadTx {
    /// Read the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key is absent and
    /// [`StoreError::BucketNotFound`] if the bucket does not exist.
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Whether `bucket` has been created.
    fn bucket_exists(&self, bucket: &str) -> Result<bool>;
}

/// Operations available inside a write transaction.
///
/// Changes become visible to other transactions only when the surrounding
/// [`KvStore::update`] commits.
pub trait WriteTx: ReadTx {
    /// Create `bucket` unless it already exists.
    fn create_bucket_if_not_exists(&mut self, bucket: &str) -> Result<()>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&mut self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`. Removing an absent key succeeds.
    fn delete(&mut self, bucket: &str, key: &[u8]) -> Result<()>;
}

/// A transactional bucket/key-value provider.
///
/// # Design Notes
///
/// - **Closure scoped transactions**: the transaction lives exactly as long as
///   the closure. `view` always rolls back. `update` commits if the closure
///   returns `Ok` and rolls back otherwise.
/// - **Caller error types**: closures may return any error type that a
///   [`StoreError`] converts into, so callers can mix their own failures
///   with provider failures and still abort the transaction.
pub trait KvStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Transactions
    // ─────────────────────────────────────────────────────────────────────────

    /// Run `f` inside a read-only transaction.
    fn view<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&dyn ReadTx) -> std::result::Result<T, E>,
        E: From<StoreError>;

    /// Run `f` inside a read-write transaction.
    fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn WriteTx) -> std::result::Result<T, E>,
        E: From<StoreError>;

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Release the provider.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}
