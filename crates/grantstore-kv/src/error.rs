//! Error types for the key-value providers.

use thiserror::Error;

/// Errors that can occur inside a provider.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The bucket was never created.
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// A thread panicked while holding a provider lock.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn poisoned(err: impl std::fmt::Display) -> Self {
        Self::LockPoisoned(err.to_string())
    }
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, StoreError>;
