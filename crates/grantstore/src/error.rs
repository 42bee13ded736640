//! Error types for the grant store.

use grantstore_core::CoreError;
use grantstore_kv::StoreError;
use thiserror::Error;

/// Errors that can occur during grant store operations.
#[derive(Debug, Error)]
pub enum GrantError {
    /// No entry under `key` in `bucket`.
    #[error("{bucket} not found: {key}")]
    NotFound { bucket: &'static str, key: String },

    /// An insert hit an existing entry.
    #[error("{bucket} already exists: {key}")]
    AlreadyExists { bucket: &'static str, key: String },

    /// The entry exists but has expired.
    #[error("{bucket} expired: {key}")]
    Expired { bucket: &'static str, key: String },

    /// Record or user data codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl GrantError {
    pub(crate) fn not_found(bucket: &'static str, key: &str) -> Self {
        Self::NotFound {
            bucket,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Whether a stored user data payload did not match its tag.
    pub fn is_wrong_value(&self) -> bool {
        matches!(self, Self::Codec(CoreError::WrongValue { .. }))
    }
}

/// Result type for grant store operations.
pub type Result<T> = std::result::Result<T, GrantError>;
