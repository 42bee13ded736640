//! Error types for the grant store core.

use thiserror::Error;

/// Errors raised while encoding or decoding records and user data.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A user data payload does not match its declared tag
    /// (truncated varint, overflow, trailing bytes, bad bool length...).
    #[error("wrong value for {tag} user data")]
    WrongValue { tag: &'static str },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),

    /// A stored record is missing a required field or has a field of the wrong type.
    #[error("malformed record: {0}")]
    MalformedRecord(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
