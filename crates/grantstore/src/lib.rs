//! # Grant Store
//!
//! Transactional persistence for an OAuth2 authorization server: clients,
//! authorization codes, access tokens and the refresh token index, stored in
//! named buckets of an embedded key-value provider.
//!
//! ## Overview
//!
//! - **Clients** are created once, updated in place and removed explicitly.
//! - **Authorization codes** and **access tokens** are insert-only records
//!   that reference their client (and, for access tokens, the code and the
//!   previous token) by key.
//! - **Refresh tokens** are an index from refresh token to access token,
//!   written in the same transaction as the access token.
//!
//! Loads rebuild the full object graph from one consistent snapshot.
//!
//! ## Usage
//!
//! ```rust
//! use grantstore::{Client, GrantStore};
//!
//! let store = GrantStore::open_memory()?;
//! store.create_client(&Client::new("1", "secret", "http://localhost/").with_user_data("bar"))?;
//!
//! let client = store.get_client("1")?;
//! assert_eq!(client.user_data.as_str(), Some("bar"));
//! # Ok::<(), grantstore::GrantError>(())
//! ```
//!
//! ## Re-exports
//!
//! - `grantstore::core` - the grant model, user data and record codec
//! - `grantstore::kv` - the provider traits and their SQLite/memory backends

pub mod config;
pub mod error;
pub mod schema;
pub mod store;

// Re-export component crates
pub use grantstore_core as core;
pub use grantstore_kv as kv;

// Re-export main types for convenience
pub use config::GrantStoreConfig;
pub use error::{GrantError, Result};
pub use store::GrantStore;

// Re-export commonly used core types
pub use grantstore_core::{
    AccessData, AuthorizeData, CborMessage, Client, Message, MessageRegistry, UserData,
};
pub use grantstore_kv::{KvStore, MemoryKv, SqliteKv};
