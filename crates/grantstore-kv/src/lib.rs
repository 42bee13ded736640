//! # Grant Store KV
//!
//! Transactional bucket/key-value providers. A provider stores opaque byte
//! values under byte keys, grouped into named buckets, and runs caller code
//! inside read or write transactions.
//!
//! ## Key Types
//!
//! - [`KvStore`] - the provider trait (`view`, `update`, `close`)
//! - [`ReadTx`] / [`WriteTx`] - what a transaction closure can do
//! - [`SqliteKv`] - SQLite-backed persistent provider
//! - [`MemoryKv`] - in-memory provider with the same semantics
//!
//! ## Usage
//!
//! ```rust
//! use grantstore_kv::{KvStore, MemoryKv, StoreError};
//!
//! let kv = MemoryKv::new();
//! kv.update(|tx| {
//!     tx.create_bucket_if_not_exists("client")?;
//!     tx.put("client", b"1", b"record")
//! })?;
//!
//! let value = kv.view(|tx| tx.get("client", b"1"))?;
//! assert_eq!(value.as_deref(), Some(&b"record"[..]));
//! # Ok::<(), StoreError>(())
//! ```
//!
//! ## Design Notes
//!
//! - **Read transactions never commit**: `view` always rolls back.
//! - **All or nothing writes**: `update` commits only if the closure returns `Ok`.
//! - **Buckets are explicit**: reading or writing a bucket that was never
//!   created fails with [`StoreError::BucketNotFound`].

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryKv;
pub use sqlite::SqliteKv;
pub use traits::{KvStore, ReadTx, WriteTx};
