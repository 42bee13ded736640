//! # Grant Store Core
//!
//! Pure types for the grant store: the OAuth2 grant model, user data values
//! and the binary record codec.
//!
//! This crate does no I/O. Persistence lives in `grantstore-kv` and
//! `grantstore`.
//!
//! ## Key Types
//!
//! - [`Client`], [`AuthorizeData`], [`AccessData`] - the grant object graph
//! - [`UserData`] - a dynamically typed value attached to any of the above
//! - [`UserDataCodec`] - turns user data into tagged [`Envelope`]s and back
//! - [`ClientRecord`], [`AuthorizeRecord`], [`AccessRecord`] - stored forms
//!
//! ## Encoding
//!
//! Records are CBOR maps with integer keys. User data scalars are varints
//! (see [`varint`]), timestamps are fixed-width blobs (see [`timestamp`]).

pub mod error;
pub mod message;
pub mod model;
pub mod record;
pub mod timestamp;
pub mod userdata;
pub mod varint;

pub use error::{CoreError, Result};
pub use message::{CborMessage, Message, MessageRegistry};
pub use model::{AccessData, AuthorizeData, Client};
pub use record::{AccessRecord, AuthorizeRecord, ClientRecord};
pub use timestamp::{decode_timestamp, encode_timestamp};
pub use userdata::{Envelope, Tag, UserData, UserDataCodec};
pub use varint::VarintError;
