//! Structured user data messages.
//!
//! A message is a caller-defined type that travels inside a user data
//! envelope together with a registered type name. On decode the type name is
//! looked up in a [`MessageRegistry`] to find the concrete type to rebuild.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CoreError, Result};

/// A structured value that can be attached as user data.
///
/// Most types should implement [`CborMessage`] instead, which provides this
/// trait through a blanket implementation.
pub trait Message: fmt::Debug + Send + Sync + 'static {
    /// The registered name used to find a decoder for this type.
    fn type_name(&self) -> &str;

    /// Serialize the message body.
    fn encode(&self) -> Result<Vec<u8>>;

    /// Access the concrete value for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Structural equality against another (possibly differently typed) message.
    fn message_eq(&self, other: &dyn Message) -> bool;
}

/// A serde type that is stored as CBOR inside a message envelope.
///
/// ```rust
/// use grantstore_core::{CborMessage, MessageRegistry};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Session {
///     user_id: u64,
/// }
///
/// impl CborMessage for Session {
///     const TYPE_NAME: &'static str = "example.Session";
/// }
///
/// let registry = MessageRegistry::new().with::<Session>();
/// assert!(registry.contains("example.Session"));
/// ```
pub trait CborMessage:
    Serialize + DeserializeOwned + fmt::Debug + PartialEq + Send + Sync + 'static
{
    /// Globally unique name for this message type.
    const TYPE_NAME: &'static str;
}

impl<T: CborMessage> Message for T {
    fn type_name(&self) -> &str {
        T::TYPE_NAME
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| CoreError::Encoding(e.to_string()))?;
        Ok(buf)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn message_eq(&self, other: &dyn Message) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }
}

type DecodeFn = fn(&[u8]) -> Result<Arc<dyn Message>>;

/// Maps message type names to decoders.
#[derive(Clone, Default)]
pub struct MessageRegistry {
    decoders: HashMap<String, DecodeFn>,
}

impl MessageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` so envelopes carrying `T::TYPE_NAME` can be decoded.
    pub fn register<T: CborMessage>(&mut self) -> &mut Self {
        self.decoders
            .insert(T::TYPE_NAME.to_string(), decode_cbor::<T> as DecodeFn);
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<T: CborMessage>(mut self) -> Self {
        self.register::<T>();
        self
    }

    /// Whether a decoder is registered for `type_name`.
    pub fn contains(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    /// Decode `data` as the message registered under `type_name`.
    ///
    /// Returns `None` if no decoder is registered.
    pub fn decode(&self, type_name: &str, data: &[u8]) -> Option<Result<Arc<dyn Message>>> {
        self.decoders.get(type_name).map(|decode| decode(data))
    }
}

impl fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("MessageRegistry")
            .field("types", &names)
            .finish()
    }
}

fn decode_cbor<T: CborMessage>(data: &[u8]) -> Result<Arc<dyn Message>> {
    let message: T =
        ciborium::from_reader(data).map_err(|e| CoreError::Decoding(e.to_string()))?;
    Ok(Arc::new(message))
}
