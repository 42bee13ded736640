//! User data: a dynamically typed value attached to clients and grants.
//!
//! [`UserData`] is a closed sum type. [`UserDataCodec`] turns it into a
//! tagged [`Envelope`] for storage and back. Scalars use the varint encodings
//! from [`crate::varint`]. Floats are stored by bit pattern so they round-trip
//! exactly.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{CoreError, Result};
use crate::message::{Message, MessageRegistry};
use crate::varint::{put_uvarint, put_varint, uvarint_exact, varint_exact};

/// A value attached to a record by the caller.
#[derive(Debug, Clone, Default)]
pub enum UserData {
    /// No value.
    #[default]
    Nil,
    /// Raw byte blob.
    Bytes(Bytes),
    /// UTF-8 text.
    Text(String),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    Uint(u64),
    Bool(bool),
    Float(f64),
    /// A registered structured message.
    Message(Arc<dyn Message>),
}

impl UserData {
    /// Wrap a structured message.
    pub fn message<M: Message>(message: M) -> Self {
        Self::Message(Arc::new(message))
    }

    /// The envelope tag this value encodes to.
    pub fn tag(&self) -> Tag {
        match self {
            Self::Nil => Tag::Nil,
            Self::Bytes(_) => Tag::Bytes,
            Self::Text(_) => Tag::Text,
            Self::Int(_) => Tag::Int,
            Self::Uint(_) => Tag::Uint,
            Self::Bool(_) => Tag::Bool,
            Self::Float(_) => Tag::Float,
            Self::Message(_) => Tag::Message,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Uint(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Borrow the message as its concrete type, if it is one.
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        match self {
            Self::Message(m) => m.as_any().downcast_ref::<M>(),
            _ => None,
        }
    }
}

impl PartialEq for UserData {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Uint(a), Self::Uint(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            // Bit equality: NaN payloads and signed zero are preserved by the codec.
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Message(a), Self::Message(b)) => a.message_eq(b.as_ref()),
            _ => false,
        }
    }
}

macro_rules! from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for UserData {
            fn from(n: $t) -> Self {
                Self::Int(n as i64)
            }
        })*
    };
}

macro_rules! from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for UserData {
            fn from(n: $t) -> Self {
                Self::Uint(n as u64)
            }
        })*
    };
}

from_signed!(i8, i16, i32, i64, isize);
from_unsigned!(u8, u16, u32, u64, usize);

impl From<bool> for UserData {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f32> for UserData {
    fn from(f: f32) -> Self {
        Self::Float(f64::from(f))
    }
}

impl From<f64> for UserData {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for UserData {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for UserData {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for UserData {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(b))
    }
}

impl From<&[u8]> for UserData {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<Bytes> for UserData {
    fn from(b: Bytes) -> Self {
        Self::Bytes(b)
    }
}

impl<T: Into<UserData>> From<Option<T>> for UserData {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Nil, Into::into)
    }
}

/// Envelope tag: which [`UserData`] variant the payload holds.
///
/// The numeric values are persisted and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Tag {
    #[default]
    Nil = 0,
    Message = 1,
    Bytes = 2,
    Text = 3,
    Int = 4,
    Uint = 5,
    Bool = 6,
    Float = 7,
}

impl Tag {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Nil),
            1 => Some(Self::Message),
            2 => Some(Self::Bytes),
            3 => Some(Self::Text),
            4 => Some(Self::Int),
            5 => Some(Self::Uint),
            6 => Some(Self::Bool),
            7 => Some(Self::Float),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Message => "message",
            Self::Bytes => "bytes",
            Self::Text => "text",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Bool => "bool",
            Self::Float => "float",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The stored form of a [`UserData`] value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    pub tag: Tag,
    /// Message type name. Empty for every other tag.
    pub type_name: String,
    pub data: Vec<u8>,
}

impl Envelope {
    /// The envelope of [`UserData::Nil`].
    pub fn nil() -> Self {
        Self::default()
    }

    fn scalar(tag: Tag, data: Vec<u8>) -> Self {
        Self {
            tag,
            type_name: String::new(),
            data,
        }
    }
}

/// Encodes and decodes user data envelopes.
///
/// Cloning is cheap; the message registry is shared.
#[derive(Debug, Clone, Default)]
pub struct UserDataCodec {
    registry: Arc<MessageRegistry>,
}

impl UserDataCodec {
    /// Create a codec that can rebuild the messages in `registry`.
    pub fn new(registry: MessageRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    /// Encode a value.
    ///
    /// Only fails if a structured message cannot serialize itself.
    pub fn encode(&self, value: &UserData) -> Result<Envelope> {
        let envelope = match value {
            UserData::Nil => Envelope::nil(),
            UserData::Message(message) => Envelope {
                tag: Tag::Message,
                type_name: message.type_name().to_string(),
                data: message.encode()?,
            },
            UserData::Bytes(b) => Envelope::scalar(Tag::Bytes, b.to_vec()),
            UserData::Text(s) => Envelope::scalar(Tag::Text, s.as_bytes().to_vec()),
            UserData::Int(n) => {
                let mut data = Vec::with_capacity(crate::varint::MAX_VARINT_LEN64);
                put_varint(&mut data, *n);
                Envelope::scalar(Tag::Int, data)
            }
            UserData::Uint(n) => {
                let mut data = Vec::with_capacity(crate::varint::MAX_VARINT_LEN64);
                put_uvarint(&mut data, *n);
                Envelope::scalar(Tag::Uint, data)
            }
            UserData::Bool(b) => Envelope::scalar(Tag::Bool, vec![u8::from(*b)]),
            UserData::Float(f) => {
                let mut data = Vec::with_capacity(crate::varint::MAX_VARINT_LEN64);
                put_uvarint(&mut data, f.to_bits());
                Envelope::scalar(Tag::Float, data)
            }
        };
        Ok(envelope)
    }

    /// Decode an envelope.
    ///
    /// A message whose type name is not registered decodes to
    /// [`UserData::Nil`] without error. Scalar payloads that do not match
    /// their tag fail with [`CoreError::WrongValue`].
    pub fn decode(&self, envelope: Envelope) -> Result<UserData> {
        let Envelope {
            tag,
            type_name,
            data,
        } = envelope;

        match tag {
            Tag::Nil => Ok(UserData::Nil),
            Tag::Message => match self.registry.decode(&type_name, &data) {
                Some(message) => Ok(UserData::Message(message?)),
                None => {
                    tracing::debug!(%type_name, "unregistered user data message type, decoding as nil");
                    Ok(UserData::Nil)
                }
            },
            Tag::Bytes => Ok(UserData::Bytes(Bytes::from(data))),
            Tag::Text => String::from_utf8(data)
                .map(UserData::Text)
                .map_err(|_| wrong_value(tag)),
            Tag::Int => varint_exact(&data)
                .map(UserData::Int)
                .map_err(|_| wrong_value(tag)),
            Tag::Uint => uvarint_exact(&data)
                .map(UserData::Uint)
                .map_err(|_| wrong_value(tag)),
            Tag::Bool => match data.as_slice() {
                [b] => Ok(UserData::Bool(*b != 0)),
                _ => Err(wrong_value(tag)),
            },
            Tag::Float => uvarint_exact(&data)
                .map(|bits| UserData::Float(f64::from_bits(bits)))
                .map_err(|_| wrong_value(tag)),
        }
    }
}

fn wrong_value(tag: Tag) -> CoreError {
    CoreError::WrongValue { tag: tag.name() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CborMessage;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Consent {
        scopes: Vec<String>,
        remember: bool,
    }

    impl CborMessage for Consent {
        const TYPE_NAME: &'static str = "test.Consent";
    }

    fn roundtrip(codec: &UserDataCodec, value: UserData) -> UserData {
        let envelope = codec.encode(&value).unwrap();
        assert_eq!(envelope.tag, value.tag());
        codec.decode(envelope).unwrap()
    }

    #[test]
    fn test_scalar_roundtrip() {
        let codec = UserDataCodec::default();
        let values: Vec<UserData> = vec![
            UserData::Nil,
            "bar".into(),
            String::new().into(),
            vec![0u8, 1, 2, 255].into(),
            (-42i32).into(),
            i64::MIN.into(),
            u64::MAX.into(),
            true.into(),
            false.into(),
            std::f64::consts::PI.into(),
            f64::INFINITY.into(),
        ];

        for value in values {
            assert_eq!(roundtrip(&codec, value.clone()), value);
        }
    }

    #[test]
    fn test_float_is_bit_exact() {
        let codec = UserDataCodec::default();

        let nan = f64::from_bits(0x7ff8_0000_dead_beef);
        let decoded = roundtrip(&codec, UserData::Float(nan));
        assert_eq!(decoded.as_f64().unwrap().to_bits(), nan.to_bits());

        let neg_zero = roundtrip(&codec, UserData::Float(-0.0));
        assert_ne!(neg_zero, UserData::Float(0.0));
        assert_eq!(neg_zero, UserData::Float(-0.0));
    }

    #[test]
    fn test_small_numbers_are_compact() {
        let codec = UserDataCodec::default();
        assert_eq!(codec.encode(&UserData::Int(-1)).unwrap().data, vec![0x01]);
        assert_eq!(codec.encode(&UserData::Uint(5)).unwrap().data, vec![0x05]);
        assert_eq!(codec.encode(&UserData::Bool(true)).unwrap().data, vec![0x01]);
    }

    #[test]
    fn test_text_and_bytes_are_verbatim() {
        let codec = UserDataCodec::default();
        let text = codec.encode(&"bar".into()).unwrap();
        assert_eq!(text.data, b"bar");
        assert!(text.type_name.is_empty());

        let bytes = codec.encode(&UserData::from(&b"bar"[..])).unwrap();
        assert_eq!(bytes.tag, Tag::Bytes);
        assert_eq!(bytes.data, b"bar");
    }

    #[test]
    fn test_message_roundtrip() {
        let codec = UserDataCodec::new(MessageRegistry::new().with::<Consent>());
        let consent = Consent {
            scopes: vec!["read".into(), "write".into()],
            remember: true,
        };

        let envelope = codec.encode(&UserData::message(consent)).unwrap();
        assert_eq!(envelope.tag, Tag::Message);
        assert_eq!(envelope.type_name, "test.Consent");

        let decoded = codec.decode(envelope).unwrap();
        let consent = decoded.downcast_ref::<Consent>().unwrap();
        assert_eq!(consent.scopes, vec!["read", "write"]);
        assert!(consent.remember);
    }

    #[test]
    fn test_unregistered_message_decodes_to_nil() {
        let writer = UserDataCodec::new(MessageRegistry::new().with::<Consent>());
        let reader = UserDataCodec::default();

        let envelope = writer
            .encode(&UserData::message(Consent {
                scopes: vec![],
                remember: false,
            }))
            .unwrap();

        assert_eq!(reader.decode(envelope).unwrap(), UserData::Nil);
    }

    #[test]
    fn test_wrong_values() {
        let codec = UserDataCodec::default();
        let cases = [
            (Tag::Int, vec![]),
            (Tag::Int, vec![0x80]),
            (Tag::Uint, vec![0xff; 11]),
            (Tag::Uint, vec![0x01, 0x02]),
            (Tag::Bool, vec![]),
            (Tag::Bool, vec![0x01, 0x00]),
            (Tag::Float, vec![0x80, 0x80]),
            (Tag::Text, vec![0xc3, 0x28]),
        ];

        for (tag, data) in cases {
            let envelope = Envelope {
                tag,
                type_name: String::new(),
                data: data.clone(),
            };
            let err = codec.decode(envelope).unwrap_err();
            assert!(
                matches!(err, CoreError::WrongValue { tag: name } if name == tag.name()),
                "{tag} {data:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(UserData::from(None::<i32>), UserData::Nil);
        assert_eq!(UserData::from(Some(7u16)), UserData::Uint(7));
    }

    #[test]
    fn test_tag_numbering_is_stable() {
        for n in 0u8..=7 {
            assert_eq!(Tag::from_u8(n).unwrap().to_u8(), n);
        }
        assert_eq!(Tag::from_u8(8), None);
        assert_eq!(Tag::Message.to_u8(), 1);
        assert_eq!(Tag::Float.to_u8(), 7);
    }
}
