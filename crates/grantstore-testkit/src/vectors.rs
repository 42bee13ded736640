//! Golden test vectors for the user data envelope.
//!
//! Each vector pins the envelope tag and payload bytes of one value. A change
//! to any of them means stored records written earlier no longer decode to
//! the same value.

use serde::Serialize;

use grantstore_core::{Tag, UserData};

use crate::fixtures::{sample_codec, SampleSession};

/// A golden test vector.
#[derive(Debug, Clone, Serialize)]
pub struct EnvelopeVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Builds the value under test.
    #[serde(skip)]
    pub value: fn() -> UserData,
    /// Expected envelope tag number.
    pub tag: u8,
    /// Expected message type name, empty for scalars.
    pub type_name: &'static str,
    /// Expected payload (hex).
    pub data: &'static str,
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<EnvelopeVector> {
    vec![
        EnvelopeVector {
            name: "nil",
            value: || UserData::Nil,
            tag: Tag::Nil.to_u8(),
            type_name: "",
            data: "",
        },
        EnvelopeVector {
            name: "text bar",
            value: || UserData::from("bar"),
            tag: Tag::Text.to_u8(),
            type_name: "",
            data: "626172",
        },
        EnvelopeVector {
            name: "bytes",
            value: || UserData::from(vec![0xde, 0xad]),
            tag: Tag::Bytes.to_u8(),
            type_name: "",
            data: "dead",
        },
        EnvelopeVector {
            name: "int -1",
            value: || UserData::Int(-1),
            tag: Tag::Int.to_u8(),
            type_name: "",
            data: "01",
        },
        EnvelopeVector {
            name: "int 300",
            value: || UserData::Int(300),
            tag: Tag::Int.to_u8(),
            type_name: "",
            data: "d804",
        },
        EnvelopeVector {
            name: "int min",
            value: || UserData::Int(i64::MIN),
            tag: Tag::Int.to_u8(),
            type_name: "",
            data: "ffffffffffffffffff01",
        },
        EnvelopeVector {
            name: "uint 300",
            value: || UserData::Uint(300),
            tag: Tag::Uint.to_u8(),
            type_name: "",
            data: "ac02",
        },
        EnvelopeVector {
            name: "uint max",
            value: || UserData::Uint(u64::MAX),
            tag: Tag::Uint.to_u8(),
            type_name: "",
            data: "ffffffffffffffffff01",
        },
        EnvelopeVector {
            name: "bool true",
            value: || UserData::Bool(true),
            tag: Tag::Bool.to_u8(),
            type_name: "",
            data: "01",
        },
        EnvelopeVector {
            name: "bool false",
            value: || UserData::Bool(false),
            tag: Tag::Bool.to_u8(),
            type_name: "",
            data: "00",
        },
        EnvelopeVector {
            name: "float 1.0",
            value: || UserData::Float(1.0),
            tag: Tag::Float.to_u8(),
            type_name: "",
            data: "80808080808080f83f",
        },
        EnvelopeVector {
            name: "float -0.0",
            value: || UserData::Float(-0.0),
            tag: Tag::Float.to_u8(),
            type_name: "",
            data: "80808080808080808001",
        },
        EnvelopeVector {
            name: "session message",
            value: || {
                UserData::message(SampleSession {
                    user_id: 7,
                    remember: true,
                })
            },
            tag: Tag::Message.to_u8(),
            type_name: "grantstore.test.Session",
            // {"user_id": 7, "remember": true}
            data: "a267757365725f6964076872656d656d626572f5",
        },
    ]
}

/// Encode every vector and compare against its expected envelope.
///
/// Returns `(name, matches, actual payload hex)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let codec = sample_codec();
    all_vectors()
        .iter()
        .map(|v| {
            let (matches, hex) = match codec.encode(&(v.value)()) {
                Ok(envelope) => {
                    let hex = hex::encode(&envelope.data);
                    let matches = envelope.tag.to_u8() == v.tag
                        && envelope.type_name == v.type_name
                        && hex == v.data;
                    (matches, hex)
                }
                Err(err) => (false, err.to_string()),
            };
            (v.name.to_string(), matches, hex)
        })
        .collect()
}

/// All vectors as pretty JSON, for sharing with other implementations.
pub fn vectors_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&all_vectors())
}
