//! Stored record forms and their CBOR encoding.
//!
//! Each record is a CBOR map with small integer keys written in ascending
//! order, so the same record always produces the same bytes. References to
//! other records are flattened to their keys; an empty key means "none".

use ciborium::value::Value;

use crate::error::{CoreError, Result};
use crate::model::{AccessData, AuthorizeData, Client};
use crate::timestamp::{decode_timestamp, encode_timestamp};
use crate::userdata::{Envelope, Tag, UserDataCodec};

/// Field keys. Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub mod envelope {
        pub const TAG: u64 = 0;
        pub const TYPE_NAME: u64 = 1;
        pub const DATA: u64 = 2;
    }

    pub mod client {
        pub const ID: u64 = 0;
        pub const SECRET: u64 = 1;
        pub const REDIRECT_URI: u64 = 2;
        pub const USER_DATA: u64 = 3;
    }

    pub mod authorize {
        pub const CLIENT_ID: u64 = 0;
        pub const CODE: u64 = 1;
        pub const EXPIRES_IN: u64 = 2;
        pub const SCOPE: u64 = 3;
        pub const REDIRECT_URI: u64 = 4;
        pub const STATE: u64 = 5;
        pub const CREATED_AT: u64 = 6;
        pub const USER_DATA: u64 = 7;
        pub const CODE_CHALLENGE: u64 = 8;
        pub const CODE_CHALLENGE_METHOD: u64 = 9;
    }

    pub mod access {
        pub const CLIENT_ID: u64 = 0;
        pub const ACCESS_TOKEN: u64 = 1;
        pub const REFRESH_TOKEN: u64 = 2;
        pub const EXPIRES_IN: u64 = 3;
        pub const SCOPE: u64 = 4;
        pub const REDIRECT_URI: u64 = 5;
        pub const CREATED_AT: u64 = 6;
        pub const USER_DATA: u64 = 7;
        pub const AUTHORIZE_CODE: u64 = 8;
        pub const PREV_ACCESS_TOKEN: u64 = 9;
    }
}

/// Stored form of a [`Client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub id: String,
    pub secret: String,
    pub redirect_uri: String,
    pub user_data: Envelope,
}

impl ClientRecord {
    pub fn from_client(client: &Client, codec: &UserDataCodec) -> Result<Self> {
        Ok(Self {
            id: client.id.clone(),
            secret: client.secret.clone(),
            redirect_uri: client.redirect_uri.clone(),
            user_data: codec.encode(&client.user_data)?,
        })
    }

    pub fn into_client(self, codec: &UserDataCodec) -> Result<Client> {
        Ok(Client {
            id: self.id,
            secret: self.secret,
            redirect_uri: self.redirect_uri,
            user_data: codec.decode(self.user_data)?,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        use keys::client::*;
        encode_map(vec![
            entry(ID, text(&self.id)),
            entry(SECRET, text(&self.secret)),
            entry(REDIRECT_URI, text(&self.redirect_uri)),
            entry(USER_DATA, envelope_to_value(&self.user_data)),
        ])
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        use keys::client::*;
        let value = decode_value(bytes)?;
        let fields = Fields::new(&value, "client")?;
        Ok(Self {
            id: fields.required_text(ID, "id")?,
            secret: fields.text(SECRET, "secret")?,
            redirect_uri: fields.text(REDIRECT_URI, "redirect_uri")?,
            user_data: fields.envelope(USER_DATA, "user_data")?,
        })
    }
}

/// Stored form of an [`AuthorizeData`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRecord {
    pub client_id: String,
    pub code: String,
    pub expires_in: i32,
    pub scope: String,
    pub redirect_uri: String,
    pub state: String,
    /// Timestamp blob, see [`crate::timestamp`].
    pub created_at: Vec<u8>,
    pub user_data: Envelope,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl AuthorizeRecord {
    pub fn from_authorize(authorize: &AuthorizeData, codec: &UserDataCodec) -> Result<Self> {
        Ok(Self {
            client_id: authorize.client.id.clone(),
            code: authorize.code.clone(),
            expires_in: authorize.expires_in,
            scope: authorize.scope.clone(),
            redirect_uri: authorize.redirect_uri.clone(),
            state: authorize.state.clone(),
            created_at: encode_timestamp(&authorize.created_at),
            user_data: codec.encode(&authorize.user_data)?,
            code_challenge: authorize.code_challenge.clone(),
            code_challenge_method: authorize.code_challenge_method.clone(),
        })
    }

    /// Rebuild the domain value around an already resolved client.
    pub fn into_authorize(self, client: Client, codec: &UserDataCodec) -> Result<AuthorizeData> {
        Ok(AuthorizeData {
            client,
            code: self.code,
            expires_in: self.expires_in,
            scope: self.scope,
            redirect_uri: self.redirect_uri,
            state: self.state,
            created_at: decode_timestamp(&self.created_at)?,
            user_data: codec.decode(self.user_data)?,
            code_challenge: self.code_challenge,
            code_challenge_method: self.code_challenge_method,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        use keys::authorize::*;
        encode_map(vec![
            entry(CLIENT_ID, text(&self.client_id)),
            entry(CODE, text(&self.code)),
            entry(EXPIRES_IN, Value::Integer(self.expires_in.into())),
            entry(SCOPE, text(&self.scope)),
            entry(REDIRECT_URI, text(&self.redirect_uri)),
            entry(STATE, text(&self.state)),
            entry(CREATED_AT, Value::Bytes(self.created_at.clone())),
            entry(USER_DATA, envelope_to_value(&self.user_data)),
            entry(CODE_CHALLENGE, text(&self.code_challenge)),
            entry(CODE_CHALLENGE_METHOD, text(&self.code_challenge_method)),
        ])
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        use keys::authorize::*;
        let value = decode_value(bytes)?;
        let fields = Fields::new(&value, "authorize")?;
        Ok(Self {
            client_id: fields.text(CLIENT_ID, "client_id")?,
            code: fields.required_text(CODE, "code")?,
            expires_in: fields.i32(EXPIRES_IN, "expires_in")?,
            scope: fields.text(SCOPE, "scope")?,
            redirect_uri: fields.text(REDIRECT_URI, "redirect_uri")?,
            state: fields.text(STATE, "state")?,
            created_at: fields.bytes(CREATED_AT, "created_at")?,
            user_data: fields.envelope(USER_DATA, "user_data")?,
            code_challenge: fields.text(CODE_CHALLENGE, "code_challenge")?,
            code_challenge_method: fields.text(CODE_CHALLENGE_METHOD, "code_challenge_method")?,
        })
    }
}

/// Stored form of an [`AccessData`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub client_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i32,
    pub scope: String,
    pub redirect_uri: String,
    /// Timestamp blob, see [`crate::timestamp`].
    pub created_at: Vec<u8>,
    pub user_data: Envelope,
    /// Empty when the token was not exchanged from an authorization code.
    pub authorize_code: String,
    /// Empty when the token was not refreshed from a previous one.
    pub prev_access_token: String,
}

impl AccessRecord {
    pub fn from_access(access: &AccessData, codec: &UserDataCodec) -> Result<Self> {
        Ok(Self {
            client_id: access.client.id.clone(),
            access_token: access.access_token.clone(),
            refresh_token: access.refresh_token.clone(),
            expires_in: access.expires_in,
            scope: access.scope.clone(),
            redirect_uri: access.redirect_uri.clone(),
            created_at: encode_timestamp(&access.created_at),
            user_data: codec.encode(&access.user_data)?,
            authorize_code: access
                .authorize_data
                .as_ref()
                .map(|a| a.code.clone())
                .unwrap_or_default(),
            prev_access_token: access
                .access_data
                .as_ref()
                .map(|a| a.access_token.clone())
                .unwrap_or_default(),
        })
    }

    /// Rebuild the domain value around already resolved references.
    pub fn into_access(
        self,
        client: Client,
        authorize_data: Option<Box<AuthorizeData>>,
        access_data: Option<Box<AccessData>>,
        codec: &UserDataCodec,
    ) -> Result<AccessData> {
        Ok(AccessData {
            client,
            authorize_data,
            access_data,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_in: self.expires_in,
            scope: self.scope,
            redirect_uri: self.redirect_uri,
            created_at: decode_timestamp(&self.created_at)?,
            user_data: codec.decode(self.user_data)?,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        use keys::access::*;
        encode_map(vec![
            entry(CLIENT_ID, text(&self.client_id)),
            entry(ACCESS_TOKEN, text(&self.access_token)),
            entry(REFRESH_TOKEN, text(&self.refresh_token)),
            entry(EXPIRES_IN, Value::Integer(self.expires_in.into())),
            entry(SCOPE, text(&self.scope)),
            entry(REDIRECT_URI, text(&self.redirect_uri)),
            entry(CREATED_AT, Value::Bytes(self.created_at.clone())),
            entry(USER_DATA, envelope_to_value(&self.user_data)),
            entry(AUTHORIZE_CODE, text(&self.authorize_code)),
            entry(PREV_ACCESS_TOKEN, text(&self.prev_access_token)),
        ])
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        use keys::access::*;
        let value = decode_value(bytes)?;
        let fields = Fields::new(&value, "access")?;
        Ok(Self {
            client_id: fields.text(CLIENT_ID, "client_id")?,
            access_token: fields.required_text(ACCESS_TOKEN, "access_token")?,
            refresh_token: fields.text(REFRESH_TOKEN, "refresh_token")?,
            expires_in: fields.i32(EXPIRES_IN, "expires_in")?,
            scope: fields.text(SCOPE, "scope")?,
            redirect_uri: fields.text(REDIRECT_URI, "redirect_uri")?,
            created_at: fields.bytes(CREATED_AT, "created_at")?,
            user_data: fields.envelope(USER_DATA, "user_data")?,
            authorize_code: fields.text(AUTHORIZE_CODE, "authorize_code")?,
            prev_access_token: fields.text(PREV_ACCESS_TOKEN, "prev_access_token")?,
        })
    }
}

fn entry(key: u64, value: Value) -> (Value, Value) {
    (Value::Integer(key.into()), value)
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn envelope_to_value(envelope: &Envelope) -> Value {
    use keys::envelope::*;
    let mut entries = Vec::with_capacity(3);
    entries.push(entry(TAG, Value::Integer(envelope.tag.to_u8().into())));
    if !envelope.type_name.is_empty() {
        entries.push(entry(TYPE_NAME, text(&envelope.type_name)));
    }
    entries.push(entry(DATA, Value::Bytes(envelope.data.clone())));
    Value::Map(entries)
}

fn encode_map(entries: Vec<(Value, Value)>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(&Value::Map(entries), &mut buf)
        .map_err(|e| CoreError::Encoding(e.to_string()))?;
    Ok(buf)
}

fn decode_value(bytes: &[u8]) -> Result<Value> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::Decoding(e.to_string()))
}

/// Typed accessors over a decoded CBOR map.
struct Fields<'a> {
    kind: &'static str,
    entries: &'a [(Value, Value)],
}

impl<'a> Fields<'a> {
    fn new(value: &'a Value, kind: &'static str) -> Result<Self> {
        match value {
            Value::Map(entries) => Ok(Self { kind, entries }),
            _ => Err(CoreError::MalformedRecord(format!("{} record is not a map", kind))),
        }
    }

    fn get(&self, key: u64) -> Option<&'a Value> {
        find(self.entries, key)
    }

    fn malformed(&self, name: &str) -> CoreError {
        CoreError::MalformedRecord(format!("{} record: invalid {}", self.kind, name))
    }

    fn text(&self, key: u64, name: &str) -> Result<String> {
        match self.get(key) {
            Some(Value::Text(s)) => Ok(s.clone()),
            None => Ok(String::new()),
            _ => Err(self.malformed(name)),
        }
    }

    fn required_text(&self, key: u64, name: &str) -> Result<String> {
        match self.get(key) {
            Some(Value::Text(s)) => Ok(s.clone()),
            _ => Err(self.malformed(name)),
        }
    }

    fn i32(&self, key: u64, name: &str) -> Result<i32> {
        match self.get(key) {
            Some(Value::Integer(i)) => {
                i32::try_from(i128::from(*i)).map_err(|_| self.malformed(name))
            }
            None => Ok(0),
            _ => Err(self.malformed(name)),
        }
    }

    fn bytes(&self, key: u64, name: &str) -> Result<Vec<u8>> {
        match self.get(key) {
            Some(Value::Bytes(b)) => Ok(b.clone()),
            None => Ok(Vec::new()),
            _ => Err(self.malformed(name)),
        }
    }

    fn envelope(&self, key: u64, name: &str) -> Result<Envelope> {
        use keys::envelope::*;
        let entries = match self.get(key) {
            Some(Value::Map(entries)) => entries,
            None => return Ok(Envelope::nil()),
            _ => return Err(self.malformed(name)),
        };

        let tag = match find(entries, TAG) {
            Some(Value::Integer(i)) => {
                let n = i128::from(*i);
                match u8::try_from(n).ok().and_then(Tag::from_u8) {
                    Some(tag) => tag,
                    None => {
                        tracing::debug!(tag = %n, "unknown user data tag, decoding as nil");
                        Tag::Nil
                    }
                }
            }
            None => Tag::Nil,
            _ => return Err(self.malformed(name)),
        };
        let type_name = match find(entries, TYPE_NAME) {
            Some(Value::Text(s)) => s.clone(),
            None => String::new(),
            _ => return Err(self.malformed(name)),
        };
        let data = match find(entries, DATA) {
            Some(Value::Bytes(b)) => b.clone(),
            None => Vec::new(),
            _ => return Err(self.malformed(name)),
        };

        if tag == Tag::Nil {
            return Ok(Envelope::nil());
        }
        Ok(Envelope {
            tag,
            type_name,
            data,
        })
    }
}

fn find(entries: &[(Value, Value)], key: u64) -> Option<&Value> {
    entries
        .iter()
        .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == i128::from(key)))
        .map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::userdata::UserData;
    use chrono::{TimeZone, Utc};

    fn client() -> Client {
        Client::new("1", "secret", "http://localhost/").with_user_data("bar")
    }

    fn authorize() -> AuthorizeData {
        AuthorizeData {
            client: client(),
            code: "c1".into(),
            expires_in: 600,
            scope: "scope".into(),
            redirect_uri: "http://localhost/".into(),
            state: "state".into(),
            created_at: Utc.with_ymd_and_hms(2009, 11, 10, 23, 0, 0).unwrap(),
            user_data: UserData::Int(-7),
            code_challenge: "challenge".into(),
            code_challenge_method: "S256".into(),
        }
    }

    fn access() -> AccessData {
        AccessData {
            client: client(),
            authorize_data: Some(Box::new(authorize())),
            access_data: None,
            access_token: "t1".into(),
            refresh_token: "r1".into(),
            expires_in: 3600,
            scope: "scope".into(),
            redirect_uri: "http://localhost/".into(),
            created_at: Utc.with_ymd_and_hms(2009, 11, 10, 23, 0, 1).unwrap(),
            user_data: UserData::Float(1.5),
        }
    }

    #[test]
    fn test_client_record_roundtrip() {
        let codec = UserDataCodec::default();
        let record = ClientRecord::from_client(&client(), &codec).unwrap();
        let bytes = record.to_bytes().unwrap();

        let decoded = ClientRecord::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.into_client(&codec).unwrap(), client());
    }

    #[test]
    fn test_authorize_record_roundtrip() {
        let codec = UserDataCodec::default();
        let record = AuthorizeRecord::from_authorize(&authorize(), &codec).unwrap();
        assert_eq!(record.client_id, "1");

        let decoded = AuthorizeRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.into_authorize(client(), &codec).unwrap(), authorize());
    }

    #[test]
    fn test_access_record_flattens_references() {
        let codec = UserDataCodec::default();
        let mut next = access();
        next.access_token = "t2".into();
        next.authorize_data = None;
        next.access_data = Some(Box::new(access()));

        let record = AccessRecord::from_access(&next, &codec).unwrap();
        assert_eq!(record.client_id, "1");
        assert_eq!(record.authorize_code, "");
        assert_eq!(record.prev_access_token, "t1");

        let first = AccessRecord::from_access(&access(), &codec).unwrap();
        assert_eq!(first.authorize_code, "c1");
        assert_eq!(first.prev_access_token, "");
    }

    #[test]
    fn test_access_record_roundtrip() {
        let codec = UserDataCodec::default();
        let record = AccessRecord::from_access(&access(), &codec).unwrap();
        let decoded = AccessRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, record);

        let rebuilt = decoded
            .into_access(client(), Some(Box::new(authorize())), None, &codec)
            .unwrap();
        assert_eq!(rebuilt, access());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let codec = UserDataCodec::default();
        let record = AccessRecord::from_access(&access(), &codec).unwrap();
        assert_eq!(record.to_bytes().unwrap(), record.to_bytes().unwrap());
    }

    #[test]
    fn test_nil_envelope_layout() {
        let codec = UserDataCodec::default();
        let record = ClientRecord::from_client(&Client::new("a", "", ""), &codec).unwrap();
        let bytes = record.to_bytes().unwrap();
        // map(4) { 0: "a", 1: "", 2: "", 3: map(2) { 0: 0, 2: h'' } }
        assert_eq!(hex::encode(bytes), "a40061610160026003a200000240");
    }

    #[test]
    fn test_unknown_tag_decodes_as_nil() {
        let bytes = encode_map(vec![
            entry(keys::client::ID, text("1")),
            entry(
                keys::client::USER_DATA,
                Value::Map(vec![
                    entry(keys::envelope::TAG, Value::Integer(99.into())),
                    entry(keys::envelope::DATA, Value::Bytes(vec![1, 2, 3])),
                ]),
            ),
        ])
        .unwrap();

        let record = ClientRecord::from_bytes(&bytes).unwrap();
        assert_eq!(record.user_data, Envelope::nil());
    }

    #[test]
    fn test_malformed_records() {
        assert!(matches!(
            ClientRecord::from_bytes(&[0xff]),
            Err(CoreError::Decoding(_))
        ));

        let not_a_map = {
            let mut buf = Vec::new();
            ciborium::into_writer(&Value::Text("x".into()), &mut buf).unwrap();
            buf
        };
        assert!(matches!(
            AccessRecord::from_bytes(&not_a_map),
            Err(CoreError::MalformedRecord(_))
        ));

        let wrong_type = encode_map(vec![
            entry(keys::access::ACCESS_TOKEN, text("t")),
            entry(keys::access::EXPIRES_IN, text("soon")),
        ])
        .unwrap();
        assert!(matches!(
            AccessRecord::from_bytes(&wrong_type),
            Err(CoreError::MalformedRecord(_))
        ));

        let missing_code = encode_map(vec![entry(keys::authorize::SCOPE, text("s"))]).unwrap();
        assert!(matches!(
            AuthorizeRecord::from_bytes(&missing_code),
            Err(CoreError::MalformedRecord(_))
        ));
    }
}
