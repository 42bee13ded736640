//! Proptest generators for property-based testing.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use proptest::prelude::*;

use grantstore_core::{AccessData, AuthorizeData, Client, UserData};

use crate::fixtures::SampleSession;

/// Generate any user data value, including structured messages.
///
/// Floats are drawn from raw bit patterns so NaN payloads and signed zero
/// show up.
pub fn user_data() -> impl Strategy<Value = UserData> {
    prop_oneof![
        Just(UserData::Nil),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(|b| UserData::Bytes(Bytes::from(b))),
        any::<String>().prop_map(UserData::Text),
        any::<i64>().prop_map(UserData::Int),
        any::<u64>().prop_map(UserData::Uint),
        any::<bool>().prop_map(UserData::Bool),
        any::<u64>().prop_map(|bits| UserData::Float(f64::from_bits(bits))),
        (any::<u64>(), any::<bool>()).prop_map(|(user_id, remember)| {
            UserData::message(SampleSession { user_id, remember })
        }),
    ]
}

/// Generate a token or identifier.
pub fn token() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,32}".prop_map(String::from)
}

/// Generate a creation time with nanosecond precision.
pub fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..=4_102_444_800i64, 0u32..1_000_000_000u32)
        .prop_map(|(secs, nanos)| DateTime::from_timestamp(secs, nanos).unwrap_or_default())
}

/// Generate a client.
pub fn client() -> impl Strategy<Value = Client> {
    (token(), any::<String>(), any::<String>(), user_data()).prop_map(
        |(id, secret, redirect_uri, user_data)| Client {
            id,
            secret,
            redirect_uri,
            user_data,
        },
    )
}

/// Generate an authorization code.
pub fn authorize_data() -> impl Strategy<Value = AuthorizeData> {
    (
        client(),
        token(),
        any::<i32>(),
        any::<String>(),
        timestamp(),
        user_data(),
        prop_oneof![Just(""), Just("plain"), Just("S256")],
    )
        .prop_map(
            |(client, code, expires_in, scope, created_at, user_data, method)| AuthorizeData {
                redirect_uri: client.redirect_uri.clone(),
                client,
                code,
                expires_in,
                scope,
                state: "state".into(),
                created_at,
                user_data,
                code_challenge: if method.is_empty() {
                    String::new()
                } else {
                    "challenge".into()
                },
                code_challenge_method: method.into(),
            },
        )
}

/// Parameters for generating an access token.
#[derive(Debug, Clone)]
pub struct AccessParams {
    pub client: Client,
    pub access_token: String,
    /// Empty means no refresh token.
    pub refresh_token: String,
    pub expires_in: i32,
    pub scope: String,
    pub created_at: DateTime<Utc>,
    pub user_data: UserData,
    pub authorize_data: Option<AuthorizeData>,
}

impl Arbitrary for AccessParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            client(),
            token(),
            prop_oneof![Just(String::new()), token()],
            any::<i32>(),
            any::<String>(),
            timestamp(),
            user_data(),
            proptest::option::of(authorize_data()),
        )
            .prop_map(
                |(
                    client,
                    access_token,
                    refresh_token,
                    expires_in,
                    scope,
                    created_at,
                    user_data,
                    authorize_data,
                )| AccessParams {
                    client,
                    access_token,
                    refresh_token,
                    expires_in,
                    scope,
                    created_at,
                    user_data,
                    authorize_data,
                },
            )
            .boxed()
    }
}

/// Build an access token from parameters.
pub fn access_from_params(params: &AccessParams) -> AccessData {
    AccessData {
        client: params.client.clone(),
        authorize_data: params.authorize_data.clone().map(Box::new),
        access_data: None,
        access_token: params.access_token.clone(),
        refresh_token: params.refresh_token.clone(),
        expires_in: params.expires_in,
        scope: params.scope.clone(),
        redirect_uri: params.client.redirect_uri.clone(),
        created_at: params.created_at,
        user_data: params.user_data.clone(),
    }
}
