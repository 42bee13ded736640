//! The grant object graph as seen by callers.
//!
//! These types hold full references (an access token owns a copy of its
//! client, authorization and previous token). The stored forms in
//! [`crate::record`] flatten those references down to keys.

use chrono::{DateTime, Duration, Utc};

use crate::userdata::UserData;

/// A registered OAuth2 client.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Client {
    pub id: String,
    pub secret: String,
    pub redirect_uri: String,
    pub user_data: UserData,
}

impl Client {
    pub fn new(
        id: impl Into<String>,
        secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            redirect_uri: redirect_uri.into(),
            user_data: UserData::Nil,
        }
    }

    pub fn with_user_data(mut self, user_data: impl Into<UserData>) -> Self {
        self.user_data = user_data.into();
        self
    }

    /// Compare `secret` against the stored secret without short-circuiting
    /// on the first differing byte.
    pub fn secret_matches(&self, secret: &str) -> bool {
        let (a, b) = (self.secret.as_bytes(), secret.as_bytes());
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

/// An issued authorization code.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizeData {
    pub client: Client,
    pub code: String,
    /// Lifetime in seconds, counted from `created_at`.
    pub expires_in: i32,
    pub scope: String,
    pub redirect_uri: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub user_data: UserData,
    /// PKCE challenge (RFC 7636).
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl AuthorizeData {
    /// `created_at + expires_in`, or `None` if that falls outside the
    /// representable range.
    pub fn expire_at(&self) -> Option<DateTime<Utc>> {
        expire_at(self.created_at, self.expires_in)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        is_expired_at(self.created_at, self.expires_in, now)
    }
}

/// An issued access token, optionally chained to the grant it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessData {
    pub client: Client,
    /// Authorization code this token was exchanged from.
    pub authorize_data: Option<Box<AuthorizeData>>,
    /// Access token this one was refreshed from.
    pub access_data: Option<Box<AccessData>>,
    pub access_token: String,
    /// Empty when no refresh token was issued.
    pub refresh_token: String,
    /// Lifetime in seconds, counted from `created_at`.
    pub expires_in: i32,
    pub scope: String,
    pub redirect_uri: String,
    pub created_at: DateTime<Utc>,
    pub user_data: UserData,
}

impl AccessData {
    pub fn expire_at(&self) -> Option<DateTime<Utc>> {
        expire_at(self.created_at, self.expires_in)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        is_expired_at(self.created_at, self.expires_in, now)
    }

    /// Walk the chain of previous access tokens, nearest first.
    pub fn previous(&self) -> impl Iterator<Item = &AccessData> {
        std::iter::successors(self.access_data.as_deref(), |a| a.access_data.as_deref())
    }
}

fn expire_at(created_at: DateTime<Utc>, expires_in: i32) -> Option<DateTime<Utc>> {
    created_at.checked_add_signed(Duration::seconds(i64::from(expires_in)))
}

/// An expiry past the end of time never arrives; one before its start
/// already has.
fn is_expired_at(created_at: DateTime<Utc>, expires_in: i32, now: DateTime<Utc>) -> bool {
    match expire_at(created_at, expires_in) {
        Some(at) => at < now,
        None => expires_in < 0,
    }
}
