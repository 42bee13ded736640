//! Test fixtures and helpers.
//!
//! Common setup code for grant store tests.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use grantstore_core::{
    AccessData, AuthorizeData, CborMessage, Client, MessageRegistry, UserData, UserDataCodec,
};

/// Redirect URI used by every fixture.
pub const REDIRECT_URI: &str = "http://localhost/";

/// A structured message for user data tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSession {
    pub user_id: u64,
    pub remember: bool,
}

impl CborMessage for SampleSession {
    const TYPE_NAME: &'static str = "grantstore.test.Session";
}

/// A registry that knows [`SampleSession`].
pub fn sample_registry() -> MessageRegistry {
    MessageRegistry::new().with::<SampleSession>()
}

/// A codec built on [`sample_registry`].
pub fn sample_codec() -> UserDataCodec {
    UserDataCodec::new(sample_registry())
}

/// A random 128-bit token, hex encoded.
pub fn random_token() -> String {
    token_from(&mut rand::thread_rng())
}

fn token_from<R: Rng>(rng: &mut R) -> String {
    let bytes: [u8; 16] = rng.gen();
    hex::encode(bytes)
}

/// A client plus a token source for building grants that belong to it.
pub struct GrantFixture {
    pub client: Client,
    /// Creation time stamped on every grant.
    pub now: DateTime<Utc>,
    rng: StdRng,
}

impl GrantFixture {
    /// Create a fixture with random tokens.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Create with deterministic tokens from seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(mut rng: StdRng) -> Self {
        let client = Client::new(token_from(&mut rng), token_from(&mut rng), REDIRECT_URI)
            .with_user_data("bar");
        Self {
            client,
            now: Utc::now(),
            rng,
        }
    }

    /// Next token from this fixture's source.
    pub fn token(&mut self) -> String {
        token_from(&mut self.rng)
    }

    /// A fresh authorization code for the fixture client.
    pub fn authorize(&mut self) -> AuthorizeData {
        AuthorizeData {
            client: self.client.clone(),
            code: self.token(),
            expires_in: 600,
            scope: "read write".into(),
            redirect_uri: REDIRECT_URI.into(),
            state: "state".into(),
            created_at: self.now,
            user_data: UserData::message(SampleSession {
                user_id: 7,
                remember: true,
            }),
            code_challenge: String::new(),
            code_challenge_method: String::new(),
        }
    }

    /// An authorization code that expired an hour ago.
    pub fn expired_authorize(&mut self) -> AuthorizeData {
        let mut authorize = self.authorize();
        authorize.created_at = self.now - Duration::hours(2);
        authorize.expires_in = 3600;
        authorize
    }

    /// An access token with a refresh token and no parent grant.
    pub fn access(&mut self) -> AccessData {
        AccessData {
            client: self.client.clone(),
            authorize_data: None,
            access_data: None,
            access_token: self.token(),
            refresh_token: self.token(),
            expires_in: 3600,
            scope: "read write".into(),
            redirect_uri: REDIRECT_URI.into(),
            created_at: self.now,
            user_data: UserData::Uint(42),
        }
    }

    /// An access token exchanged from `authorize`.
    pub fn access_from(&mut self, authorize: &AuthorizeData) -> AccessData {
        let mut access = self.access();
        access.authorize_data = Some(Box::new(authorize.clone()));
        access.scope = authorize.scope.clone();
        access
    }

    /// An access token refreshed from `previous`.
    pub fn refreshed(&mut self, previous: &AccessData) -> AccessData {
        let mut access = self.access();
        access.access_data = Some(Box::new(previous.clone()));
        access.scope = previous.scope.clone();
        access
    }

    /// A chain of `len` access tokens, each refreshed from the one before.
    /// The newest token comes last.
    pub fn chain(&mut self, len: usize) -> Vec<AccessData> {
        let mut chain: Vec<AccessData> = Vec::with_capacity(len);
        for _ in 0..len {
            let next = match chain.last() {
                Some(previous) => {
                    let previous = previous.clone();
                    self.refreshed(&previous)
                }
                None => self.access(),
            };
            chain.push(next);
        }
        chain
    }
}

impl Default for GrantFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_fixtures_are_deterministic() {
        let mut a = GrantFixture::with_seed(1);
        let mut b = GrantFixture::with_seed(1);
        assert_eq!(a.client.id, b.client.id);
        assert_eq!(a.token(), b.token());

        let mut c = GrantFixture::with_seed(2);
        assert_ne!(a.client.id, c.client.id);
        assert_ne!(a.token(), c.token());
    }

    #[test]
    fn test_random_tokens() {
        let token = random_token();
        assert_eq!(token.len(), 32);
        assert_ne!(token, random_token());
    }

    #[test]
    fn test_grants_belong_to_client() {
        let mut fixture = GrantFixture::new();
        let authorize = fixture.authorize();
        let access = fixture.access_from(&authorize);

        assert_eq!(authorize.client, fixture.client);
        assert_eq!(access.client, fixture.client);
        assert_eq!(access.authorize_data.as_deref(), Some(&authorize));
        assert!(!access.refresh_token.is_empty());
    }

    #[test]
    fn test_chain_links_backwards() {
        let mut fixture = GrantFixture::with_seed(3);
        let chain = fixture.chain(3);
        let newest = chain.last().unwrap();

        let previous: Vec<&str> = newest.previous().map(|a| a.access_token.as_str()).collect();
        assert_eq!(
            previous,
            vec![chain[1].access_token.as_str(), chain[0].access_token.as_str()]
        );
    }

    #[test]
    fn test_expired_authorize() {
        let mut fixture = GrantFixture::new();
        assert!(fixture.expired_authorize().is_expired_at(fixture.now));
        assert!(!fixture.authorize().is_expired_at(fixture.now));
    }

    #[test]
    fn test_sample_codec_knows_session() {
        assert!(sample_registry().contains(SampleSession::TYPE_NAME));
        let codec = sample_codec();
        let value = UserData::message(SampleSession {
            user_id: 1,
            remember: false,
        });
        let decoded = codec.decode(codec.encode(&value).unwrap()).unwrap();
        assert_eq!(decoded, value);
    }
}
