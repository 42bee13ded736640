//! Grant store configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the grant store.
///
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GrantStoreConfig {
    /// How many previous access tokens to resolve when loading an access
    /// token. Longer chains are cut off.
    pub max_access_chain_depth: usize,
    /// Absorb every failure while resolving optional references, not just
    /// missing entries.
    pub lenient_references: bool,
    /// Fail loads of expired authorization codes and access tokens.
    pub reject_expired: bool,
    /// How long SQLite waits on a locked database.
    pub busy_timeout_ms: u64,
}

impl Default for GrantStoreConfig {
    fn default() -> Self {
        Self {
            max_access_chain_depth: 32,
            lenient_references: false,
            reject_expired: false,
            busy_timeout_ms: 5000,
        }
    }
}

impl GrantStoreConfig {
    /// Parse a JSON configuration object.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
