//! The grant store: typed persistence for clients and grants.
//!
//! Every public operation runs in exactly one provider transaction. Writes
//! are all or nothing. Reads resolve the references of a record (client,
//! authorization code, previous access token) inside the same read
//! transaction, so a loaded object graph is a consistent snapshot.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use grantstore_core::{
    AccessData, AccessRecord, AuthorizeData, AuthorizeRecord, Client, ClientRecord, CoreError,
    MessageRegistry, UserDataCodec,
};
use grantstore_kv::{KvStore, ReadTx, SqliteKv, StoreError, WriteTx};

use crate::config::GrantStoreConfig;
use crate::error::{GrantError, Result};
use crate::schema::{ACCESS, ALL_BUCKETS, AUTHORIZE, CLIENT, REFRESH};

/// How a write treats an existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// The key must be absent.
    Insert,
    /// The key must be present.
    Update,
}

/// Persistent store for OAuth2 clients, authorization codes, access tokens
/// and refresh tokens.
///
/// Cloning is cheap: clones share the provider.
///
/// # Design Notes
///
/// - **Flattened references**: an access token is stored with the keys of its
///   client, authorization code and previous token, and those are looked up
///   again on load. Removing a record never touches the records that point
///   at it.
/// - **Hard and soft references**: a missing client fails the load. A missing
///   authorization code or previous access token leaves the reference empty.
pub struct GrantStore<K: KvStore = SqliteKv> {
    kv: Arc<K>,
    codec: UserDataCodec,
    config: GrantStoreConfig,
}

impl<K: KvStore> Clone for GrantStore<K> {
    fn clone(&self) -> Self {
        Self {
            kv: Arc::clone(&self.kv),
            codec: self.codec.clone(),
            config: self.config.clone(),
        }
    }
}

impl GrantStore<SqliteKv> {
    /// Open (or create) a database file with the default configuration.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, GrantStoreConfig::default())
    }

    /// Open (or create) a database file.
    ///
    /// Missing parent directories and the database file are created,
    /// accessible by the owner only.
    pub fn open_with_config(path: impl AsRef<Path>, config: GrantStoreConfig) -> Result<Self> {
        let path = path.as_ref();
        create_parent_dirs(path)?;
        let kv = SqliteKv::open_with_timeout(path, config.busy_timeout())?;
        Self::with_provider(kv, config)
    }

    /// Open a private in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        Self::with_provider(SqliteKv::open_memory()?, GrantStoreConfig::default())
    }
}

impl<K: KvStore> GrantStore<K> {
    /// Wrap an already opened provider and make sure all buckets exist.
    pub fn with_provider(kv: K, config: GrantStoreConfig) -> Result<Self> {
        let store = Self {
            kv: Arc::new(kv),
            codec: UserDataCodec::default(),
            config,
        };
        store.init()?;
        Ok(store)
    }

    /// Decode structured user data with the messages in `registry`.
    ///
    /// Without a registry every stored message loads as nil.
    pub fn with_messages(mut self, registry: MessageRegistry) -> Self {
        self.codec = UserDataCodec::new(registry);
        self
    }

    /// The configuration this store was opened with.
    pub fn config(&self) -> &GrantStoreConfig {
        &self.config
    }

    /// The underlying provider, for raw bucket access.
    pub fn provider(&self) -> &K {
        &self.kv
    }

    /// Create any missing buckets. Safe to call repeatedly.
    pub fn init(&self) -> Result<()> {
        self.kv.update(|tx| {
            for bucket in ALL_BUCKETS {
                tx.create_bucket_if_not_exists(bucket)?;
            }
            Ok::<_, GrantError>(())
        })?;
        tracing::debug!("grant store buckets ready");
        Ok(())
    }

    /// Release this handle. The provider closes with the last handle.
    pub fn close(self) -> Result<()> {
        match Arc::try_unwrap(self.kv) {
            Ok(kv) => {
                kv.close()?;
                tracing::debug!("grant store closed");
            }
            Err(_) => tracing::debug!("grant store handle released, provider still shared"),
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Clients
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a new client. Fails with `AlreadyExists` if the id is taken.
    pub fn create_client(&self, client: &Client) -> Result<()> {
        self.write_client(client, WriteMode::Insert)
    }

    /// Replace an existing client. Fails with `NotFound` if the id is unknown.
    pub fn update_client(&self, client: &Client) -> Result<()> {
        self.write_client(client, WriteMode::Update)
    }

    pub fn get_client(&self, id: &str) -> Result<Client> {
        self.kv.view(|tx| self.read_client(tx, id))
    }

    pub fn remove_client(&self, id: &str) -> Result<()> {
        self.remove(CLIENT, id)
    }

    fn write_client(&self, client: &Client, mode: WriteMode) -> Result<()> {
        let value = ClientRecord::from_client(client, &self.codec)?.to_bytes()?;
        self.kv
            .update(|tx| put_record(tx, CLIENT, &client.id, &value, mode))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authorization codes
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a new authorization code. Its client is stored by id only.
    pub fn save_authorize(&self, authorize: &AuthorizeData) -> Result<()> {
        let value = AuthorizeRecord::from_authorize(authorize, &self.codec)?.to_bytes()?;
        self.kv.update(|tx| {
            put_record(tx, AUTHORIZE, &authorize.code, &value, WriteMode::Insert)
        })
    }

    /// Load an authorization code together with its client.
    pub fn load_authorize(&self, code: &str) -> Result<AuthorizeData> {
        let authorize = self.kv.view(|tx| self.read_authorize(tx, code))?;
        if self.config.reject_expired && authorize.is_expired_at(Utc::now()) {
            return Err(GrantError::Expired {
                bucket: AUTHORIZE,
                key: code.to_string(),
            });
        }
        Ok(authorize)
    }

    pub fn remove_authorize(&self, code: &str) -> Result<()> {
        self.remove(AUTHORIZE, code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Access and refresh tokens
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a new access token, and its refresh token if it has one.
    ///
    /// Both inserts happen in one transaction: if the refresh token is
    /// already taken the access token is not stored either.
    pub fn save_access(&self, access: &AccessData) -> Result<()> {
        let value = AccessRecord::from_access(access, &self.codec)?.to_bytes()?;
        self.kv.update(|tx| {
            put_record(tx, ACCESS, &access.access_token, &value, WriteMode::Insert)?;
            if !access.refresh_token.is_empty() {
                put_record(
                    tx,
                    REFRESH,
                    &access.refresh_token,
                    access.access_token.as_bytes(),
                    WriteMode::Insert,
                )?;
            }
            Ok(())
        })
    }

    /// Load an access token with its client, authorization code and chain of
    /// previous access tokens.
    pub fn load_access(&self, token: &str) -> Result<AccessData> {
        let access = self.kv.view(|tx| self.read_access(tx, token))?;
        if self.config.reject_expired && access.is_expired_at(Utc::now()) {
            return Err(GrantError::Expired {
                bucket: ACCESS,
                key: token.to_string(),
            });
        }
        Ok(access)
    }

    pub fn remove_access(&self, token: &str) -> Result<()> {
        self.remove(ACCESS, token)
    }

    /// Load the access token a refresh token was issued with.
    ///
    /// The access token's own expiry is never checked here: refreshing is
    /// how an expired access token gets replaced.
    pub fn load_refresh(&self, token: &str) -> Result<AccessData> {
        self.kv.view(|tx| {
            let access_token = get_record(tx, REFRESH, token)?;
            let access_token = String::from_utf8(access_token).map_err(|_| {
                CoreError::MalformedRecord(format!("refresh index for {} is not UTF-8", token))
            })?;
            self.read_access(tx, &access_token)
        })
    }

    pub fn remove_refresh(&self, token: &str) -> Result<()> {
        self.remove(REFRESH, token)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transaction helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn remove(&self, bucket: &'static str, key: &str) -> Result<()> {
        self.kv.update(|tx| {
            tx.delete(bucket, key.as_bytes())?;
            Ok(())
        })
    }

    fn read_client<T: ReadTx + ?Sized>(&self, tx: &T, id: &str) -> Result<Client> {
        let record = ClientRecord::from_bytes(&get_record(tx, CLIENT, id)?)?;
        Ok(record.into_client(&self.codec)?)
    }

    fn read_authorize<T: ReadTx + ?Sized>(&self, tx: &T, code: &str) -> Result<AuthorizeData> {
        let record = AuthorizeRecord::from_bytes(&get_record(tx, AUTHORIZE, code)?)?;
        let client = self.read_client(tx, &record.client_id)?;
        Ok(record.into_authorize(client, &self.codec)?)
    }

    /// Load one access record with its client and authorization code, but not
    /// its previous token. Returns the previous token's key alongside.
    fn read_access_node<T: ReadTx + ?Sized>(
        &self,
        tx: &T,
        token: &str,
    ) -> Result<(AccessData, String)> {
        let mut record = AccessRecord::from_bytes(&get_record(tx, ACCESS, token)?)?;
        let client = self.read_client(tx, &record.client_id)?;

        let authorize = if record.authorize_code.is_empty() {
            None
        } else {
            let code = std::mem::take(&mut record.authorize_code);
            let result = self.read_authorize(tx, &code);
            self.optional_reference(AUTHORIZE, &code, result)?
        };

        let prev = std::mem::take(&mut record.prev_access_token);
        let access = record.into_access(client, authorize.map(Box::new), None, &self.codec)?;
        Ok((access, prev))
    }

    /// Load an access token and walk its chain of previous tokens.
    ///
    /// The walk stops at an empty link, a missing or unreadable previous
    /// token (see [`Self::optional_reference`]), a token seen before, or after
    /// `max_access_chain_depth` previous tokens.
    fn read_access<T: ReadTx + ?Sized>(&self, tx: &T, token: &str) -> Result<AccessData> {
        let (root, mut next) = self.read_access_node(tx, token)?;

        let mut visited = HashSet::from([token.to_string()]);
        let mut chain = vec![root];

        while !next.is_empty() {
            if !visited.insert(next.clone()) {
                tracing::warn!(
                    token,
                    repeated = %next,
                    "access token chain has a cycle, cutting it"
                );
                break;
            }
            if chain.len() > self.config.max_access_chain_depth {
                tracing::warn!(
                    token,
                    depth = self.config.max_access_chain_depth,
                    "access token chain exceeds max depth, truncating"
                );
                break;
            }

            let result = self.read_access_node(tx, &next);
            match self.optional_reference(ACCESS, &next, result)? {
                Some((node, prev)) => {
                    chain.push(node);
                    next = prev;
                }
                None => break,
            }
        }

        // Link the chain from the oldest token forward.
        let mut previous: Option<Box<AccessData>> = None;
        while let Some(mut node) = chain.pop() {
            node.access_data = previous;
            previous = Some(Box::new(node));
        }
        previous
            .map(|root| *root)
            .ok_or_else(|| GrantError::not_found(ACCESS, token))
    }

    /// Turn the failure to resolve an optional reference into `None`.
    ///
    /// Missing entries are always absorbed. Other failures are absorbed only
    /// with `lenient_references`.
    fn optional_reference<V>(
        &self,
        bucket: &'static str,
        key: &str,
        result: Result<V>,
    ) -> Result<Option<V>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => {
                tracing::debug!(bucket, key, error = %err, "optional reference not found");
                Ok(None)
            }
            Err(err) if self.config.lenient_references => {
                tracing::warn!(bucket, key, error = %err, "ignoring unreadable optional reference");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

fn get_record<T: ReadTx + ?Sized>(tx: &T, bucket: &'static str, key: &str) -> Result<Vec<u8>> {
    tx.get(bucket, key.as_bytes())?
        .ok_or_else(|| GrantError::not_found(bucket, key))
}

fn put_record<T: WriteTx + ?Sized>(
    tx: &mut T,
    bucket: &'static str,
    key: &str,
    value: &[u8],
    mode: WriteMode,
) -> Result<()> {
    let exists = tx.get(bucket, key.as_bytes())?.is_some();
    match (mode, exists) {
        (WriteMode::Insert, true) => Err(GrantError::AlreadyExists {
            bucket,
            key: key.to_string(),
        }),
        (WriteMode::Update, false) => Err(GrantError::not_found(bucket, key)),
        _ => {
            tx.put(bucket, key.as_bytes(), value)?;
            Ok(())
        }
    }
}

fn create_parent_dirs(path: &Path) -> Result<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    if parent.is_dir() {
        return Ok(());
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(parent).map_err(StoreError::from)?;
    tracing::debug!(dir = %parent.display(), "created database directory");
    Ok(())
}
