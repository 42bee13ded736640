//! SQLite implementation of the provider traits.
//!
//! Buckets are rows in `buckets`, entries are rows in `entries`. A file
//! database has one writer connection behind a mutex and a pool of reader
//! connections on the same WAL file, so reads see a snapshot and never wait
//! for the writer. Reads run in a deferred transaction that is always rolled
//! back. Writes take the write lock up front (`BEGIN IMMEDIATE`).
//!
//! An in-memory database cannot be shared between connections, so there
//! every transaction runs on the writer connection.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{KvStore, ReadTx, WriteTx};

/// Busy timeout used by [`SqliteKv::open`].
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Idle reader connections kept open for reuse.
const MAX_IDLE_READERS: usize = 4;

/// SQLite-backed provider.
///
/// Cloning shares the underlying connections.
#[derive(Clone)]
pub struct SqliteKv {
    writer: Arc<Mutex<Connection>>,
    readers: Option<Arc<ReaderPool>>,
}

impl SqliteKv {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open a SQLite database, waiting up to `busy_timeout` for locks held by
    /// other processes.
    ///
    /// A new database file is created readable and writable by the owner
    /// only. SQLite gives its `-wal` and `-shm` files the same mode.
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        if !is_plain_file(path) {
            let mut conn = Connection::open(path)?;
            conn.busy_timeout(busy_timeout)?;
            migration::migrate(&mut conn)?;
            return Ok(Self::single(conn));
        }

        create_private_file(path)?;
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        migration::migrate(&mut conn)?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened sqlite provider");

        Ok(Self {
            writer: Arc::new(Mutex::new(conn)),
            readers: Some(Arc::new(ReaderPool {
                path: path.to_path_buf(),
                busy_timeout,
                idle: Mutex::new(Vec::new()),
            })),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self::single(conn))
    }

    fn single(conn: Connection) -> Self {
        Self {
            writer: Arc::new(Mutex::new(conn)),
            readers: None,
        }
    }

    fn with_writer<T, E, F>(
        &self,
        behavior: TransactionBehavior,
        commit: bool,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut SqliteTx<'_>) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.writer.lock().map_err(StoreError::poisoned)?;
        run_tx(&mut conn, behavior, commit, f)
    }
}

impl KvStore for SqliteKv {
    fn view<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&dyn ReadTx) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let Some(readers) = &self.readers else {
            return self.with_writer(TransactionBehavior::Deferred, false, |tx| f(&*tx));
        };

        let mut conn = readers.checkout()?;
        let out = run_tx(&mut conn, TransactionBehavior::Deferred, false, |tx| f(&*tx));
        readers.checkin(conn);
        out
    }

    fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn WriteTx) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        self.with_writer(TransactionBehavior::Immediate, true, |tx| f(tx))
    }

    fn close(self) -> Result<()> {
        let Self { writer, readers } = self;
        // Readers close first so the writer is the last connection and
        // checkpoints the WAL.
        drop(readers);

        // Other clones keep the connection alive; it closes with the last one.
        let Ok(mutex) = Arc::try_unwrap(writer) else {
            return Ok(());
        };
        let conn = mutex.into_inner().map_err(StoreError::poisoned)?;
        conn.close().map_err(|(_, e)| StoreError::Database(e))?;
        tracing::debug!("closed sqlite provider");
        Ok(())
    }
}

/// Reader connections on a database file, opened on demand.
struct ReaderPool {
    path: PathBuf,
    busy_timeout: Duration,
    idle: Mutex<Vec<Connection>>,
}

impl ReaderPool {
    fn checkout(&self) -> Result<Connection> {
        let idle = self.idle.lock().map_err(StoreError::poisoned)?.pop();
        match idle {
            Some(conn) => Ok(conn),
            None => self.connect(),
        }
    }

    fn connect(&self) -> Result<Connection> {
        // Read-write so the connection can update the shared WAL index.
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(self.busy_timeout)?;
        tracing::trace!(path = %self.path.display(), "opened sqlite reader");
        Ok(conn)
    }

    /// Return a connection to the pool, or drop it if the pool is full or the
    /// connection is still inside a transaction.
    fn checkin(&self, conn: Connection) {
        if !conn.is_autocommit() {
            return;
        }
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < MAX_IDLE_READERS {
                idle.push(conn);
            }
        }
    }
}

/// Run `f` inside a transaction with the given locking behavior.
///
/// The transaction is committed only if `commit` is set and `f` succeeds.
fn run_tx<T, E, F>(
    conn: &mut Connection,
    behavior: TransactionBehavior,
    commit: bool,
    f: F,
) -> std::result::Result<T, E>
where
    F: FnOnce(&mut SqliteTx<'_>) -> std::result::Result<T, E>,
    E: From<StoreError>,
{
    let tx = conn
        .transaction_with_behavior(behavior)
        .map_err(StoreError::from)?;

    let out = f(&mut SqliteTx { conn: &tx })?;

    if commit {
        tx.commit().map_err(StoreError::from)?;
    } else {
        tx.rollback().map_err(StoreError::from)?;
    }
    Ok(out)
}

/// Whether `path` names an ordinary file rather than an in-memory database
/// or a URI.
fn is_plain_file(path: &Path) -> bool {
    match path.to_str() {
        Some(p) => !p.is_empty() && p != ":memory:" && !p.starts_with("file:"),
        None => !path.as_os_str().is_empty(),
    }
}

#[cfg(unix)]
fn create_private_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_private_file(_path: &Path) -> Result<()> {
    Ok(())
}

/// A transaction on the shared connection.
///
/// The rusqlite transaction is owned by [`run_tx`], which decides whether it
/// commits.
struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl SqliteTx<'_> {
    fn require_bucket(&self, bucket: &str) -> Result<()> {
        if self.bucket_exists(bucket)? {
            Ok(())
        } else {
            Err(StoreError::BucketNotFound(bucket.to_string()))
        }
    }
}

impl ReadTx for SqliteTx<'_> {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.require_bucket(bucket)?;
        let value = self
            .conn
            .prepare_cached("SELECT value FROM entries WHERE bucket = ?1 AND key = ?2")?
            .query_row(params![bucket, key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let found = self
            .conn
            .prepare_cached("SELECT 1 FROM buckets WHERE name = ?1")?
            .query_row(params![bucket], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }
}

impl WriteTx for SqliteTx<'_> {
    fn create_bucket_if_not_exists(&mut self, bucket: &str) -> Result<()> {
        let created = self.conn.execute(
            "INSERT OR IGNORE INTO buckets (name, created_at) VALUES (?1, ?2)",
            params![bucket, migration::now_millis()],
        )?;
        if created > 0 {
            tracing::debug!(bucket, "created bucket");
        }
        Ok(())
    }

    fn put(&mut self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        self.require_bucket(bucket)?;
        self.conn
            .prepare_cached(
                "INSERT INTO entries (bucket, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (bucket, key) DO UPDATE SET value = excluded.value",
            )?
            .execute(params![bucket, key, value])?;
        Ok(())
    }

    fn delete(&mut self, bucket: &str, key: &[u8]) -> Result<()> {
        self.require_bucket(bucket)?;
        self.conn
            .prepare_cached("DELETE FROM entries WHERE bucket = ?1 AND key = ?2")?
            .execute(params![bucket, key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    fn kv_with_bucket() -> SqliteKv {
        let kv = SqliteKv::open_memory().unwrap();
        kv.update(|tx| tx.create_bucket_if_not_exists("b")).unwrap();
        kv
    }

    #[test]
    fn test_put_get_delete() {
        let kv = kv_with_bucket();

        kv.update(|tx| tx.put("b", b"k", b"v1")).unwrap();
        kv.update(|tx| tx.put("b", b"k", b"v2")).unwrap();
        assert_eq!(kv.view(|tx| tx.get("b", b"k")).unwrap(), Some(b"v2".to_vec()));

        kv.update(|tx| tx.delete("b", b"k")).unwrap();
        kv.update(|tx| tx.delete("b", b"k")).unwrap();
        assert_eq!(kv.view(|tx| tx.get("b", b"k")).unwrap(), None);
    }

    #[test]
    fn test_missing_bucket() {
        let kv = SqliteKv::open_memory().unwrap();
        let err = kv.view(|tx| tx.get("nope", b"k")).unwrap_err();
        assert!(matches!(err, StoreError::BucketNotFound(b) if b == "nope"));

        let err = kv.update(|tx| tx.put("nope", b"k", b"v")).unwrap_err();
        assert!(matches!(err, StoreError::BucketNotFound(_)));
    }

    #[test]
    fn test_bucket_creation_is_idempotent() {
        let kv = kv_with_bucket();
        kv.update(|tx| tx.put("b", b"k", b"v")).unwrap();
        kv.update(|tx| tx.create_bucket_if_not_exists("b")).unwrap();

        assert!(kv.view(|tx| tx.bucket_exists("b")).unwrap());
        assert_eq!(kv.view(|tx| tx.get("b", b"k")).unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_failed_update_rolls_back() {
        let kv = kv_with_bucket();

        let result: Result<()> = kv.update(|tx| {
            tx.put("b", b"k1", b"v")?;
            tx.put("missing", b"k2", b"v")
        });
        assert!(result.is_err());
        assert_eq!(kv.view(|tx| tx.get("b", b"k1")).unwrap(), None);
    }

    #[test]
    fn test_update_sees_its_own_writes() {
        let kv = kv_with_bucket();
        let seen = kv
            .update(|tx| {
                tx.put("b", b"k", b"v")?;
                tx.get("b", b"k")
            })
            .unwrap();
        assert_eq!(seen, Some(b"v".to_vec()));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grants.db");

        let kv = SqliteKv::open(&path).unwrap();
        kv.update(|tx| {
            tx.create_bucket_if_not_exists("b")?;
            tx.put("b", b"k", b"v")
        })
        .unwrap();
        kv.close().unwrap();

        let kv = SqliteKv::open(&path).unwrap();
        assert_eq!(kv.view(|tx| tx.get("b", b"k")).unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_close_with_live_clone() {
        let kv = kv_with_bucket();
        let other = kv.clone();
        kv.close().unwrap();
        assert!(other.view(|tx| tx.bucket_exists("b")).unwrap());
    }

    fn file_kv_with_bucket(dir: &tempfile::TempDir) -> SqliteKv {
        let kv = SqliteKv::open(dir.path().join("grants.db")).unwrap();
        kv.update(|tx| {
            tx.create_bucket_if_not_exists("b")?;
            tx.put("b", b"k", b"v1")
        })
        .unwrap();
        kv
    }

    #[test]
    fn test_view_runs_while_update_is_open() {
        let dir = tempfile::tempdir().unwrap();
        let kv = file_kv_with_bucket(&dir);

        let (sent, received) = mpsc::channel();
        let reader = kv.clone();
        let seen = kv
            .update(|tx| {
                tx.put("b", b"k", b"v2")?;
                thread::spawn(move || {
                    let _ = sent.send(reader.view(|tx| tx.get("b", b"k")));
                });
                let seen = received
                    .recv_timeout(Duration::from_secs(5))
                    .expect("view waited for the open update");
                Ok::<_, StoreError>(seen)
            })
            .unwrap();

        // The reader saw the snapshot from before the update.
        assert_eq!(seen.unwrap(), Some(b"v1".to_vec()));
        assert_eq!(kv.view(|tx| tx.get("b", b"k")).unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn test_nested_views() {
        let dir = tempfile::tempdir().unwrap();
        let kv = file_kv_with_bucket(&dir);

        let inner = kv
            .view(|outer| {
                assert_eq!(outer.get("b", b"k")?, Some(b"v1".to_vec()));
                kv.view(|tx| tx.get("b", b"k"))
            })
            .unwrap();
        assert_eq!(inner, Some(b"v1".to_vec()));
    }

    #[cfg(unix)]
    #[test]
    fn test_new_database_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let _kv = file_kv_with_bucket(&dir);

        let mode = std::fs::metadata(dir.path().join("grants.db"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn test_plain_file_paths() {
        assert!(is_plain_file(Path::new("grants.db")));
        assert!(!is_plain_file(Path::new(":memory:")));
        assert!(!is_plain_file(Path::new("file:grants.db?mode=memory")));
        assert!(!is_plain_file(Path::new("")));
    }
}
