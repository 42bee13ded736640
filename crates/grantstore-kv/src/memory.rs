//! In-memory implementation of the provider traits.
//!
//! Same semantics as SQLite with no persistence. Write transactions are
//! serialized by a writer mutex and stage their changes in an overlay, so
//! readers keep seeing the last committed state until the overlay is applied.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, RwLock};

use crate::error::{Result, StoreError};
use crate::traits::{KvStore, ReadTx, WriteTx};

type Bucket = BTreeMap<Vec<u8>, Vec<u8>>;
type Buckets = HashMap<String, Bucket>;

/// In-memory provider.
///
/// All data is lost when the provider is dropped.
#[derive(Default)]
pub struct MemoryKv {
    committed: RwLock<Buckets>,
    writer: Mutex<()>,
}

impl MemoryKv {
    /// Create a new empty in-memory provider.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn view<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&dyn ReadTx) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let committed = self.committed.read().map_err(StoreError::poisoned)?;
        f(&Snapshot { buckets: &committed })
    }

    fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn WriteTx) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let _writer = self.writer.lock().map_err(StoreError::poisoned)?;

        let (out, overlay) = {
            let committed = self.committed.read().map_err(StoreError::poisoned)?;
            let mut tx = MemoryWriteTx {
                base: Snapshot {
                    buckets: &committed,
                },
                overlay: Overlay::default(),
            };
            let out = f(&mut tx)?;
            (out, tx.overlay)
        };

        let mut committed = self.committed.write().map_err(StoreError::poisoned)?;
        overlay.apply(&mut committed);
        Ok(out)
    }

    fn close(self) -> Result<()> {
        Ok(())
    }
}

/// Read access to committed state.
struct Snapshot<'a> {
    buckets: &'a Buckets,
}

impl ReadTx for Snapshot<'_> {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.buckets
            .get(bucket)
            .map(|b| b.get(key).cloned())
            .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))
    }

    fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.contains_key(bucket))
    }
}

/// Uncommitted changes of one write transaction.
#[derive(Default)]
struct Overlay {
    created: BTreeSet<String>,
    /// `None` marks a deletion.
    changes: BTreeMap<(String, Vec<u8>), Option<Vec<u8>>>,
}

impl Overlay {
    fn apply(self, buckets: &mut Buckets) {
        for name in self.created {
            buckets.entry(name).or_default();
        }
        for ((bucket, key), value) in self.changes {
            let entries = buckets.entry(bucket).or_default();
            match value {
                Some(value) => {
                    entries.insert(key, value);
                }
                None => {
                    entries.remove(&key);
                }
            }
        }
    }
}

struct MemoryWriteTx<'a> {
    base: Snapshot<'a>,
    overlay: Overlay,
}

impl MemoryWriteTx<'_> {
    fn require_bucket(&self, bucket: &str) -> Result<()> {
        if self.bucket_exists(bucket)? {
            Ok(())
        } else {
            Err(StoreError::BucketNotFound(bucket.to_string()))
        }
    }
}

impl ReadTx for MemoryWriteTx<'_> {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.require_bucket(bucket)?;
        if let Some(staged) = self.overlay.changes.get(&(bucket.to_string(), key.to_vec())) {
            return Ok(staged.clone());
        }
        Ok(self
            .base
            .buckets
            .get(bucket)
            .and_then(|b| b.get(key).cloned()))
    }

    fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.overlay.created.contains(bucket) || self.base.bucket_exists(bucket)?)
    }
}

impl WriteTx for MemoryWriteTx<'_> {
    fn create_bucket_if_not_exists(&mut self, bucket: &str) -> Result<()> {
        if !self.bucket_exists(bucket)? {
            tracing::debug!(bucket, "created bucket");
            self.overlay.created.insert(bucket.to_string());
        }
        Ok(())
    }

    fn put(&mut self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        self.require_bucket(bucket)?;
        self.overlay
            .changes
            .insert((bucket.to_string(), key.to_vec()), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, bucket: &str, key: &[u8]) -> Result<()> {
        self.require_bucket(bucket)?;
        self.overlay
            .changes
            .insert((bucket.to_string(), key.to_vec()), None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn kv_with_bucket() -> MemoryKv {
        let kv = MemoryKv::new();
        kv.update(|tx| tx.create_bucket_if_not_exists("b")).unwrap();
        kv
    }

    #[test]
    fn test_put_get_delete() {
        let kv = kv_with_bucket();

        kv.update(|tx| tx.put("b", b"k", b"v")).unwrap();
        assert_eq!(kv.view(|tx| tx.get("b", b"k")).unwrap(), Some(b"v".to_vec()));

        kv.update(|tx| tx.delete("b", b"k")).unwrap();
        kv.update(|tx| tx.delete("b", b"k")).unwrap();
        assert_eq!(kv.view(|tx| tx.get("b", b"k")).unwrap(), None);
    }

    #[test]
    fn test_missing_bucket() {
        let kv = MemoryKv::new();
        let err = kv.view(|tx| tx.get("nope", b"k")).unwrap_err();
        assert!(matches!(err, StoreError::BucketNotFound(_)));

        let err = kv.update(|tx| tx.delete("nope", b"k")).unwrap_err();
        assert!(matches!(err, StoreError::BucketNotFound(_)));
    }

    #[test]
    fn test_update_sees_staged_changes() {
        let kv = MemoryKv::new();
        let seen = kv
            .update(|tx| {
                tx.create_bucket_if_not_exists("b")?;
                tx.put("b", b"k", b"v")?;
                let put = tx.get("b", b"k")?;
                tx.delete("b", b"k")?;
                let deleted = tx.get("b", b"k")?;
                Ok::<_, StoreError>((put, deleted))
            })
            .unwrap();
        assert_eq!(seen, (Some(b"v".to_vec()), None));
    }

    #[test]
    fn test_failed_update_discards_overlay() {
        let kv = kv_with_bucket();

        let result: Result<()> = kv.update(|tx| {
            tx.create_bucket_if_not_exists("other")?;
            tx.put("b", b"k", b"v")?;
            Err(StoreError::Migration("abort".into()))
        });
        assert!(result.is_err());

        assert_eq!(kv.view(|tx| tx.get("b", b"k")).unwrap(), None);
        assert!(!kv.view(|tx| tx.bucket_exists("other")).unwrap());
    }

    #[test]
    fn test_concurrent_writers_are_serialized() {
        let kv = Arc::new(kv_with_bucket());
        kv.update(|tx| tx.put("b", b"n", &0u64.to_be_bytes())).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let kv = Arc::clone(&kv);
                thread::spawn(move || {
                    for _ in 0..50 {
                        kv.update(|tx| {
                            let current = tx.get("b", b"n")?.unwrap_or_default();
                            let n = u64::from_be_bytes(current.try_into().unwrap());
                            tx.put("b", b"n", &(n + 1).to_be_bytes())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let n = kv.view(|tx| tx.get("b", b"n")).unwrap().unwrap();
        assert_eq!(u64::from_be_bytes(n.try_into().unwrap()), 400);
    }
}
