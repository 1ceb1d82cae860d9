//! Keyed reader/writer locks over the storage tree.
//!
//! Two levels of locking:
//! - the **namespace** lock guards the set of buckets (the storage root's
//!   direct children). Bucket creation and deletion take it exclusively;
//!   everything else takes it shared.
//! - one **bucket** lock per bucket name guards that bucket's subtree.
//!   Reads (get, list) take it shared, writes (put, delete) exclusively.
//!
//! Acquisition order is always namespace, then bucket, and no operation
//! acquires a lock it already holds.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

#[derive(Default)]
pub struct LockTable {
    namespace: Arc<RwLock<()>>,
    buckets: DashMap<String, Arc<RwLock<()>>>,
}

/// Access to a bucket's subtree, shared or exclusive depending on `G`.
///
/// Fields drop in declaration order, so the bucket lock is released before
/// the namespace lock.
pub struct BucketGuard<G> {
    _bucket: G,
    _namespace: OwnedRwLockReadGuard<()>,
}

pub type BucketReadGuard = BucketGuard<OwnedRwLockReadGuard<()>>;
pub type BucketWriteGuard = BucketGuard<OwnedRwLockWriteGuard<()>>;

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read_namespace(&self) -> OwnedRwLockReadGuard<()> {
        self.namespace.clone().read_owned().await
    }

    pub async fn write_namespace(&self) -> OwnedRwLockWriteGuard<()> {
        self.namespace.clone().write_owned().await
    }

    pub async fn read_bucket(&self, bucket: &str) -> BucketReadGuard {
        let namespace = self.read_namespace().await;
        let bucket = self.bucket_lock(bucket).read_owned().await;
        BucketGuard {
            _bucket: bucket,
            _namespace: namespace,
        }
    }

    pub async fn write_bucket(&self, bucket: &str) -> BucketWriteGuard {
        let namespace = self.read_namespace().await;
        let bucket = self.bucket_lock(bucket).write_owned().await;
        BucketGuard {
            _bucket: bucket,
            _namespace: namespace,
        }
    }

    /// Drop the lock entry for a deleted bucket.
    ///
    /// Callers must hold the namespace write guard, which guarantees no
    /// bucket guard for `bucket` is outstanding.
    pub fn forget(&self, _namespace: &OwnedRwLockWriteGuard<()>, bucket: &str) {
        self.buckets.remove(bucket);
    }

    /// Drop the lock entry of a bucket found missing under `guard`.
    ///
    /// Holders of a bucket guard also hold the namespace shared, so the
    /// bucket cannot be created until every guard on the evicted lock is
    /// gone. Requests that arrive later start from a fresh entry.
    pub fn forget_missing<G>(&self, _guard: &BucketGuard<G>, bucket: &str) {
        self.buckets.remove(bucket);
    }

    pub fn tracked_buckets(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_lock(&self, bucket: &str) -> Arc<RwLock<()>> {
        self.buckets
            .entry(bucket.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn writers_on_different_buckets_do_not_block() {
        let table = LockTable::new();
        let _a = table.write_bucket("alpha").await;
        let b = timeout(Duration::from_millis(200), table.write_bucket("beta")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn writer_excludes_readers_of_same_bucket() {
        let table = LockTable::new();
        let writer = table.write_bucket("alpha").await;

        let blocked = timeout(Duration::from_millis(100), table.read_bucket("alpha")).await;
        assert!(blocked.is_err());

        drop(writer);
        let unblocked = timeout(Duration::from_millis(200), table.read_bucket("alpha")).await;
        assert!(unblocked.is_ok());
    }

    #[tokio::test]
    async fn namespace_writer_waits_for_bucket_guards() {
        let table = LockTable::new();
        let reader = table.read_bucket("alpha").await;

        let blocked = timeout(Duration::from_millis(100), table.write_namespace()).await;
        assert!(blocked.is_err());

        drop(reader);
        let ns = timeout(Duration::from_millis(200), table.write_namespace())
            .await
            .unwrap();
        table.forget(&ns, "alpha");
        assert_eq!(table.tracked_buckets(), 0);
    }

    #[tokio::test]
    async fn missing_buckets_do_not_accumulate_entries() {
        let table = LockTable::new();
        for i in 0..100 {
            let name = format!("ghost-{}", i);
            let guard = table.read_bucket(&name).await;
            table.forget_missing(&guard, &name);
        }
        assert_eq!(table.tracked_buckets(), 0);
    }

    #[tokio::test]
    async fn eviction_hands_out_a_fresh_lock() {
        let table = LockTable::new();
        let writer = table.write_bucket("alpha").await;
        table.forget_missing(&writer, "alpha");

        // a fresh entry does not wait on the evicted lock
        let fresh = timeout(Duration::from_millis(200), table.write_bucket("alpha")).await;
        assert!(fresh.is_ok());
        assert_eq!(table.tracked_buckets(), 1);
    }
}
