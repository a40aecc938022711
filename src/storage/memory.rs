//! In-process storage network.
//!
//! Content ids are SHA-256 digests of the stored bytes. Besides serving the
//! CLI's `--memory` mode it counts every call and can be told to fail the
//! next call of a given kind, which the tests rely on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::core::{BucketId, ContentId, Result, VaultError};
use crate::wallet::Signature;
use super::network::{
    BucketParams, Locator, NamedVersion, ReadOptions, StorageNetwork, StoreOptions, StoreReceipt, WriteGuard,
};

/// Kinds of call that can be made to fail once
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Connect,
    StoreBlob,
    StoreNamed,
    Resolve,
    GetDeposit,
    Deposit,
    CreateBucket,
}

/// Calls observed so far
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallLog {
    pub deposits: Vec<(String, u128)>,
    pub buckets_created: Vec<(String, String, bool)>,
    pub blob_stores: usize,
    pub named_writes: usize,
    pub conflicts: usize,
}

#[derive(Default)]
struct Inner {
    blobs: HashMap<(BucketId, ContentId), Bytes>,
    names: HashMap<(BucketId, String), NamedVersion>,
    deposits: HashMap<String, u128>,
    next_bucket: u64,
    calls: CallLog,
    failures: HashMap<FailPoint, usize>,
}

impl Inner {
    fn take_failure(&mut self, point: FailPoint) -> Result<()> {
        match self.failures.get_mut(&point) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Err(VaultError::Network(format!("injected failure at {:?}", point)))
            }
            _ => Ok(()),
        }
    }
}

pub struct MemoryStorageNetwork {
    inner: Mutex<Inner>,
    connected: AtomicBool,
}

impl MemoryStorageNetwork {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_bucket: 1,
                ..Inner::default()
            }),
            connected: AtomicBool::new(false),
        }
    }

    /// Make the next `times` calls of kind `point` fail
    pub fn fail_next(&self, point: FailPoint, times: usize) {
        *self.inner.lock().failures.entry(point).or_insert(0) += times;
    }

    /// Pretend `owner` already locked `amount` with the network
    pub fn set_deposit(&self, owner: &str, amount: u128) {
        self.inner.lock().deposits.insert(owner.to_string(), amount);
    }

    pub fn calls(&self) -> CallLog {
        self.inner.lock().calls.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn cid_for(data: &[u8]) -> ContentId {
        ContentId::new(hex::encode(Sha256::digest(data)))
    }
}

impl Default for MemoryStorageNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageNetwork for MemoryStorageNetwork {
    async fn connect(&self) -> Result<()> {
        self.inner.lock().take_failure(FailPoint::Connect)?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn store(&self, bucket: BucketId, data: Bytes, options: StoreOptions) -> Result<StoreReceipt> {
        // Interleave with concurrent callers like a network round-trip
        tokio::task::yield_now().await;

        let mut inner = self.inner.lock();
        let cid = Self::cid_for(&data);
        let name = match options.name {
            None => {
                inner.take_failure(FailPoint::StoreBlob)?;
                inner.calls.blob_stores += 1;
                inner.blobs.insert((bucket, cid.clone()), data);
                return Ok(StoreReceipt { cid, version: None });
            }
            Some(name) => name,
        };

        inner.take_failure(FailPoint::StoreNamed)?;
        let key = (bucket, name.clone());
        let current = inner.names.get(&key).map(|v| v.version);
        let guard_holds = match options.guard {
            WriteGuard::Unconditional => true,
            WriteGuard::Absent => current.is_none(),
            WriteGuard::Matches(expected) => current == Some(expected),
        };
        if !guard_holds {
            inner.calls.conflicts += 1;
            return Err(VaultError::Conflict(name));
        }

        let version = current.map_or(1, |v| v + 1);
        inner.calls.named_writes += 1;
        inner.blobs.insert((bucket, cid.clone()), data);
        inner.names.insert(key, NamedVersion { cid: cid.clone(), version });
        Ok(StoreReceipt { cid, version: Some(version) })
    }

    async fn read(&self, locator: &Locator, _options: ReadOptions) -> Result<Bytes> {
        tokio::task::yield_now().await;

        let inner = self.inner.lock();
        let (bucket, cid) = match locator {
            Locator::Blob { bucket, cid } => (*bucket, cid.clone()),
            Locator::Named { bucket, name } => {
                let named = inner
                    .names
                    .get(&(*bucket, name.clone()))
                    .ok_or_else(|| VaultError::NameNotFound(name.clone()))?;
                (*bucket, named.cid.clone())
            }
        };
        inner
            .blobs
            .get(&(bucket, cid.clone()))
            .cloned()
            .ok_or_else(|| VaultError::NotFound(format!("{}/{}", bucket, cid)))
    }

    async fn resolve(&self, bucket: BucketId, name: &str) -> Result<NamedVersion> {
        tokio::task::yield_now().await;

        let mut inner = self.inner.lock();
        inner.take_failure(FailPoint::Resolve)?;
        inner
            .names
            .get(&(bucket, name.to_string()))
            .cloned()
            .ok_or_else(|| VaultError::NameNotFound(name.to_string()))
    }

    async fn get_deposit(&self, owner: &str) -> Result<u128> {
        let mut inner = self.inner.lock();
        inner.take_failure(FailPoint::GetDeposit)?;
        Ok(inner.deposits.get(owner).copied().unwrap_or(0))
    }

    async fn deposit_balance(&self, owner: &str, amount: u128, _signature: &Signature) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.take_failure(FailPoint::Deposit)?;
        inner.calls.deposits.push((owner.to_string(), amount));
        *inner.deposits.entry(owner.to_string()).or_insert(0) += amount;
        Ok(())
    }

    async fn create_bucket(
        &self,
        owner: &str,
        cluster_id: &str,
        params: BucketParams,
        _signature: &Signature,
    ) -> Result<BucketId> {
        let mut inner = self.inner.lock();
        inner.take_failure(FailPoint::CreateBucket)?;
        if inner.deposits.get(owner).copied().unwrap_or(0) == 0 {
            return Err(VaultError::Network("Insufficient deposit".to_string()));
        }
        inner
            .calls
            .buckets_created
            .push((owner.to_string(), cluster_id.to_string(), params.is_public));
        let bucket = BucketId(inner.next_bucket);
        inner.next_bucket += 1;
        Ok(bucket)
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_named_write_guards() {
        let network = MemoryStorageNetwork::new();
        let bucket = BucketId(1);
        let first = network
            .store(bucket, Bytes::from_static(b"v1"), StoreOptions::named("fs", WriteGuard::Absent))
            .await
            .unwrap();
        assert_eq!(first.version, Some(1));

        let stale = network
            .store(bucket, Bytes::from_static(b"v2"), StoreOptions::named("fs", WriteGuard::Absent))
            .await;
        assert_eq!(stale, Err(VaultError::Conflict("fs".to_string())));

        network
            .store(bucket, Bytes::from_static(b"v2"), StoreOptions::named("fs", WriteGuard::Matches(1)))
            .await
            .unwrap();
        let named = Locator::Named { bucket, name: "fs".to_string() };
        assert_eq!(network.read(&named, ReadOptions::default()).await.unwrap(), Bytes::from_static(b"v2"));
        assert_eq!(network.calls().conflicts, 1);
    }

    #[tokio::test]
    async fn test_unregistered_name() {
        let network = MemoryStorageNetwork::new();
        assert_eq!(
            network.resolve(BucketId(1), "fs").await,
            Err(VaultError::NameNotFound("fs".to_string()))
        );
    }

    #[tokio::test]
    async fn test_identical_bytes_share_a_cid() {
        let network = MemoryStorageNetwork::new();
        let a = network.store(BucketId(1), Bytes::from_static(b"same"), StoreOptions::default()).await.unwrap();
        let b = network.store(BucketId(1), Bytes::from_static(b"same"), StoreOptions::default()).await.unwrap();
        assert_eq!(a.cid, b.cid);
        assert_eq!(network.calls().blob_stores, 2);
    }

    #[tokio::test]
    async fn test_failures_are_one_shot() {
        let network = MemoryStorageNetwork::new();
        network.fail_next(FailPoint::Connect, 1);
        assert!(network.connect().await.is_err());
        assert!(!network.is_connected());
        assert!(network.connect().await.is_ok());
        assert!(network.is_connected());
    }

    #[tokio::test]
    async fn test_bucket_requires_deposit() {
        let network = MemoryStorageNetwork::new();
        let sig = Signature::from_bytes(vec![0; 64]);
        let params = BucketParams { is_public: false };
        assert!(network.create_bucket("0xab", "cluster", params, &sig).await.is_err());
        network.deposit_balance("0xab", 5, &sig).await.unwrap();
        assert_eq!(network.create_bucket("0xab", "cluster", params, &sig).await.unwrap(), BucketId(1));
    }
}
