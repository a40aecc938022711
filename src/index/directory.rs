//! The per-bucket directory index.
//!
//! Every upload appends one link to a single node registered under a
//! well-known name. Updates are compare-and-swap writes against the version
//! that was read, retried on conflict, and additionally serialised per
//! bucket within this process.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{BucketId, Result, VaultError};
use crate::storage::{Locator, ReadOptions, StorageSession, StoreOptions, WriteGuard};
use super::node::{DagNode, Link};

/// Path a file is linked under in the index
pub fn upload_path(file_name: &str) -> String {
    format!("uploads/{}/{}", file_name, file_name)
}

pub struct DirectoryIndex {
    name: String,
    max_retries: usize,
    writers: Mutex<HashMap<BucketId, Arc<tokio::sync::Mutex<()>>>>,
}

impl DirectoryIndex {
    pub fn new(name: impl Into<String>, max_retries: usize) -> Self {
        Self {
            name: name.into(),
            max_retries,
            writers: Mutex::new(HashMap::new()),
        }
    }

    fn writer(&self, bucket: BucketId) -> Arc<tokio::sync::Mutex<()>> {
        self.writers.lock().entry(bucket).or_default().clone()
    }

    /// Current node together with the guard a write based on it must carry
    async fn fetch(&self, session: &StorageSession, bucket: BucketId) -> Result<(DagNode, WriteGuard)> {
        let named = match session.resolve(bucket, &self.name).await {
            Ok(named) => named,
            Err(VaultError::NameNotFound(_)) => {
                log::debug!("Index \"{}\" not created yet in bucket {}", self.name, bucket);
                return Ok((DagNode::empty(), WriteGuard::Absent));
            }
            Err(e) => return Err(e.or_wrap(VaultError::IndexUnavailable)),
        };

        let locator = Locator::Blob {
            bucket,
            cid: named.cid,
        };
        let raw = session
            .read(&locator, ReadOptions::no_cache())
            .await
            .map_err(|e| e.or_wrap(VaultError::IndexUnavailable))?;
        let node = DagNode::decode(&raw).map_err(|e| VaultError::IndexUnavailable(e.to_string()))?;
        Ok((node, WriteGuard::Matches(named.version)))
    }

    /// Current index of `bucket`; empty when it does not exist yet
    pub async fn load(&self, session: &StorageSession, bucket: BucketId) -> Result<DagNode> {
        Ok(self.fetch(session, bucket).await?.0)
    }

    /// Append `link` to the index of `bucket` and return the node as written
    pub async fn append(&self, session: &StorageSession, bucket: BucketId, link: Link) -> Result<DagNode> {
        let writer = self.writer(bucket);
        let _serialised = writer.lock().await;

        for attempt in 0..=self.max_retries {
            let (mut node, guard) = self.fetch(session, bucket).await?;
            node.push(link.clone());
            let encoded = node.encode().map_err(|e| VaultError::IndexUnavailable(e.to_string()))?;

            match session
                .store(bucket, encoded, StoreOptions::named(self.name.clone(), guard))
                .await
            {
                Ok(receipt) => {
                    log::debug!(
                        "Index of bucket {} now has {} link(s), version {:?}",
                        bucket,
                        node.links.len(),
                        receipt.version
                    );
                    return Ok(node);
                }
                Err(VaultError::Conflict(_)) => {
                    log::warn!(
                        "Index of bucket {} changed underneath us (attempt {}/{}), retrying",
                        bucket,
                        attempt + 1,
                        self.max_retries + 1
                    );
                }
                Err(e) => return Err(e.or_wrap(VaultError::IndexUnavailable)),
            }
        }

        Err(VaultError::IndexUnavailable(format!(
            "Index \"{}\" kept changing after {} attempts",
            self.name,
            self.max_retries + 1
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ContentId;
    use crate::storage::{FailPoint, MemoryStorageNetwork, StorageNetwork};
    use crate::wallet::{KeyPair, KeystoreExtension, SignerAdapter};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn session(network: Arc<MemoryStorageNetwork>) -> StorageSession {
        let ext = Arc::new(KeystoreExtension::new("keystore").with_key(None, KeyPair::generate()));
        let adapter = SignerAdapter::new("Vaulted").with_extension(ext);
        let signer = adapter.connect("keystore", None).await.unwrap();
        StorageSession::create(signer, network).await.unwrap()
    }

    async fn racing_session(network: RacingNetwork) -> StorageSession {
        let ext = Arc::new(KeystoreExtension::new("keystore").with_key(None, KeyPair::generate()));
        let adapter = SignerAdapter::new("Vaulted").with_extension(ext);
        let signer = adapter.connect("keystore", None).await.unwrap();
        StorageSession::create(signer, Arc::new(network)).await.unwrap()
    }

    fn link(name: &str, size: u64) -> Link {
        Link::new(ContentId::new(format!("cid-{}", name)), size, upload_path(name))
    }

    #[test]
    fn test_upload_path() {
        assert_eq!(upload_path("a.txt"), "uploads/a.txt/a.txt");
    }

    #[tokio::test]
    async fn test_missing_index_loads_empty() {
        let session = session(Arc::new(MemoryStorageNetwork::new())).await;
        let index = DirectoryIndex::new("fs", 3);
        assert_eq!(index.load(&session, BucketId(1)).await.unwrap(), DagNode::empty());
    }

    #[tokio::test]
    async fn test_append_bootstraps_then_extends() {
        let session = session(Arc::new(MemoryStorageNetwork::new())).await;
        let index = DirectoryIndex::new("fs", 3);
        index.append(&session, BucketId(1), link("a.txt", 10)).await.unwrap();
        index.append(&session, BucketId(1), link("b.txt", 20)).await.unwrap();

        let node = index.load(&session, BucketId(1)).await.unwrap();
        let names: Vec<_> = node.links.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["uploads/a.txt/a.txt", "uploads/b.txt/b.txt"]);
    }

    #[tokio::test]
    async fn test_append_keeps_foreign_inline_data() {
        let network = Arc::new(MemoryStorageNetwork::new());
        let session = session(network.clone()).await;
        network
            .store(
                BucketId(1),
                Bytes::from_static(br#"{"data":"aGk=","links":[]}"#),
                StoreOptions::named("fs", WriteGuard::Absent),
            )
            .await
            .unwrap();

        let index = DirectoryIndex::new("fs", 3);
        let node = index.append(&session, BucketId(1), link("a.txt", 10)).await.unwrap();
        assert_eq!(node.data.as_deref(), Some("aGk="));
        assert_eq!(index.load(&session, BucketId(1)).await.unwrap(), node);
    }

    #[tokio::test]
    async fn test_other_resolve_errors_are_index_unavailable() {
        let network = Arc::new(MemoryStorageNetwork::new());
        let session = session(network.clone()).await;
        network.fail_next(FailPoint::Resolve, 1);
        let index = DirectoryIndex::new("fs", 3);
        assert!(matches!(
            index.append(&session, BucketId(1), link("a.txt", 10)).await,
            Err(VaultError::IndexUnavailable(_))
        ));
    }

    /// Network where another client rewrites the index right before each of our next `races` named writes
    struct RacingNetwork {
        inner: Arc<MemoryStorageNetwork>,
        races: AtomicUsize,
    }

    impl RacingNetwork {
        fn new(inner: Arc<MemoryStorageNetwork>, races: usize) -> Self {
            Self {
                inner,
                races: AtomicUsize::new(races),
            }
        }

        fn take_race(&self) -> bool {
            self.races
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait::async_trait]
    impl StorageNetwork for RacingNetwork {
        async fn connect(&self) -> Result<()> {
            self.inner.connect().await
        }

        async fn store(&self, bucket: BucketId, data: Bytes, options: StoreOptions) -> Result<crate::storage::StoreReceipt> {
            if options.name.is_some() && self.take_race() {
                let mut foreign = DagNode::empty();
                foreign.push(link("foreign.txt", 5));
                self.inner
                    .store(bucket, foreign.encode()?, StoreOptions::named("fs", WriteGuard::Unconditional))
                    .await?;
            }
            self.inner.store(bucket, data, options).await
        }

        async fn read(&self, locator: &Locator, options: ReadOptions) -> Result<Bytes> {
            self.inner.read(locator, options).await
        }

        async fn resolve(&self, bucket: BucketId, name: &str) -> Result<crate::storage::NamedVersion> {
            self.inner.resolve(bucket, name).await
        }

        async fn get_deposit(&self, owner: &str) -> Result<u128> {
            self.inner.get_deposit(owner).await
        }

        async fn deposit_balance(&self, owner: &str, amount: u128, signature: &crate::wallet::Signature) -> Result<()> {
            self.inner.deposit_balance(owner, amount, signature).await
        }

        async fn create_bucket(
            &self,
            owner: &str,
            cluster_id: &str,
            params: crate::storage::BucketParams,
            signature: &crate::wallet::Signature,
        ) -> Result<BucketId> {
            self.inner.create_bucket(owner, cluster_id, params, signature).await
        }

        async fn disconnect(&self) -> Result<()> {
            self.inner.disconnect().await
        }
    }

    #[tokio::test]
    async fn test_conflicting_writer_is_not_lost() {
        let inner = Arc::new(MemoryStorageNetwork::new());
        let session = racing_session(RacingNetwork::new(inner.clone(), 1)).await;

        let index = DirectoryIndex::new("fs", 3);
        index.append(&session, BucketId(1), link("a.txt", 10)).await.unwrap();

        let node = index.load(&session, BucketId(1)).await.unwrap();
        assert_eq!(node.links.len(), 2);
        let names: Vec<&str> = node.links.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["uploads/foreign.txt/foreign.txt", "uploads/a.txt/a.txt"]);
        assert_eq!(inner.calls().conflicts, 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let inner = Arc::new(MemoryStorageNetwork::new());
        let session = racing_session(RacingNetwork::new(inner.clone(), 10)).await;
        let index = DirectoryIndex::new("fs", 2);

        let result = index.append(&session, BucketId(1), link("a.txt", 10)).await;
        assert!(matches!(result, Err(VaultError::IndexUnavailable(_))));
        assert_eq!(inner.calls().conflicts, 3);
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_both_links() {
        let network = Arc::new(MemoryStorageNetwork::new());
        let session = Arc::new(session(network.clone()).await);
        let index = Arc::new(DirectoryIndex::new("fs", 3));

        let tasks: Vec<_> = ["a.txt", "b.txt"]
            .into_iter()
            .map(|name| {
                let (session, index) = (session.clone(), index.clone());
                tokio::spawn(async move { index.append(&session, BucketId(1), link(name, 1)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let node = index.load(&session, BucketId(1)).await.unwrap();
        assert_eq!(node.links.len(), 2);
    }

    #[tokio::test]
    async fn test_write_failure_is_index_unavailable() {
        let network = Arc::new(MemoryStorageNetwork::new());
        let session = session(network.clone()).await;
        network.fail_next(FailPoint::StoreNamed, 1);
        let index = DirectoryIndex::new("fs", 3);
        assert!(matches!(
            index.append(&session, BucketId(1), link("a.txt", 10)).await,
            Err(VaultError::IndexUnavailable(_))
        ));
        assert!(index.load(&session, BucketId(1)).await.unwrap().links.is_empty());
    }
}
