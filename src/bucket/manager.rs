use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{BucketId, Result, VaultError};
use crate::storage::{BucketParams, StorageSession};
use super::store::KeyValueStore;

/// Provisioning state of the bucket belonging to one account
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BucketState {
    NoBucket,
    Provisioning,
    Ready(BucketId),
    /// Last attempt failed; the next attempt starts over
    ProvisionFailed(String),
}

/// Makes sure the active account owns a private bucket
///
/// Bucket ids are persisted per account address so two accounts sharing one
/// device never end up writing into each other's bucket.
pub struct BucketManager {
    store: Arc<dyn KeyValueStore>,
    cluster_id: String,
    min_deposit: u128,
    states: Mutex<HashMap<String, BucketState>>,
    provisioning: tokio::sync::Mutex<()>,
}

impl BucketManager {
    pub fn new(store: Arc<dyn KeyValueStore>, cluster_id: impl Into<String>, min_deposit: u128) -> Self {
        Self {
            store,
            cluster_id: cluster_id.into(),
            min_deposit,
            states: Mutex::new(HashMap::new()),
            provisioning: tokio::sync::Mutex::new(()),
        }
    }

    /// Durable key holding the bucket id of `address`
    pub fn storage_key(address: &str) -> String {
        format!("userBucketId:{}", address)
    }

    /// Bucket persisted for `address`, if any
    pub fn bucket_id(&self, address: &str) -> Result<Option<BucketId>> {
        match self.store.get(&Self::storage_key(address))? {
            Some(raw) => Ok(Some(raw.parse()?)),
            None => Ok(None),
        }
    }

    pub fn state(&self, address: &str) -> BucketState {
        if let Some(state) = self.states.lock().get(address) {
            return state.clone();
        }
        match self.bucket_id(address) {
            Ok(Some(bucket)) => BucketState::Ready(bucket),
            _ => BucketState::NoBucket,
        }
    }

    fn set_state(&self, address: &str, state: BucketState) {
        self.states.lock().insert(address.to_string(), state);
    }

    /// Return the account's bucket, provisioning one if none is persisted
    pub async fn ensure_bucket(&self, session: &StorageSession) -> Result<BucketId> {
        let owner = session.owner().to_string();
        let _guard = self.provisioning.lock().await;

        if let Some(bucket) = self.bucket_id(&owner)? {
            self.set_state(&owner, BucketState::Ready(bucket));
            return Ok(bucket);
        }

        log::info!("No bucket persisted for {}, provisioning one", owner);
        self.provision(session, None).await
    }

    /// Allocate the account's private bucket with an explicit deposit amount
    ///
    /// `deposit` overrides the amount locked when the current deposit is zero.
    /// The persisted bucket id is written once; an account that already owns a
    /// bucket gets `ProvisionFailed` and keeps its bucket.
    pub async fn create_private_bucket(&self, session: &StorageSession, deposit: Option<u128>) -> Result<BucketId> {
        let _guard = self.provisioning.lock().await;
        if let Some(existing) = self.bucket_id(session.owner())? {
            return Err(VaultError::ProvisionFailed(format!(
                "Account {} already owns bucket {}",
                session.owner(),
                existing
            )));
        }
        self.provision(session, deposit).await
    }

    async fn provision(&self, session: &StorageSession, deposit: Option<u128>) -> Result<BucketId> {
        let owner = session.owner().to_string();
        self.set_state(&owner, BucketState::Provisioning);

        match self.try_provision(session, deposit).await {
            Ok(bucket) => {
                log::info!("Bucket {} ready for {}", bucket, owner);
                self.set_state(&owner, BucketState::Ready(bucket));
                Ok(bucket)
            }
            Err(e) => {
                let message = match e {
                    VaultError::ProvisionFailed(message) => message,
                    other => other.to_string(),
                };
                log::error!("Provisioning a bucket for {} failed: {}", owner, message);
                self.set_state(&owner, BucketState::ProvisionFailed(message.clone()));
                Err(VaultError::ProvisionFailed(message))
            }
        }
    }

    async fn try_provision(&self, session: &StorageSession, deposit: Option<u128>) -> Result<BucketId> {
        let current = session.get_deposit().await?;
        if current == 0 {
            let amount = deposit.unwrap_or(self.min_deposit);
            if amount == 0 {
                return Err(VaultError::ProvisionFailed("Deposit amount must be positive".to_string()));
            }
            session.deposit_balance(amount).await?;
        } else {
            log::debug!("Existing deposit of {} is sufficient", current);
        }

        let bucket = session
            .create_bucket(&self.cluster_id, BucketParams { is_public: false })
            .await?;
        self.store
            .set(&Self::storage_key(session.owner()), &bucket.to_string())?;
        Ok(bucket)
    }

    /// Drop the persisted bucket of `address`
    pub fn forget(&self, address: &str) -> Result<()> {
        self.states.lock().remove(address);
        self.store.remove(&Self::storage_key(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::MemoryKeyValueStore;
    use crate::storage::{FailPoint, MemoryStorageNetwork};
    use crate::wallet::{KeyPair, KeystoreExtension, SignerAdapter};

    async fn session(network: Arc<MemoryStorageNetwork>) -> StorageSession {
        let ext = Arc::new(KeystoreExtension::new("keystore").with_key(None, KeyPair::generate()));
        let adapter = SignerAdapter::new("Vaulted").with_extension(ext);
        let signer = adapter.connect("keystore", None).await.unwrap();
        StorageSession::create(signer, network).await.unwrap()
    }

    fn manager() -> BucketManager {
        BucketManager::new(Arc::new(MemoryKeyValueStore::new()), "0xcluster", 50)
    }

    #[tokio::test]
    async fn test_provisioning_is_idempotent() {
        let network = Arc::new(MemoryStorageNetwork::new());
        let session = session(network.clone()).await;
        let manager = manager();
        assert_eq!(manager.state(session.owner()), BucketState::NoBucket);

        let first = manager.ensure_bucket(&session).await.unwrap();
        let second = manager.ensure_bucket(&session).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(manager.state(session.owner()), BucketState::Ready(first));

        let calls = network.calls();
        assert_eq!(calls.deposits, vec![(session.owner().to_string(), 50)]);
        assert_eq!(calls.buckets_created.len(), 1);
        assert!(!calls.buckets_created[0].2);
    }

    #[tokio::test]
    async fn test_existing_deposit_is_not_topped_up() {
        let network = Arc::new(MemoryStorageNetwork::new());
        let session = session(network.clone()).await;
        network.set_deposit(session.owner(), 7);

        manager().ensure_bucket(&session).await.unwrap();
        assert!(network.calls().deposits.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_retryable_without_double_deposit() {
        let network = Arc::new(MemoryStorageNetwork::new());
        let session = session(network.clone()).await;
        let manager = manager();

        network.fail_next(FailPoint::CreateBucket, 1);
        let err = manager.ensure_bucket(&session).await.unwrap_err();
        assert!(matches!(err, VaultError::ProvisionFailed(_)));
        assert!(matches!(manager.state(session.owner()), BucketState::ProvisionFailed(_)));
        assert_eq!(manager.bucket_id(session.owner()).unwrap(), None);

        let bucket = manager.ensure_bucket(&session).await.unwrap();
        assert_eq!(manager.bucket_id(session.owner()).unwrap(), Some(bucket));
        assert_eq!(network.calls().deposits.len(), 1);
    }

    #[tokio::test]
    async fn test_buckets_are_keyed_per_account() {
        let network = Arc::new(MemoryStorageNetwork::new());
        let alice = session(network.clone()).await;
        let bob = session(network.clone()).await;
        let manager = manager();

        let a = manager.ensure_bucket(&alice).await.unwrap();
        let b = manager.ensure_bucket(&bob).await.unwrap();
        assert_ne!(a, b);

        manager.forget(alice.owner()).unwrap();
        assert_eq!(manager.state(alice.owner()), BucketState::NoBucket);
        assert_eq!(manager.state(bob.owner()), BucketState::Ready(b));
    }

    #[tokio::test]
    async fn test_explicit_deposit_amount() {
        let network = Arc::new(MemoryStorageNetwork::new());
        let session = session(network.clone()).await;
        let manager = manager();

        let bucket = manager.create_private_bucket(&session, Some(1_000)).await.unwrap();
        assert_eq!(manager.bucket_id(session.owner()).unwrap(), Some(bucket));
        assert_eq!(network.calls().deposits, vec![(session.owner().to_string(), 1_000)]);
        assert_eq!(manager.ensure_bucket(&session).await.unwrap(), bucket);
    }

    #[tokio::test]
    async fn test_existing_bucket_is_never_replaced() {
        let network = Arc::new(MemoryStorageNetwork::new());
        let session = session(network.clone()).await;
        let manager = manager();

        let first = manager.ensure_bucket(&session).await.unwrap();
        let err = manager.create_private_bucket(&session, Some(1_000)).await.unwrap_err();
        assert!(matches!(err, VaultError::ProvisionFailed(_)));
        assert_eq!(manager.bucket_id(session.owner()).unwrap(), Some(first));
        assert_eq!(manager.state(session.owner()), BucketState::Ready(first));
        assert_eq!(network.calls().buckets_created.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_no_bucket() {
        let network = Arc::new(MemoryStorageNetwork::new());
        let session = session(network.clone()).await;
        let manager = BucketManager::new(Arc::new(FailingStore::default()), "0xcluster", 50);

        let err = manager.ensure_bucket(&session).await.unwrap_err();
        assert!(matches!(err, VaultError::ProvisionFailed(_)));
        assert_eq!(manager.bucket_id(session.owner()).unwrap(), None);
        assert!(matches!(manager.state(session.owner()), BucketState::ProvisionFailed(_)));
    }

    #[derive(Default)]
    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(VaultError::Io("disk full".to_string()))
        }

        fn remove(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }
}
