use std::sync::Arc;

use bytes::Bytes;

use crate::core::{BucketId, Result};
use crate::wallet::MessageSigner;
use super::network::{
    create_bucket_message, deposit_message, BucketParams, Locator, NamedVersion, ReadOptions,
    StorageNetwork, StoreOptions, StoreReceipt,
};

/// Storage client bound to one signer
///
/// A session only exists once the network handshake succeeded; there is no
/// way to obtain a half-connected one.
pub struct StorageSession {
    signer: Arc<dyn MessageSigner>,
    network: Arc<dyn StorageNetwork>,
}

impl StorageSession {
    pub async fn create(signer: Arc<dyn MessageSigner>, network: Arc<dyn StorageNetwork>) -> Result<Self> {
        log::debug!("Opening storage session for {}", signer.address());
        network.connect().await?;
        log::info!("Storage session ready for {}", signer.address());
        Ok(Self { signer, network })
    }

    /// Address of the account the session acts for
    pub fn owner(&self) -> &str {
        self.signer.address()
    }

    pub async fn store(&self, bucket: BucketId, data: Bytes, options: StoreOptions) -> Result<StoreReceipt> {
        self.network.store(bucket, data, options).await
    }

    pub async fn read(&self, locator: &Locator, options: ReadOptions) -> Result<Bytes> {
        self.network.read(locator, options).await
    }

    pub async fn resolve(&self, bucket: BucketId, name: &str) -> Result<NamedVersion> {
        self.network.resolve(bucket, name).await
    }

    pub async fn get_deposit(&self) -> Result<u128> {
        self.network.get_deposit(self.owner()).await
    }

    pub async fn deposit_balance(&self, amount: u128) -> Result<()> {
        let signature = self.signer.sign_message(&deposit_message(self.owner(), amount)).await?;
        log::info!("Depositing {} for {}", amount, self.owner());
        self.network.deposit_balance(self.owner(), amount, &signature).await
    }

    pub async fn create_bucket(&self, cluster_id: &str, params: BucketParams) -> Result<BucketId> {
        let message = create_bucket_message(self.owner(), cluster_id, params);
        let signature = self.signer.sign_message(&message).await?;
        let bucket = self.network.create_bucket(self.owner(), cluster_id, params, &signature).await?;
        log::info!("Created bucket {} in cluster {}", bucket, cluster_id);
        Ok(bucket)
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.network.disconnect().await
    }
}
