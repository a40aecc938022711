use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::{BucketId, ContentId, Result};
use crate::wallet::Signature;

/// Where to read an object from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Locator {
    /// Immutable blob addressed by its content id
    Blob { bucket: BucketId, cid: ContentId },
    /// Whatever is currently registered under a well-known name
    Named { bucket: BucketId, name: String },
}

/// Precondition on a named write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteGuard {
    /// Overwrite regardless of the current version
    Unconditional,
    /// Only succeed if the name is not registered yet
    Absent,
    /// Only succeed if the name is still at this version
    Matches(u64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    /// Register the stored object under this name
    pub name: Option<String>,
    pub guard: WriteGuard,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            name: None,
            guard: WriteGuard::Unconditional,
        }
    }
}

impl StoreOptions {
    pub fn named(name: impl Into<String>, guard: WriteGuard) -> Self {
        Self {
            name: Some(name.into()),
            guard,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Bypass intermediate caches
    pub no_cache: bool,
}

impl ReadOptions {
    pub fn no_cache() -> Self {
        Self { no_cache: true }
    }
}

/// Result of a store call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreReceipt {
    pub cid: ContentId,
    /// Version of the name after the write, for named stores
    #[serde(default)]
    pub version: Option<u64>,
}

/// Current binding of a well-known name
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedVersion {
    pub cid: ContentId,
    pub version: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketParams {
    pub is_public: bool,
}

/// Message an owner signs to authorise a deposit
pub fn deposit_message(owner: &str, amount: u128) -> String {
    format!("deposit:{}:{}", owner, amount)
}

/// Message an owner signs to authorise a bucket allocation
pub fn create_bucket_message(owner: &str, cluster_id: &str, params: BucketParams) -> String {
    format!("create_bucket:{}:{}:{}", owner, cluster_id, params.is_public)
}

/// Narrow interface to the content-addressed storage network
///
/// Named reads and writes fail with `VaultError::NameNotFound` when the name
/// is not registered and with `VaultError::Conflict` when a [`WriteGuard`]
/// does not hold.
#[async_trait]
pub trait StorageNetwork: Send + Sync {
    /// Complete the network handshake
    async fn connect(&self) -> Result<()>;

    async fn store(&self, bucket: BucketId, data: Bytes, options: StoreOptions) -> Result<StoreReceipt>;

    async fn read(&self, locator: &Locator, options: ReadOptions) -> Result<Bytes>;

    async fn resolve(&self, bucket: BucketId, name: &str) -> Result<NamedVersion>;

    async fn get_deposit(&self, owner: &str) -> Result<u128>;

    async fn deposit_balance(&self, owner: &str, amount: u128, signature: &Signature) -> Result<()>;

    async fn create_bucket(
        &self,
        owner: &str,
        cluster_id: &str,
        params: BucketParams,
        signature: &Signature,
    ) -> Result<BucketId>;

    async fn disconnect(&self) -> Result<()>;
}
