use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use reqwest::Client as HttpClient;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::bucket::{BucketManager, BucketState, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
use crate::chain::{ChainConnection, Network, NetworkRegistry, RpcConnector, WsConnector};
use crate::core::{
    Account, BucketId, ContentId, FileRecord, FileUpload, Result, VaultConfig, VaultError,
    DEFAULT_MIME_TYPE,
};
use crate::core::state::AppState;
use crate::index::{upload_path, DirectoryIndex, Link};
use crate::storage::{HttpStorageNetwork, Locator, MemoryStorageNetwork, ReadOptions, StorageNetwork, StorageSession, StoreOptions};
use crate::utils::{self, AccessToken};
use crate::wallet::{
    ActiveSigner, HttpRelayChannel, KeyPair, KeystoreExtension, MessageSigner, RelayConnector, Signature,
    SignerAdapter, WalletProvider, KEYSTORE_SOURCE,
};

/// Source name the relay connector registers under
pub const RELAY_SOURCE: &str = "vaulted-relay";

const RELAY_SESSION_KEY: &str = "relaySessionId";

/// Turns a connected wallet into a working private file store
///
/// Every public operation marks the shared [`AppState`] as loading while it
/// runs, and records the error it returns there before handing it back.
pub struct VaultClient {
    config: VaultConfig,
    state: Arc<AppState>,
    wallet: SignerAdapter,
    chain: ChainConnection,
    buckets: BucketManager,
    index: DirectoryIndex,
    network: Arc<dyn StorageNetwork>,
    session: RwLock<Option<Arc<StorageSession>>>,
    kv_store: Arc<dyn KeyValueStore>,
    relay: Option<Arc<RelayConnector<HttpRelayChannel>>>,
    http: HttpClient,
}

impl VaultClient {
    /// Assemble a client from already constructed collaborators
    pub fn new(
        config: VaultConfig,
        wallet: SignerAdapter,
        network: Arc<dyn StorageNetwork>,
        kv_store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(config.chain.request_timeout_secs);
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VaultError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let chain = ChainConnection::new(
            NetworkRegistry::cere(config.chain.include_testnet),
            Arc::new(WsConnector::new(timeout)),
            config.chain.balance_method.clone(),
        );
        let buckets = BucketManager::new(
            kv_store.clone(),
            config.storage.cluster_id.clone(),
            u128::from(config.storage.min_deposit),
        );
        let index = DirectoryIndex::new(config.storage.index_name.clone(), config.storage.index_max_retries);

        log::info!(
            "Creating Vaulted client: network={}, cluster={}",
            config.chain.default_network,
            config.storage.cluster_id
        );

        Ok(Self {
            config,
            state: Arc::new(AppState::new()),
            wallet,
            chain,
            buckets,
            index,
            network,
            session: RwLock::new(None),
            kv_store,
            relay: None,
            http,
        })
    }

    /// Replace the transport used to reach chain RPC endpoints
    pub fn with_rpc_connector(mut self, connector: Arc<dyn RpcConnector>) -> Self {
        self.chain = ChainConnection::new(
            NetworkRegistry::cere(self.config.chain.include_testnet),
            connector,
            self.config.chain.balance_method.clone(),
        );
        self
    }

    /// Client backed by the configured keystore, relay, gateway and state file
    pub fn from_config(config: VaultConfig) -> Result<Self> {
        let kv_store: Arc<dyn KeyValueStore> = Arc::new(FileKeyValueStore::open(config.state_file())?);
        let network: Arc<dyn StorageNetwork> = Arc::new(HttpStorageNetwork::new(&config.storage.gateway_url)?);

        let keystore = KeystoreExtension::load_dir(KEYSTORE_SOURCE, &config.wallet.keystore_dir)?;
        let mut wallet = SignerAdapter::new(config.wallet.app_name.clone()).with_extension(Arc::new(keystore));

        let relay = match &config.wallet.relay_url {
            Some(url) => {
                let mut connector =
                    RelayConnector::new(RELAY_SOURCE, HttpRelayChannel::new(url)?, config.wallet.eager_connect);
                if let Some(session_id) = kv_store.get(RELAY_SESSION_KEY)? {
                    connector = connector.with_persisted_session(session_id);
                }
                let connector = Arc::new(connector);
                wallet.register(connector.clone());
                Some(connector)
            }
            None => None,
        };

        let mut client = Self::new(config, wallet, network, kv_store)?;
        client.relay = relay;
        Ok(client)
    }

    /// Self-contained client with an in-process network and a throwaway account
    pub fn in_memory(mut config: VaultConfig) -> Result<Self> {
        config.chain.connect_on_login = false;
        let keystore = KeystoreExtension::new(KEYSTORE_SOURCE).with_key(Some("ephemeral"), KeyPair::generate());
        let wallet = SignerAdapter::new(config.wallet.app_name.clone()).with_extension(Arc::new(keystore));
        Self::new(
            config,
            wallet,
            Arc::new(MemoryStorageNetwork::new()),
            Arc::new(MemoryKeyValueStore::new()),
        )
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Shared state observers subscribe to
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn chain(&self) -> &ChainConnection {
        &self.chain
    }

    /// Record a failed orchestration result, wrapping errors from below into `wrap`
    fn fail<T>(&self, result: Result<T>, wrap: fn(String) -> VaultError) -> Result<T> {
        self.record(result.map_err(|e| e.or_wrap(wrap)))
    }

    fn record<T>(&self, result: Result<T>) -> Result<T> {
        result.map_err(|error| {
            log::error!("{}", error);
            self.state.record_error(&error);
            error
        })
    }

    fn signer(&self) -> Result<Arc<ActiveSigner>> {
        self.wallet.signer().ok_or(VaultError::SignerUnavailable)
    }

    async fn storage_session(&self) -> Result<Arc<StorageSession>> {
        if self.wallet.signer().is_none() {
            return Err(VaultError::SignerUnavailable);
        }
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| VaultError::Network("Storage session not initialized".to_string()))
    }

    fn active_bucket(&self, address: &str) -> Result<BucketId> {
        self.buckets
            .bucket_id(address)?
            .ok_or_else(|| VaultError::NotFound("Bucket ID not found".to_string()))
    }

    // Wallet

    /// Every wallet provider and the accounts it exposes
    pub async fn discover_providers(&self) -> Result<Vec<WalletProvider>> {
        let result = self.wallet.discover().await;
        self.record(result)
    }

    pub async fn accounts_for(&self, source: &str) -> Result<Vec<Account>> {
        let result = self.wallet.accounts_for(source).await;
        self.record(result)
    }

    /// Connect the first account of the only registered wallet
    pub async fn connect_wallet(&self) -> Result<Account> {
        let _loading = self.state.begin_operation();
        let result = match self.wallet.connect_single().await {
            Ok(signer) => self.activate(signer).await,
            Err(e) => Err(e),
        };
        self.record(result)
    }

    /// Connect `address` (or the first account) of the wallet registered as `source`
    pub async fn connect_with_account(&self, source: &str, address: Option<&str>) -> Result<Account> {
        let _loading = self.state.begin_operation();
        let result = match self.wallet.connect(source, address).await {
            Ok(signer) => self.activate(signer).await,
            Err(e) => Err(e),
        };
        self.record(result)
    }

    async fn activate(&self, signer: Arc<ActiveSigner>) -> Result<Account> {
        let account = signer.account().clone();
        self.state.set_account(Some(account.clone()));

        match self.finish_activation(signer, &account).await {
            Ok(()) => {
                log::info!("Wallet connected: {}", account.address);
                Ok(account)
            }
            Err(e) => {
                log::error!("Failed to activate {}: {}", account.address, e);
                self.rollback_activation().await;
                Err(e)
            }
        }
    }

    async fn finish_activation(&self, signer: Arc<ActiveSigner>, account: &Account) -> Result<()> {
        if account.source == RELAY_SOURCE {
            if let Some(session_id) = self.relay.as_ref().and_then(|r| r.persisted_session()) {
                self.kv_store.set(RELAY_SESSION_KEY, &session_id)?;
            }
        }

        // The account stays connected even when storage is unreachable
        let signer: Arc<dyn MessageSigner> = signer;
        match StorageSession::create(signer, self.network.clone()).await {
            Ok(session) => *self.session.write().await = Some(Arc::new(session)),
            Err(e) => {
                log::error!("Failed to initialize storage session for {}: {}", account.address, e);
                self.state.record_error(&e);
                *self.session.write().await = None;
            }
        }

        if self.config.chain.connect_on_login && !self.chain.is_connected().await {
            let network = self.chain.connect(&self.config.chain.default_network).await?;
            self.state.set_network(Some(network.key));
        }
        Ok(())
    }

    /// Undo a half-finished connect so no signer or session outlives the failure
    async fn rollback_activation(&self) {
        let session = self.session.write().await.take();
        if let Some(session) = session {
            if let Err(e) = session.disconnect().await {
                log::warn!("Failed to close storage session: {}", e);
            }
        }
        if let Err(e) = self.wallet.disconnect().await {
            log::warn!("Failed to release signer: {}", e);
        }
        self.state.set_account(None);
    }

    /// Tear down the chain connection, storage session and signer
    pub async fn disconnect_wallet(&self) -> Result<()> {
        let _loading = self.state.begin_operation();

        if let Err(e) = self.chain.disconnect().await {
            log::warn!("Failed to close chain connection: {}", e);
        }
        let session = self.session.write().await.take();
        if let Some(session) = session {
            if let Err(e) = session.disconnect().await {
                log::warn!("Failed to close storage session: {}", e);
            }
        }
        let result = self.wallet.disconnect().await;
        self.state.clear_session();
        self.record(result)
    }

    pub async fn sign_message(&self, message: &str) -> Result<Signature> {
        let result = self.wallet.sign(message).await;
        self.record(result)
    }

    // Chain

    /// Free balance of `address` on the connected network
    pub async fn get_balance(&self, address: &str) -> Result<u128> {
        let result = self.chain.query_balance(address).await;
        self.record(result)
    }

    pub async fn switch_network(&self, network_key: &str) -> Result<Network> {
        let _loading = self.state.begin_operation();
        let result = self.chain.switch_network(network_key).await;
        if let Ok(network) = &result {
            self.state.set_network(Some(network.key.clone()));
        }
        self.record(result)
    }

    // Storage

    pub fn bucket_state(&self) -> Option<BucketState> {
        self.wallet
            .active_account()
            .map(|account| self.buckets.state(&account.address))
    }

    /// Allocate the active account's private bucket up front
    ///
    /// Fails with `ProvisionFailed` when the account already owns one, so
    /// files linked in the existing bucket stay reachable.
    pub async fn create_private_bucket(&self, deposit: Option<u128>) -> Result<BucketId> {
        let _loading = self.state.begin_operation();
        let result = match self.storage_session().await {
            Ok(session) => self.buckets.create_private_bucket(&session, deposit).await,
            Err(e) => Err(e),
        };
        self.fail(result, VaultError::ProvisionFailed)
    }

    /// Store a file, link it into the directory index and record it
    ///
    /// The returned record only exists once the index write went through.
    pub async fn upload_file(&self, upload: FileUpload) -> Result<FileRecord> {
        let _loading = self.state.begin_operation();
        log::info!("Uploading {} ({} bytes)", upload.name, upload.size());
        let result = self.try_upload(upload).await;
        self.fail(result, VaultError::UploadFailed)
    }

    async fn try_upload(&self, upload: FileUpload) -> Result<FileRecord> {
        if upload.name.is_empty() || upload.name.contains('/') {
            return Err(VaultError::InvalidArgument(format!("Invalid file name: {:?}", upload.name)));
        }
        let session = self.storage_session().await?;
        let bucket = self.buckets.ensure_bucket(&session).await?;

        let receipt = session
            .store(bucket, upload.data.clone(), StoreOptions::default())
            .await?;
        log::debug!("Stored {} as {}", upload.name, receipt.cid);

        let link = Link::new(receipt.cid.clone(), upload.size(), upload_path(&upload.name));
        self.index.append(&session, bucket, link).await?;

        let record = FileRecord::uploaded(&upload, session.owner(), receipt.cid);
        self.state.push_file(record.clone());
        log::info!("Uploaded {} to bucket {}", record.name, bucket);
        Ok(record)
    }

    /// Signed CDN link for a stored file
    ///
    /// The signed message only depends on the content id, so the link is the
    /// same on every call and never expires.
    pub async fn share_file(&self, record: &FileRecord) -> Result<String> {
        let _loading = self.state.begin_operation();
        let result = self.try_share(&record.content_id).await;
        self.fail(result, VaultError::ShareFailed)
    }

    async fn try_share(&self, cid: &ContentId) -> Result<String> {
        let signer = self.signer()?;
        let bucket = self.active_bucket(signer.address())?;
        let signature = signer.sign_message(&utils::share_message(cid)).await?;
        let url = utils::share_url(&self.config.storage.cdn_url, bucket, cid, &signature)?;
        Ok(url.to_string())
    }

    /// Fetch a file from the CDN and save it as `<dest_dir>/<record name>`
    ///
    /// Nothing verifies `token`; see [`AccessToken`].
    pub async fn download_file(
        &self,
        record: &FileRecord,
        token: &str,
        signature: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        let _loading = self.state.begin_operation();
        let result = self.try_download(record, token, signature, dest_dir).await;
        self.fail(result, VaultError::DownloadFailed)
    }

    /// Sign a download request and fetch with a freshly minted client-side token
    pub async fn download_with_new_token(&self, record: &FileRecord, dest_dir: &Path) -> Result<PathBuf> {
        let token = AccessToken::issue_unverified();
        let signature = self.sign_message(&utils::download_message(&record.id.to_string())).await?;
        self.download_file(record, token.as_str(), &signature.to_hex(), dest_dir).await
    }

    async fn try_download(&self, record: &FileRecord, token: &str, signature: &str, dest_dir: &Path) -> Result<PathBuf> {
        let account = self.state.active_account().ok_or(VaultError::SignerUnavailable)?;
        let bucket = self.active_bucket(&account.address)?;
        let url = utils::download_url(&self.config.storage.cdn_url, bucket, &record.content_id, token, signature)?;

        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(VaultError::DownloadFailed(format!(
                "Failed to download file: HTTP {}",
                response.status()
            )));
        }
        let payload = response.bytes().await?;

        tokio::fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join(utils::sanitize_file_name(&record.name));
        tokio::fs::write(&path, &payload).await?;
        log::info!("Saved {} ({} bytes) to {}", record.name, payload.len(), path.display());
        Ok(path)
    }

    /// Read a blob straight from the storage network
    pub async fn read_file(&self, bucket: BucketId, cid: &ContentId) -> Result<Bytes> {
        let _loading = self.state.begin_operation();
        self.state.clear_error();
        let result = match self.storage_session().await {
            Ok(session) => {
                let locator = Locator::Blob { bucket, cid: cid.clone() };
                session.read(&locator, ReadOptions::default()).await
            }
            Err(e) => Err(e),
        };
        self.fail(result, VaultError::DownloadFailed)
    }

    /// Read a file someone else shared, through the CDN
    pub async fn read_shared_file(&self, bucket: BucketId, cid: &ContentId, token: &str) -> Result<Bytes> {
        let _loading = self.state.begin_operation();
        self.state.clear_error();
        let result = self.try_read_shared(bucket, cid, token).await;
        self.fail(result, VaultError::DownloadFailed)
    }

    async fn try_read_shared(&self, bucket: BucketId, cid: &ContentId, token: &str) -> Result<Bytes> {
        let mut url = utils::content_url(&self.config.storage.cdn_url, bucket, cid)?;
        url.query_pairs_mut().append_pair("token", token);
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(VaultError::DownloadFailed(format!(
                "Failed to read shared file: HTTP {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?)
    }

    /// Rebuild the file list from the directory index of the active account
    pub async fn refresh_files(&self) -> Result<Vec<FileRecord>> {
        let _loading = self.state.begin_operation();
        let result = self.try_refresh().await;
        self.fail(result, VaultError::IndexUnavailable)
    }

    async fn try_refresh(&self) -> Result<Vec<FileRecord>> {
        let session = self.storage_session().await?;
        let records = match self.buckets.bucket_id(session.owner())? {
            Some(bucket) => {
                let node = self.index.load(&session, bucket).await?;
                node.links
                    .iter()
                    .map(|link| record_from_link(link, session.owner()))
                    .collect()
            }
            None => Vec::new(),
        };
        log::debug!("Directory index lists {} file(s)", records.len());
        self.state.replace_files(records.clone());
        Ok(records)
    }

    /// Files known to this process
    pub fn files(&self) -> Vec<FileRecord> {
        self.state.files()
    }
}

/// Index links carry no metadata beyond path and size; the rest is filled in
fn record_from_link(link: &Link, owner: &str) -> FileRecord {
    FileRecord {
        id: Uuid::new_v4(),
        name: link.file_name().to_string(),
        size: link.size,
        uploaded_by: owner.to_string(),
        uploaded_at: Utc::now(),
        authorized_users: vec![owner.to_string()],
        content_id: link.cid.clone(),
        mime_type: DEFAULT_MIME_TYPE.to_string(),
        description: String::new(),
        folder_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> VaultClient {
        VaultClient::in_memory(VaultConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_operations_require_connected_wallet() {
        let client = client();
        let upload = FileUpload::new("a.txt", b"hello".to_vec());
        assert_eq!(client.upload_file(upload).await, Err(VaultError::SignerUnavailable));
        assert_eq!(client.state().snapshot().last_error, Some(VaultError::SignerUnavailable));
        assert!(!client.state().snapshot().is_loading);
    }

    #[tokio::test]
    async fn test_connect_upload_refresh() {
        let client = client();
        let account = client.connect_wallet().await.unwrap();
        assert_eq!(client.state().active_account(), Some(account.clone()));

        let record = client
            .upload_file(FileUpload::new("a.txt", b"0123456789".to_vec()))
            .await
            .unwrap();
        assert_eq!(record.size, 10);
        assert_eq!(record.uploaded_by, account.address);
        assert_eq!(client.files(), vec![record.clone()]);

        let refreshed = client.refresh_files().await.unwrap();
        assert_eq!(refreshed.len(), 1);
        assert_eq!(refreshed[0].name, "a.txt");
        assert_eq!(refreshed[0].content_id, record.content_id);

        let bucket = client.buckets.bucket_id(&account.address).unwrap().unwrap();
        let data = client.read_file(bucket, &record.content_id).await.unwrap();
        assert_eq!(&data[..], b"0123456789");
    }

    #[tokio::test]
    async fn test_invalid_name_is_upload_failure() {
        let client = client();
        client.connect_wallet().await.unwrap();
        let result = client.upload_file(FileUpload::new("a/b", b"x".to_vec())).await;
        assert!(matches!(result, Err(VaultError::UploadFailed(_))));
        assert!(client.files().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_clears_session() {
        let client = client();
        client.connect_wallet().await.unwrap();
        client.upload_file(FileUpload::new("a.txt", b"x".to_vec())).await.unwrap();
        client.disconnect_wallet().await.unwrap();

        let snapshot = client.state().snapshot();
        assert!(snapshot.active_account.is_none());
        assert!(snapshot.files.is_empty());
        assert_eq!(client.sign_message("hi").await, Err(VaultError::SignerUnavailable));
    }

    #[test]
    fn test_record_from_link() {
        let link = Link::new(ContentId::new("cid1"), 10, upload_path("a.txt"));
        let record = record_from_link(&link, "0xab");
        assert_eq!(record.name, "a.txt");
        assert_eq!(record.size, 10);
        assert_eq!(record.mime_type, DEFAULT_MIME_TYPE);
    }
}
