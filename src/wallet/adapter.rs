use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;

use crate::core::{Account, Result, VaultError};
use super::extension::{ExtensionMetadata, ProviderKind, WalletExtension};
use super::signing::{MessageSigner, Signature};

/// Accounts grouped under the extension that exposes them
#[derive(Clone, Debug, Serialize)]
pub struct WalletProvider {
    pub source: String,
    pub kind: ProviderKind,
    pub metadata: ExtensionMetadata,
    pub accounts: Vec<Account>,
}

/// Signing capability for the account that is currently connected
pub struct ActiveSigner {
    account: Account,
    extension: Arc<dyn WalletExtension>,
}

impl ActiveSigner {
    pub fn account(&self) -> &Account {
        &self.account
    }
}

#[async_trait]
impl MessageSigner for ActiveSigner {
    fn address(&self) -> &str {
        &self.account.address
    }

    async fn sign_message(&self, message: &str) -> Result<Signature> {
        self.extension
            .sign_raw(&self.account.address, message.as_bytes())
            .await
    }
}

/// Normalises every registered wallet mechanism to one signing capability
pub struct SignerAdapter {
    app_name: String,
    extensions: Vec<Arc<dyn WalletExtension>>,
    active: RwLock<Option<Arc<ActiveSigner>>>,
}

impl SignerAdapter {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            extensions: Vec::new(),
            active: RwLock::new(None),
        }
    }

    pub fn register(&mut self, extension: Arc<dyn WalletExtension>) {
        log::debug!("Registered wallet extension {}", extension.source());
        self.extensions.push(extension);
    }

    pub fn with_extension(mut self, extension: Arc<dyn WalletExtension>) -> Self {
        self.register(extension);
        self
    }

    fn extension(&self, source: &str) -> Result<&Arc<dyn WalletExtension>> {
        self.extensions
            .iter()
            .find(|e| e.source() == source)
            .ok_or_else(|| VaultError::InvalidArgument(format!("Unknown wallet extension: {}", source)))
    }

    /// Enumerate every extension and the accounts it exposes, grouped by source
    pub async fn discover(&self) -> Result<Vec<WalletProvider>> {
        if self.extensions.is_empty() {
            return Err(VaultError::InvalidArgument("No extension found".to_string()));
        }

        let mut providers: BTreeMap<String, WalletProvider> = BTreeMap::new();
        for extension in &self.extensions {
            if let Err(e) = extension.enable(&self.app_name).await {
                log::warn!("Failed to enable wallet extension {}: {}", extension.source(), e);
                continue;
            }
            let accounts = match extension.accounts().await {
                Ok(accounts) => accounts,
                Err(e) => {
                    log::warn!("Failed to list accounts of {}: {}", extension.source(), e);
                    continue;
                }
            };
            for account in accounts {
                providers
                    .entry(account.source.clone())
                    .or_insert_with(|| WalletProvider {
                        source: account.source.clone(),
                        kind: extension.kind(),
                        metadata: extension.metadata(),
                        accounts: Vec::new(),
                    })
                    .accounts
                    .push(account);
            }
        }

        Ok(providers.into_values().collect())
    }

    /// Accounts exposed by a single extension
    pub async fn accounts_for(&self, source: &str) -> Result<Vec<Account>> {
        let extension = self.extension(source)?;
        extension.enable(&self.app_name).await?;
        extension.accounts().await
    }

    /// Connect an account of `source`, defaulting to its first account
    pub async fn connect(&self, source: &str, address: Option<&str>) -> Result<Arc<ActiveSigner>> {
        let extension = self.extension(source)?.clone();
        extension.enable(&self.app_name).await?;
        let accounts = extension.accounts().await?;

        let account = match address {
            Some(address) => accounts.into_iter().find(|a| a.address == address),
            None => accounts.into_iter().next(),
        }
        .ok_or(VaultError::SignerUnavailable)?;

        log::info!("Connected account {} via {}", account.address, source);
        let signer = Arc::new(ActiveSigner { account, extension });
        *self.active.write() = Some(signer.clone());
        Ok(signer)
    }

    /// Connect without a user choice, which only works with exactly one extension
    pub async fn connect_single(&self) -> Result<Arc<ActiveSigner>> {
        match self.extensions.as_slice() {
            [only] => {
                let source = only.source().to_string();
                self.connect(&source, None).await
            }
            _ => Err(VaultError::InvalidArgument("Please select a wallet extension".to_string())),
        }
    }

    pub fn signer(&self) -> Option<Arc<ActiveSigner>> {
        self.active.read().clone()
    }

    pub fn active_account(&self) -> Option<Account> {
        self.active.read().as_ref().map(|s| s.account.clone())
    }

    pub async fn sign(&self, message: &str) -> Result<Signature> {
        let signer = self.signer().ok_or(VaultError::SignerUnavailable)?;
        signer.sign_message(message).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        let signer = self.active.write().take();
        if let Some(signer) = signer {
            log::info!("Disconnecting account {}", signer.account.address);
            signer.extension.disconnect().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{KeyPair, KeystoreExtension, Verifier, PublicKey};

    fn adapter_with_keys(count: usize) -> (SignerAdapter, Arc<KeystoreExtension>) {
        let mut ext = KeystoreExtension::new("keystore");
        for i in 0..count {
            ext = ext.with_key(Some(&format!("account-{}", i)), KeyPair::generate());
        }
        let ext = Arc::new(ext);
        let adapter = SignerAdapter::new("Vaulted").with_extension(ext.clone());
        (adapter, ext)
    }

    #[tokio::test]
    async fn test_sign_before_connect() {
        let (adapter, _) = adapter_with_keys(1);
        assert_eq!(adapter.sign("hello").await, Err(VaultError::SignerUnavailable));
    }

    #[tokio::test]
    async fn test_discover_groups_by_source() {
        let (mut adapter, _) = adapter_with_keys(2);
        adapter.register(Arc::new(KeystoreExtension::new("other").with_key(None, KeyPair::generate())));
        let providers = adapter.discover().await.unwrap();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].source, "keystore");
        assert_eq!(providers[0].accounts.len(), 2);
        assert_eq!(providers[1].accounts.len(), 1);
    }

    #[tokio::test]
    async fn test_connect_selects_requested_account() {
        let (adapter, _) = adapter_with_keys(2);
        let accounts = adapter.accounts_for("keystore").await.unwrap();
        let signer = adapter.connect("keystore", Some(&accounts[1].address)).await.unwrap();
        assert_eq!(signer.address(), accounts[1].address);
        assert_eq!(adapter.active_account(), Some(accounts[1].clone()));

        let signature = adapter.sign("hello").await.unwrap();
        let public = PublicKey::from_address(&accounts[1].address).unwrap();
        assert!(public.verify(b"hello", &signature).unwrap());
    }

    #[tokio::test]
    async fn test_unknown_address_leaves_no_active_account() {
        let (adapter, _) = adapter_with_keys(1);
        assert_eq!(
            adapter.connect("keystore", Some("0x00")).await.err(),
            Some(VaultError::SignerUnavailable)
        );
        assert!(adapter.active_account().is_none());
    }

    #[tokio::test]
    async fn test_denial_propagates() {
        let (adapter, ext) = adapter_with_keys(1);
        adapter.connect("keystore", None).await.unwrap();
        ext.set_deny_signing(true);
        assert!(matches!(adapter.sign("hello").await, Err(VaultError::SignatureDenied(_))));
    }

    #[tokio::test]
    async fn test_connect_single_requires_one_extension() {
        let (mut adapter, _) = adapter_with_keys(1);
        assert!(adapter.connect_single().await.is_ok());
        adapter.register(Arc::new(KeystoreExtension::new("other")));
        assert!(matches!(adapter.connect_single().await, Err(VaultError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_disconnect_clears_signer() {
        let (adapter, _) = adapter_with_keys(1);
        adapter.connect("keystore", None).await.unwrap();
        adapter.disconnect().await.unwrap();
        assert!(adapter.signer().is_none());
        assert_eq!(adapter.sign("hello").await, Err(VaultError::SignerUnavailable));
    }
}
