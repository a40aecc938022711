use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::{Account, Result, VaultError};
use super::keys::KeyPair;
use super::signing::Signature;

/// Source key of the built-in keystore extension
pub const KEYSTORE_SOURCE: &str = "vaulted-keystore";

/// How a wallet mechanism establishes its connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Accounts are available as soon as the extension is enabled
    Injected,
    /// Accounts appear only after an explicit handshake with a relay
    Relay,
}

/// Display metadata an extension reports about itself
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionMetadata {
    pub name: String,
    pub icon: Option<String>,
}

/// One wallet mechanism available to the process
#[async_trait]
pub trait WalletExtension: Send + Sync {
    /// Stable key identifying the extension
    fn source(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    fn metadata(&self) -> ExtensionMetadata;

    /// Authorise the application with the extension
    async fn enable(&self, app_name: &str) -> Result<()>;

    /// Accounts the extension exposes to the application
    async fn accounts(&self) -> Result<Vec<Account>>;

    /// Sign raw bytes with the key behind `address`
    async fn sign_raw(&self, address: &str, message: &[u8]) -> Result<Signature>;

    async fn disconnect(&self) -> Result<()>;

    /// Whether a previous session can be resumed without user interaction
    fn can_eager_connect(&self) -> bool {
        false
    }
}

struct StoredKey {
    name: Option<String>,
    key: KeyPair,
}

/// Standard extension backed by local ed25519 keys
pub struct KeystoreExtension {
    source: String,
    name: String,
    keys: RwLock<Vec<StoredKey>>,
    enabled: AtomicBool,
    deny_signing: AtomicBool,
}

impl KeystoreExtension {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: "Vaulted Keystore".to_string(),
            keys: RwLock::new(Vec::new()),
            enabled: AtomicBool::new(false),
            deny_signing: AtomicBool::new(false),
        }
    }

    /// Add a key under an optional display name
    pub fn with_key(self, name: Option<&str>, key: KeyPair) -> Self {
        self.add_key(name, key);
        self
    }

    pub fn add_key(&self, name: Option<&str>, key: KeyPair) -> String {
        let address = key.address();
        self.keys.write().push(StoredKey {
            name: name.map(str::to_string),
            key,
        });
        address
    }

    /// Load every `*.key` file in `dir`; a missing directory yields no accounts
    pub fn load_dir(source: impl Into<String>, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let extension = Self::new(source);
        if !dir.exists() {
            log::debug!("Keystore directory {} does not exist", dir.display());
            return Ok(extension);
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| VaultError::Io(format!("Failed to read keystore {}: {}", dir.display(), e)))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().map_or(false, |ext| ext == "key"))
            .collect();
        paths.sort();

        for path in paths {
            match KeyPair::from_file(&path) {
                Ok(key) => {
                    let name = path.file_stem().map(|s| s.to_string_lossy().into_owned());
                    extension.add_key(name.as_deref(), key);
                }
                Err(e) => log::warn!("Skipping unreadable key {}: {}", path.display(), e),
            }
        }

        log::info!("Loaded {} keystore account(s) from {}", extension.keys.read().len(), dir.display());
        Ok(extension)
    }

    /// Generate a key and write it to `<dir>/<name>.key`
    pub fn generate_into(dir: impl AsRef<Path>, name: &str) -> Result<String> {
        let path = dir.as_ref().join(format!("{}.key", name));
        if path.exists() {
            return Err(VaultError::InvalidArgument(format!("Key already exists: {}", path.display())));
        }
        let key = KeyPair::generate();
        key.save_to_file(&path)?;
        Ok(key.address())
    }

    /// Make every subsequent signing request fail as if the user declined it
    pub fn set_deny_signing(&self, deny: bool) {
        self.deny_signing.store(deny, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletExtension for KeystoreExtension {
    fn source(&self) -> &str {
        &self.source
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Injected
    }

    fn metadata(&self) -> ExtensionMetadata {
        ExtensionMetadata {
            name: self.name.clone(),
            icon: None,
        }
    }

    async fn enable(&self, app_name: &str) -> Result<()> {
        log::debug!("Keystore extension enabled for {}", app_name);
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Err(VaultError::SignerUnavailable);
        }
        Ok(self
            .keys
            .read()
            .iter()
            .map(|stored| Account {
                address: stored.key.address(),
                display_name: stored.name.clone(),
                source: self.source.clone(),
            })
            .collect())
    }

    async fn sign_raw(&self, address: &str, message: &[u8]) -> Result<Signature> {
        if self.deny_signing.load(Ordering::SeqCst) {
            return Err(VaultError::SignatureDenied("Rejected by user".to_string()));
        }
        let keys = self.keys.read();
        let stored = keys
            .iter()
            .find(|stored| stored.key.address() == address)
            .ok_or(VaultError::SignerUnavailable)?;
        Ok(stored.key.sign(message))
    }

    async fn disconnect(&self) -> Result<()> {
        self.enabled.store(false, Ordering::SeqCst);
        Ok(())
    }
}
