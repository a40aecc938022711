use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One CERE expressed in the chain's smallest unit
pub const CERE: u128 = 10_000_000_000;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config format error: {0}")]
    Format(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Vaulted configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Wallet and signer settings
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Chain RPC settings
    #[serde(default)]
    pub chain: ChainConfig,

    /// Storage network settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Local state settings
    #[serde(default)]
    pub state: StateConfig,
}

/// Wallet configuration settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Name announced to wallet extensions when enabling them
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Directory holding the local keystore (one `*.key` file per account)
    #[serde(default = "default_keystore_dir")]
    pub keystore_dir: PathBuf,

    /// Relay endpoint for the remote connector, if any
    #[serde(default)]
    pub relay_url: Option<String>,

    /// Whether the relay connector may resume a persisted session
    #[serde(default = "default_eager_connect")]
    pub eager_connect: bool,
}

/// Chain configuration settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Network key opened after a wallet connects
    #[serde(default = "default_network")]
    pub default_network: String,

    /// Whether the testnet appears in the network registry
    #[serde(default = "default_include_testnet")]
    pub include_testnet: bool,

    /// Open the default network as part of connecting a wallet
    #[serde(default = "default_connect_on_login")]
    pub connect_on_login: bool,

    /// Timeout for a single RPC round-trip
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// RPC method returning account info for an address
    #[serde(default = "default_balance_method")]
    pub balance_method: String,
}

/// Storage network configuration settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base URL of the storage gateway
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Cluster that new buckets are allocated in
    #[serde(default = "default_cluster_id")]
    pub cluster_id: String,

    /// Content-delivery endpoint used for share and download links
    #[serde(default = "default_cdn_url")]
    pub cdn_url: String,

    /// Deposit placed before bucket creation when the current deposit is zero
    #[serde(default = "default_min_deposit")]
    pub min_deposit: u64,

    /// Well-known name of the directory index inside a bucket
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// How many times a conflicting index write is retried
    #[serde(default = "default_index_max_retries")]
    pub index_max_retries: usize,
}

/// Local state configuration settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateConfig {
    /// Directory holding the durable key-value store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

// Default functions for serde
fn default_app_name() -> String {
    "Vaulted".to_string()
}

fn default_keystore_dir() -> PathBuf {
    match home::home_dir() {
        Some(home) => home.join(".vaulted").join("keys"),
        None => PathBuf::from("/tmp/.vaulted/keys"), // Fallback
    }
}

fn default_eager_connect() -> bool {
    true
}

fn default_network() -> String {
    "cereMainnet".to_string()
}

fn default_include_testnet() -> bool {
    true
}

fn default_connect_on_login() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_balance_method() -> String {
    "system_account".to_string()
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_cluster_id() -> String {
    "0x0059f5ada35eee46802d80750d5ca4a490640511".to_string()
}

fn default_cdn_url() -> String {
    "https://cdn.testnet.cere.network".to_string()
}

fn default_min_deposit() -> u64 {
    (5 * CERE) as u64
}

fn default_index_name() -> String {
    "fs".to_string()
}

fn default_index_max_retries() -> usize {
    5
}

fn default_data_dir() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("~/.local/share"));
    path.push("vaulted");
    path
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            keystore_dir: default_keystore_dir(),
            relay_url: None,
            eager_connect: default_eager_connect(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            default_network: default_network(),
            include_testnet: default_include_testnet(),
            connect_on_login: default_connect_on_login(),
            request_timeout_secs: default_request_timeout_secs(),
            balance_method: default_balance_method(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            cluster_id: default_cluster_id(),
            cdn_url: default_cdn_url(),
            min_deposit: default_min_deposit(),
            index_name: default_index_name(),
            index_max_retries: default_index_max_retries(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl VaultConfig {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        // Create directories if they don't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Try to read the file
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: VaultConfig = toml::from_str(&content)
                    .map_err(|e| ConfigError::Format(format!("Failed to parse config: {}", e)))?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, create default config
                let config = Self::default();
                config.save_to_file(path)?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Get the default configuration location
    pub fn default_location() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("~/.config"));
        path.push("vaulted");
        path.push("config.toml");
        path
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Format(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Reject values the rest of the client cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.index_name.is_empty() {
            return Err(ConfigError::Invalid("storage.index_name must not be empty".to_string()));
        }
        if self.storage.min_deposit == 0 {
            return Err(ConfigError::Invalid("storage.min_deposit must be positive".to_string()));
        }
        url::Url::parse(&self.storage.cdn_url)
            .map_err(|e| ConfigError::Invalid(format!("storage.cdn_url: {}", e)))?;
        url::Url::parse(&self.storage.gateway_url)
            .map_err(|e| ConfigError::Invalid(format!("storage.gateway_url: {}", e)))?;
        Ok(())
    }

    /// Path of the durable key-value file
    pub fn state_file(&self) -> PathBuf {
        self.state.data_dir.join("state.json")
    }
}
