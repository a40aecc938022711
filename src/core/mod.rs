// Core types, configuration and the orchestrating client for Vaulted

mod error;
mod config;
mod types;
pub mod state;
mod client;

pub use error::{Result, VaultError};
pub use config::{
    ChainConfig, ConfigError, StateConfig, StorageConfig, VaultConfig, WalletConfig, CERE,
};
pub use types::{Account, BucketId, ContentId, FileRecord, FileUpload, DEFAULT_MIME_TYPE};
pub use state::{AppState, ConnectionSnapshot, LoadingGuard};
pub use client::{VaultClient, RELAY_SOURCE};
