//! Vaulted: wallet-authenticated private file storage on a content-addressed
//! storage network.
//!
//! A connected wallet account gets a private bucket, uploads are linked into a
//! per-bucket directory index, and files are shared through signed CDN links.

pub mod core;
pub mod wallet;
pub mod chain;
pub mod storage;
pub mod bucket;
pub mod index;
pub mod utils;

// Re-export main components for easier consumption
pub use crate::core::{
    Account, AppState, BucketId, ConfigError, ConnectionSnapshot, ContentId, FileRecord, FileUpload,
    Result, VaultClient, VaultConfig, VaultError, CERE,
};
pub use wallet::{KeyPair, KeystoreExtension, MessageSigner, Signature, SignerAdapter, WalletExtension};
pub use storage::{HttpStorageNetwork, MemoryStorageNetwork, StorageNetwork, StorageSession};
pub use bucket::{BucketManager, BucketState, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use index::{DagNode, DirectoryIndex, Link};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
