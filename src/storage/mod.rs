// Storage network access for Vaulted
// Sessions pair a signer with a network backend; the gateway backend is used
// in production and the in-memory one for offline runs.

mod network;
mod session;
mod http;
mod memory;

pub use network::{
    create_bucket_message, deposit_message, BucketParams, Locator, NamedVersion, ReadOptions,
    StorageNetwork, StoreOptions, StoreReceipt, WriteGuard,
};
pub use session::StorageSession;
pub use http::HttpStorageNetwork;
pub use memory::{CallLog, FailPoint, MemoryStorageNetwork};
