// Bucket provisioning for Vaulted
// Bucket ids live in a small durable key-value store, one entry per account.

mod store;
mod manager;

pub use store::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use manager::{BucketManager, BucketState};
