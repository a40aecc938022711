//! Durable key-value storage for small client state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::core::{Result, VaultError};

/// Minimal string key-value store that survives restarts
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Key-value store kept in a single JSON file
///
/// Writes go to a sibling temp file that is then renamed over the original.
/// The in-memory view only changes once the file has been replaced.
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                VaultError::Serialization(format!("Corrupt state file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(VaultError::Io(format!("Failed to read {}: {}", path.display(), e))),
        };
        log::debug!("Opened state file {} with {} entries", path.display(), entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| VaultError::Io(format!("Failed to replace {}: {}", self.path.display(), e)))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        let mut updated = entries.clone();
        updated.insert(key.to_string(), value.to_string());
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut updated = entries.clone();
        updated.remove(key);
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }
}

/// Store that forgets everything when the process exits
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.child("state.json");

        let store = FileKeyValueStore::open(path.path()).unwrap();
        store.set("userBucketId:0xab", "42").unwrap();
        drop(store);

        let reopened = FileKeyValueStore::open(path.path()).unwrap();
        assert_eq!(reopened.get("userBucketId:0xab").unwrap(), Some("42".to_string()));
        assert!(!dir.child("state.json.tmp").path().exists());
    }

    #[test]
    fn test_failed_write_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.child("state.json");
        let store = FileKeyValueStore::open(path.path()).unwrap();
        store.set("a", "1").unwrap();

        // A directory in place of the temp file makes every write fail
        std::fs::create_dir_all(dir.child("state.json.tmp").path().join("blocker")).unwrap();

        assert!(matches!(store.set("userBucketId:0xab", "42"), Err(VaultError::Io(_))));
        assert_eq!(store.get("userBucketId:0xab").unwrap(), None);

        assert!(store.remove("a").is_err());
        assert_eq!(store.get("a").unwrap(), Some("1".to_string()));

        let reopened = FileKeyValueStore::open(path.path()).unwrap();
        assert_eq!(reopened.get("userBucketId:0xab").unwrap(), None);
        assert_eq!(reopened.get("a").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn test_remove_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.child("nested").child("state.json");
        let store = FileKeyValueStore::open(path.path()).unwrap();
        store.set("a", "1").unwrap();
        store.remove("a").unwrap();
        let reopened = FileKeyValueStore::open(path.path()).unwrap();
        assert_eq!(reopened.get("a").unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.child("state.json");
        path.write_str("not json").unwrap();
        assert!(matches!(
            FileKeyValueStore::open(path.path()),
            Err(VaultError::Serialization(_))
        ));
    }
}
