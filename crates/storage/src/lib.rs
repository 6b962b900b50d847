use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    QuotaExceeded { requested: usize, quota: usize },
    Unavailable,
    Io(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::QuotaExceeded { requested, quota } => {
                write!(f, "storage quota exceeded: requested={requested} quota={quota}")
            }
            StorageError::Unavailable => write!(f, "durable storage unavailable"),
            StorageError::Io(msg) => write!(f, "durable storage error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Durable string-blob store keyed by string.
///
/// Writes may fail (quota, disk). Callers that only use the store as a
/// persistence mirror are expected to log and carry on.
pub trait DurableStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<bool, StorageError>;
}

/// In-memory store with an optional byte quota (keys + values).
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: BTreeMap<String, String>,
    quota_bytes: Option<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DurableStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota_bytes {
            let existing = self.entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let requested = self.used_bytes() - existing + key.len() + value.len();
            if requested > quota {
                return Err(StorageError::QuotaExceeded { requested, quota });
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.remove(key).is_some())
    }
}

/// One file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .map_err(|e| StorageError::Io(format!("create_dir_all({}): {e}", root.display())))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{name}.json"))
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(format!("read {key}: {e}"))),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        // Write-then-rename so a crash never leaves a truncated blob behind.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(|e| StorageError::Io(format!("write {key}: {e}")))?;
        std::fs::rename(&tmp, &path).map_err(|e| StorageError::Io(format!("rename {key}: {e}")))?;
        debug!(key, bytes = value.len(), "persisted blob");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(format!("remove {key}: {e}"))),
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod wasm_storage {
    use super::{DurableStore, StorageError};

    /// Browser `localStorage` backed store.
    #[derive(Debug, Default)]
    pub struct LocalStorageStore;

    impl LocalStorageStore {
        pub fn new() -> Result<Self, StorageError> {
            window_local_storage()?;
            Ok(Self)
        }
    }

    impl DurableStore for LocalStorageStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            window_local_storage()?
                .get_item(key)
                .map_err(|e| StorageError::Io(format!("get_item({key}) failed: {:?}", e)))
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            // Browsers report quota exhaustion as a DOMException from set_item.
            window_local_storage()?.set_item(key, value).map_err(|_| {
                StorageError::QuotaExceeded {
                    requested: key.len() + value.len(),
                    quota: 0,
                }
            })
        }

        fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
            let storage = window_local_storage()?;
            let existed = storage
                .get_item(key)
                .map_err(|e| StorageError::Io(format!("get_item({key}) failed: {:?}", e)))?
                .is_some();
            storage
                .remove_item(key)
                .map_err(|e| StorageError::Io(format!("remove_item({key}) failed: {:?}", e)))?;
            Ok(existed)
        }
    }

    fn window_local_storage() -> Result<web_sys::Storage, StorageError> {
        let win = web_sys::window().ok_or(StorageError::Unavailable)?;
        win.local_storage()
            .map_err(|e| StorageError::Io(format!("localStorage error: {:?}", e)))?
            .ok_or(StorageError::Unavailable)
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_storage::LocalStorageStore;

#[cfg(test)]
mod tests {
    use super::{DurableStore, FileStore, InMemoryStore, StorageError};
    use pretty_assertions::assert_eq;

    #[test]
    fn in_memory_quota_rejects_oversized_writes() {
        let mut store = InMemoryStore::with_quota(10);
        store.set("k", "12345").unwrap();
        let err = store.set("big", "0123456789").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { quota: 10, .. }));
        // The failed write leaves previous content intact.
        assert_eq!(store.get("k").unwrap().as_deref(), Some("12345"));
        assert_eq!(store.get("big").unwrap(), None);
    }

    #[test]
    fn in_memory_quota_counts_replaced_value_once() {
        let mut store = InMemoryStore::with_quota(8);
        store.set("k", "1234567").unwrap();
        store.set("k", "7654321").unwrap();
        assert_eq!(store.used_bytes(), 8);
    }

    #[test]
    fn file_store_round_trips_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();

        assert_eq!(store.get("mapCache_gee").unwrap(), None);
        store.set("mapCache_gee", "{\"a\":1}").unwrap();
        assert_eq!(store.get("mapCache_gee").unwrap().as_deref(), Some("{\"a\":1}"));

        assert!(store.remove("mapCache_gee").unwrap());
        assert!(!store.remove("mapCache_gee").unwrap());
        assert_eq!(store.get("mapCache_gee").unwrap(), None);
    }

    #[test]
    fn file_store_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();
        store.set("../escape/me", "x").unwrap();
        assert!(dir.path().join(".._escape_me.json").exists());
        assert_eq!(store.get("../escape/me").unwrap().as_deref(), Some("x"));
    }
}
