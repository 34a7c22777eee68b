//! Persistent Storage Module
//!
//! String key-value backends for the persistent tier. Each backend is a flat
//! namespace of string items with an optional byte quota, the way browser
//! local storage behaves.

use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

// == Storage Error ==
/// Failure of a persistent storage primitive.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Write would exceed the byte quota
    #[error("Storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: usize, quota: usize },

    /// Underlying file I/O failed
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored document could not be encoded or decoded
    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience Result type for storage primitives.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// == Key-Value Storage ==
/// Durable string storage. Each call is atomic on its own.
pub trait KeyValueStorage: Send + Sync + Debug {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;
    fn set_item(&mut self, key: &str, value: &str) -> StorageResult<()>;
    fn remove_item(&mut self, key: &str) -> StorageResult<()>;
    /// All keys currently stored.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

fn used_bytes(items: &HashMap<String, String>) -> usize {
    items.iter().map(|(k, v)| k.len() + v.len()).sum()
}

/// Bytes the map would use after replacing `key` with `value`.
fn bytes_after_write(items: &HashMap<String, String>, key: &str, value: &str) -> usize {
    let current = used_bytes(items);
    let replaced = items.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
    current - replaced + key.len() + value.len()
}

// == Memory Storage ==
/// Process-local storage with an optional quota.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: HashMap<String, String>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects writes past `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            items: HashMap::new(),
            quota_bytes: Some(quota_bytes),
        }
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> StorageResult<()> {
        if let Some(quota) = self.quota_bytes {
            let needed = bytes_after_write(&self.items, key, value);
            if needed > quota {
                return Err(StorageError::QuotaExceeded { needed, quota });
            }
        }
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> StorageResult<()> {
        self.items.remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.items.keys().cloned().collect())
    }
}

// == File Storage ==
/// Storage persisted as one JSON document, rewritten on every mutation.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    items: HashMap<String, String>,
    quota_bytes: usize,
}

impl FileStorage {
    /// Opens (or creates) the document at `path`.
    ///
    /// An unreadable document is logged and replaced by an empty one.
    pub fn open(path: impl AsRef<Path>, quota_bytes: usize) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let items = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(items) => items,
                Err(e) => {
                    warn!("Discarding unreadable storage file {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            items,
            quota_bytes,
        })
    }

    fn flush(&self, items: &HashMap<String, String>) -> StorageResult<()> {
        let raw = serde_json::to_string(items)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> StorageResult<()> {
        let needed = bytes_after_write(&self.items, key, value);
        if needed > self.quota_bytes {
            return Err(StorageError::QuotaExceeded {
                needed,
                quota: self.quota_bytes,
            });
        }

        let mut next = self.items.clone();
        next.insert(key.to_string(), value.to_string());
        self.flush(&next)?;
        self.items = next;
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> StorageResult<()> {
        if !self.items.contains_key(key) {
            return Ok(());
        }
        let mut next = self.items.clone();
        next.remove(key);
        self.flush(&next)?;
        self.items = next;
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.items.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_roundtrip() {
        let mut storage = MemoryStorage::new();
        storage.set_item("a", "1").unwrap();

        assert_eq!(storage.get_item("a").unwrap(), Some("1".to_string()));
        storage.remove_item("a").unwrap();
        assert_eq!(storage.get_item("a").unwrap(), None);
        // Removing again is fine
        storage.remove_item("a").unwrap();
    }

    #[test]
    fn test_memory_storage_quota() {
        let mut storage = MemoryStorage::with_quota(10);
        storage.set_item("abc", "1234").unwrap(); // 7 bytes

        let result = storage.set_item("xyz", "1234");
        assert!(matches!(result, Err(StorageError::QuotaExceeded { .. })));

        // Overwriting counts the replaced item only once
        storage.set_item("abc", "1234567").unwrap();
        assert_eq!(storage.keys().unwrap().len(), 1);
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        {
            let mut storage = FileStorage::open(&path, 1024).unwrap();
            storage.set_item("ns:key", "\"value\"").unwrap();
        }

        let storage = FileStorage::open(&path, 1024).unwrap();
        assert_eq!(
            storage.get_item("ns:key").unwrap(),
            Some("\"value\"".to_string())
        );
    }

    #[test]
    fn test_file_storage_quota_leaves_document_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut storage = FileStorage::open(&path, 16).unwrap();
        storage.set_item("k", "small").unwrap();
        let result = storage.set_item("big", &"x".repeat(64));
        assert!(matches!(result, Err(StorageError::QuotaExceeded { .. })));

        let reopened = FileStorage::open(&path, 16).unwrap();
        assert_eq!(reopened.keys().unwrap(), vec!["k".to_string()]);
    }

    #[test]
    fn test_file_storage_discards_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "not json").unwrap();

        let storage = FileStorage::open(&path, 1024).unwrap();
        assert!(storage.keys().unwrap().is_empty());
    }
}
