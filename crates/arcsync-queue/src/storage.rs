//! Key-value persistence for the offline queue.
//!
//! The queue only needs three operations on string blobs, so the trait
//! is deliberately small. It is synchronous: every implementation here
//! finishes in microseconds, and the queue persists while holding the
//! session lock, where awaiting would stall inbound processing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::StorageError;

/// String-blob storage keyed by string.
///
/// `Send + Sync + 'static` because the store lives inside the session
/// service, which is shared across tasks.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Returns the blob stored under `key`, or `None` if there is none.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous blob.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Deletes `key`. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Process-local store. Clones share the same map, which lets a test
/// "restart" a session by building a new queue over a clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    map: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.map
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".into()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// One file per key inside a directory.
///
/// Keys are mapped to file names by replacing every character outside
/// `[A-Za-z0-9_-]` with `_`, so `arcsync:queue:room-1` becomes
/// `arcsync_queue_room-1.json`. Writes go to a temporary file first and
/// are renamed into place, so a crash mid-write leaves the old blob.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Uses `dir` as the storage directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_memory_store_clones_share_data() {
        let a = MemoryStore::new();
        let b = a.clone();

        a.set("k", "v").unwrap();

        assert_eq!(b.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_file_store_round_trip_and_missing_key() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();

        assert_eq!(store.get("arcsync:queue").unwrap(), None);
        store.set("arcsync:queue", "[1,2]").unwrap();
        assert_eq!(store.get("arcsync:queue").unwrap().as_deref(), Some("[1,2]"));
        assert!(temp.path().join("arcsync_queue.json").exists());

        store.remove("arcsync:queue").unwrap();
        store.remove("arcsync:queue").unwrap();
        assert_eq!(store.get("arcsync:queue").unwrap(), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let temp = TempDir::new().unwrap();
        FileStore::open(temp.path()).unwrap().set("k", "persisted").unwrap();

        let reopened = FileStore::open(temp.path()).unwrap();

        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("persisted"));
    }
}
