//! JSON state file store.
//!
//! Wraps:
//! - An in-memory mapping for reads
//! - A human-diffable JSON file rewritten wholesale on every `put`
//! - A file lock enforcing a single writer

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::product::{ProductKey, ProductRecord};
use crate::storage::traits::{ProductStore, StorageError};

use super::file_lock::FileLock;

type Inventory = BTreeMap<ProductKey, ProductRecord>;

/// Durable [`ProductStore`] backed by a JSON file.
#[derive(Debug)]
pub struct JsonStateStore {
    path: PathBuf,
    _lock: FileLock,
    inventory: Mutex<Inventory>,
}

impl JsonStateStore {
    /// Open (or create) the state file at `path`.
    ///
    /// A missing, unreadable or corrupt file yields an empty mapping; the
    /// monitor prefers to keep running over halting on bad state. Failing to
    /// take the lock is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, &e))?;
        }

        let lock = FileLock::acquire(&path).map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                StorageError::Locked(path.display().to_string())
            } else {
                io_err(&path, &e)
            }
        })?;

        let inventory = Self::load(&path);

        Ok(Self {
            path,
            _lock: lock,
            inventory: Mutex::new(inventory),
        })
    }

    /// Path of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Inventory {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no state file yet, starting empty");
                return Inventory::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read state file, starting empty");
                return Inventory::new();
            }
        };

        if raw.trim().is_empty() {
            return Inventory::new();
        }

        match serde_json::from_str::<Inventory>(&raw) {
            Ok(inventory) => {
                info!(path = %path.display(), products = inventory.len(), "loaded product state");
                inventory
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "state file is corrupt, starting empty");
                Inventory::new()
            }
        }
    }

    /// Write `bytes` to a temp sibling, fsync, then rename over the target.
    fn write_atomic(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let temp_path = temp_path_for(&self.path);

        let result = (|| {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&temp_path, &self.path)?;
            sync_parent(&self.path)
        })();

        result.map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            io_err(&self.path, &e)
        })
    }
}

impl ProductStore for JsonStateStore {
    fn get(&self, key: &ProductKey) -> Result<Option<ProductRecord>, StorageError> {
        let guard = self
            .inventory
            .lock()
            .map_err(|_| StorageError::Poisoned("state.get"))?;
        Ok(guard.get(key).cloned())
    }

    fn put(&self, key: &ProductKey, record: ProductRecord) -> Result<(), StorageError> {
        let mut guard = self
            .inventory
            .lock()
            .map_err(|_| StorageError::Poisoned("state.put"))?;

        let previous = guard.insert(key.clone(), record);
        let bytes = match serde_json::to_vec_pretty(&*guard) {
            Ok(bytes) => bytes,
            Err(e) => {
                // Nothing reached disk; undo the in-memory change too.
                match previous {
                    Some(prev) => guard.insert(key.clone(), prev),
                    None => guard.remove(key),
                };
                return Err(StorageError::Serialization(e.to_string()));
            }
        };

        // On I/O failure memory stays ahead of disk until the next good write.
        self.write_atomic(&bytes)?;
        debug!(product = %key, bytes = bytes.len(), "state written");
        Ok(())
    }

    fn keys_for_source(&self, source: &str) -> Result<BTreeSet<ProductKey>, StorageError> {
        let guard = self
            .inventory
            .lock()
            .map_err(|_| StorageError::Poisoned("state.keys_for_source"))?;
        Ok(guard.keys().filter(|k| k.belongs_to(source)).cloned().collect())
    }

    fn snapshot(&self) -> Result<BTreeMap<ProductKey, ProductRecord>, StorageError> {
        let guard = self
            .inventory
            .lock()
            .map_err(|_| StorageError::Poisoned("state.snapshot"))?;
        Ok(guard.clone())
    }
}

fn io_err(path: &Path, e: &std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> std::io::Result<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => File::open(parent)?.sync_all(),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{ChannelId, MessageHandle};
    use tempfile::tempdir;

    fn record(out_of_stock: bool) -> ProductRecord {
        let mut handles = BTreeMap::new();
        handles.insert(ChannelId::new("-1001"), MessageHandle(42));
        ProductRecord {
            price_signature: Some("$49.99 USD Annually".to_string()),
            feature_signature: Some("SSD: 20 GB".to_string()),
            purchase_link: "https://shop.test/aff.php?aff=1&pid=1".to_string(),
            out_of_stock,
            message_handles: handles,
        }
    }

    #[test]
    fn test_put_writes_through() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("products.json");
        let key = ProductKey::new("https://shop.test/cart.php?a=add&pid=1", "MINI");

        let store = JsonStateStore::open(&path).unwrap();
        assert_eq!(store.path(), path);
        store.put(&key, record(false)).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let entry = &json["https://shop.test/cart.php?a=add&pid=1::MINI"];
        assert_eq!(entry["out_of_stock"], false);
        assert_eq!(entry["message_handles"]["-1001"], 42);
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_missing_parent_is_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state").join("products.json");
        let store = JsonStateStore::open(&path).unwrap();
        store
            .put(&ProductKey::new("https://shop.test/a", "X"), record(true))
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_empty_file_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("products.json");
        fs::write(&path, "").unwrap();

        let store = JsonStateStore::open(&path).unwrap();
        assert!(store.snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_second_open_is_locked_out() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("products.json");

        let _first = JsonStateStore::open(&path).unwrap();
        let second = JsonStateStore::open(&path);
        assert!(matches!(second, Err(StorageError::Locked(_))));
    }

    #[test]
    fn test_failed_write_keeps_previous_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("products.json");
        let key = ProductKey::new("https://shop.test/cart.php?a=add&pid=1", "MINI");

        let store = JsonStateStore::open(&path).unwrap();
        store.put(&key, record(false)).unwrap();
        let before = fs::read(&path).unwrap();

        // A directory where the temp file goes makes every write fail.
        fs::create_dir(temp_path_for(&path)).unwrap();
        let result = store.put(&key, record(true));

        assert!(matches!(result, Err(StorageError::Io { .. })));
        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(store.get(&key).unwrap().unwrap().out_of_stock);

        // The next good write catches the file up with memory.
        fs::remove_dir(temp_path_for(&path)).unwrap();
        store
            .put(&ProductKey::new("https://shop.test/cart.php?a=add&pid=1", "MAXI"), record(false))
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["https://shop.test/cart.php?a=add&pid=1::MINI"]["out_of_stock"], true);
    }
}
