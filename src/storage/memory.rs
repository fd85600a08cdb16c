//! In-memory storage backend.
//!
//! Thread-safe, non-durable implementation of [`ProductStore`], used by tests
//! and as the reference behaviour for the persistent backend.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use crate::product::{ProductKey, ProductRecord};
use crate::storage::traits::{ProductStore, StorageError};

/// In-memory product store.
#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    inventory: RwLock<BTreeMap<ProductKey, ProductRecord>>,
}

impl InMemoryProductStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = (ProductKey, ProductRecord)>) -> Self {
        Self {
            inventory: RwLock::new(records.into_iter().collect()),
        }
    }
}

impl ProductStore for InMemoryProductStore {
    fn get(&self, key: &ProductKey) -> Result<Option<ProductRecord>, StorageError> {
        let guard = self
            .inventory
            .read()
            .map_err(|_| StorageError::Poisoned("memory.get"))?;
        Ok(guard.get(key).cloned())
    }

    fn put(&self, key: &ProductKey, record: ProductRecord) -> Result<(), StorageError> {
        let mut guard = self
            .inventory
            .write()
            .map_err(|_| StorageError::Poisoned("memory.put"))?;
        guard.insert(key.clone(), record);
        Ok(())
    }

    fn keys_for_source(&self, source: &str) -> Result<BTreeSet<ProductKey>, StorageError> {
        let guard = self
            .inventory
            .read()
            .map_err(|_| StorageError::Poisoned("memory.keys_for_source"))?;
        Ok(guard.keys().filter(|k| k.belongs_to(source)).cloned().collect())
    }

    fn snapshot(&self) -> Result<BTreeMap<ProductKey, ProductRecord>, StorageError> {
        let guard = self
            .inventory
            .read()
            .map_err(|_| StorageError::Poisoned("memory.snapshot"))?;
        Ok(guard.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(out_of_stock: bool) -> ProductRecord {
        ProductRecord {
            price_signature: Some("A".to_string()),
            feature_signature: Some("F".to_string()),
            purchase_link: "https://shop.test".to_string(),
            out_of_stock,
            message_handles: BTreeMap::new(),
        }
    }

    #[test]
    fn test_put_replaces_in_place() {
        let store = InMemoryProductStore::new();
        let key = ProductKey::new("https://shop.test/a", "X");

        store.put(&key, record(false)).unwrap();
        store.put(&key, record(true)).unwrap();

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(store.get(&key).unwrap().unwrap().out_of_stock);
    }

    #[test]
    fn test_get_missing() {
        let store = InMemoryProductStore::new();
        let key = ProductKey::new("https://shop.test/a", "X");
        assert!(store.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_keys_for_source_partitions_by_source() {
        let a = "https://shop.test/a";
        let b = "https://shop.test/ab";
        let store = InMemoryProductStore::with_records([
            (ProductKey::new(a, "X"), record(false)),
            (ProductKey::new(a, "Y"), record(false)),
            (ProductKey::new(b, "Z"), record(false)),
        ]);

        let keys = store.keys_for_source(a).unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| k.source() == a));
        assert_eq!(store.keys_for_source(b).unwrap().len(), 1);
        assert!(store.keys_for_source("https://other.test").unwrap().is_empty());
    }
}
