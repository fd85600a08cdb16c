//! Abstract storage trait for product state.
//!
//! The engine only ever talks to a [`ProductStore`], so the reconciliation
//! pipeline can be tested against the in-memory backend without a
//! filesystem.

use std::collections::{BTreeMap, BTreeSet};

pub use crate::error::StorageError;
use crate::product::{ProductKey, ProductRecord};

/// Storage for [`ProductRecord`]s keyed by [`ProductKey`].
///
/// # Semantics
/// - `put` replaces the whole entry; at most one record exists per key
/// - durable backends write through on every `put`
/// - records are never deleted
pub trait ProductStore: Send + Sync {
    /// Get the record for a key.
    fn get(&self, key: &ProductKey) -> Result<Option<ProductRecord>, StorageError>;

    /// Insert or replace the record for a key.
    fn put(&self, key: &ProductKey, record: ProductRecord) -> Result<(), StorageError>;

    /// All keys observed on `source`.
    fn keys_for_source(&self, source: &str) -> Result<BTreeSet<ProductKey>, StorageError>;

    /// Copy of the full mapping.
    fn snapshot(&self) -> Result<BTreeMap<ProductKey, ProductRecord>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure the trait is object-safe
    fn _assert_product_store_object_safe(_: &dyn ProductStore) {}

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Serialization("key must be a string".to_string());
        assert!(err.to_string().contains("key must be a string"));

        let err = StorageError::Poisoned("inventory");
        assert!(err.to_string().contains("inventory"));
    }
}
