//! Persistent storage backend for stockwatch.
//!
//! This module provides durable, crash-safe storage with:
//! - A single JSON state file, rewritten wholesale on every mutation
//! - Write-to-temp-then-rename so a crash never leaves a half-written file
//! - File locking for single-process access
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │               JsonStateStore               │
//! ├────────────────────────────────────────────┤
//! │  Mutex<BTreeMap<ProductKey, ProductRecord>>│
//! │                     │ put                  │
//! │                     ↓                      │
//! │  products.json.tmp ──rename──> products.json│
//! │                     │                      │
//! │          FileLock (products.json.lock)     │
//! └────────────────────────────────────────────┘
//! ```

mod file_lock;
mod stores;

pub use file_lock::FileLock;
pub use stores::JsonStateStore;

use std::path::Path;

use crate::error::StorageError;

/// Open or create the product state file at the given path.
///
/// # Errors
/// - If the parent directory cannot be created
/// - If another process holds the lock
///
/// # Example
/// ```rust,ignore
/// use stockwatch::storage::open_state;
///
/// let store = open_state("./products.json")?;
/// ```
pub fn open_state(path: impl AsRef<Path>) -> Result<JsonStateStore, StorageError> {
    JsonStateStore::open(path)
}
