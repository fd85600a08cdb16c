//! Product state storage.
//!
//! The [`ProductStore`] trait is the only way the engine reads or mutates
//! product state. Two backends are provided: an in-memory store for tests
//! and embedding, and a durable JSON state file.

mod memory;
pub mod persistent;
mod traits;

pub use memory::InMemoryProductStore;
pub use persistent::{open_state, FileLock, JsonStateStore};
pub use traits::{ProductStore, StorageError};
