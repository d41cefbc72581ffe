//! Key-value persistence backends for session state.
//!
//! This module provides the `PersistentStore` trait plus three backends:
//! - `MemoryStore`: process-local map, used when nothing should touch disk
//! - `FileStore`: a JSON document in the cache directory
//! - `KeyringStore`: OS-level secure storage via keyring
//!
//! Values are plain strings; callers serialize at their own boundary.

pub mod error;
pub mod file;
pub mod keyring;
pub mod memory;

pub use error::StoreError;
pub use file::FileStore;
pub use keyring::KeyringStore;
pub use memory::MemoryStore;

/// Durable string key-value storage.
///
/// Implementations must not mask failures of the underlying medium.
/// Removing a key that does not exist is not an error.
pub trait PersistentStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;
}
