//! Prefix-keyed transactional storage.
//!
//! A [`Store`] is a typed key/value store with lexicographic prefix
//! iteration and serializable scoped transactions, over one of two backends:
//! an in-memory ordered map (tests, `memory` endpoints) or RocksDB
//! (production).
//!
//! Keys are strings; values are JSON-encoded. Create (`new`) and update
//! (`set`) are strictly separate operations: callers rely on `new`
//! detecting duplicates, e.g. double externalization of a ballot.
//!
//! All operations are synchronous blocking I/O. Callers in async contexts
//! should use `spawn_blocking` if needed to avoid blocking the runtime.

mod backend;
mod store;
mod transaction;

pub use store::{Store, StoreIterator};
pub use transaction::StoreTransaction;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors from storage operations.
///
/// Not-found, already-exists, I/O and codec failures are distinct and
/// propagate unchanged to callers.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key '{0}' does not exist")]
    NotFound(String),
    #[error("key '{0}' already exists")]
    AlreadyExists(String),
    #[error("storage i/o error: {0}")]
    Io(String),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Point operations shared by [`Store`] and [`StoreTransaction`], so record
/// types can persist through either.
pub trait StoreOps {
    fn has(&self, key: &str) -> Result<bool, StoreError>;
    fn get_raw(&self, key: &str) -> Result<Vec<u8>, StoreError>;
    /// Create-only raw write.
    fn insert_raw(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
    /// Update-only raw write.
    fn update_raw(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;

    /// Read and decode a JSON value.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, StoreError>
    where
        Self: Sized,
    {
        Ok(serde_json::from_slice(&self.get_raw(key)?)?)
    }

    /// Encode and create. Fails with [`StoreError::AlreadyExists`] when the
    /// key is present.
    fn new<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StoreError>
    where
        Self: Sized,
    {
        let encoded = serde_json::to_vec(value)?;
        self.insert_raw(key, encoded)
    }

    /// Encode and update. Fails with [`StoreError::NotFound`] when the key
    /// is absent.
    fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StoreError>
    where
        Self: Sized,
    {
        let encoded = serde_json::to_vec(value)?;
        self.update_raw(key, encoded)
    }
}
