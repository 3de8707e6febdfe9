//! The store handle and prefix iterators.

use crate::backend::{Backend, WriteSet};
use crate::transaction::StoreTransaction;
use crate::{StoreError, StoreOps};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// A cheaply cloneable handle to one storage backend.
///
/// Readers outside a transaction always see the last committed state. Write
/// operations, single puts and whole transactions alike, serialize against
/// each other through a store-wide lock.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

pub(crate) struct StoreInner {
    pub(crate) backend: Backend,
    pub(crate) write_lock: Mutex<()>,
}

impl Store {
    /// Open an in-memory store. Used by tests and `memory` endpoints.
    pub fn memory() -> Store {
        Store {
            inner: Arc::new(StoreInner {
                backend: Backend::memory(),
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Open (or create) a RocksDB-backed store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Store, StoreError> {
        let backend = Backend::open_rocksdb(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "store opened");
        Ok(Store {
            inner: Arc::new(StoreInner {
                backend,
                write_lock: Mutex::new(()),
            }),
        })
    }

    /// Begin a scoped transaction.
    ///
    /// The returned transaction holds the store's write lock until it is
    /// committed or discarded, making transactions serializable with respect
    /// to each other and to single writes.
    pub fn begin_transaction(&self) -> StoreTransaction<'_> {
        StoreTransaction::begin(self)
    }

    /// Snapshot iterator over every key starting with `prefix`, in
    /// lexicographic (or reverse) key order. Released when dropped.
    pub fn iterator(&self, prefix: &str, reverse: bool) -> Result<StoreIterator, StoreError> {
        let mut items = self.inner.backend.scan_prefix(prefix)?;
        if reverse {
            items.reverse();
        }
        Ok(StoreIterator {
            items: items.into_iter(),
        })
    }

    /// Create several entries in one atomic batch. Fails without writing
    /// anything if any key already exists.
    pub fn news<T: Serialize>(&self, items: &[(String, T)]) -> Result<(), StoreError> {
        let _guard = self.inner.write_lock.lock();
        let mut writes = WriteSet::new();
        for (key, value) in items {
            if self.inner.backend.get(key)?.is_some() {
                return Err(StoreError::AlreadyExists(key.clone()));
            }
            writes.insert(key.clone(), Some(serde_json::to_vec(value)?));
        }
        self.inner.backend.apply(&writes)
    }

    /// Update several entries in one atomic batch. Fails without writing
    /// anything if any key is missing.
    pub fn sets<T: Serialize>(&self, items: &[(String, T)]) -> Result<(), StoreError> {
        let _guard = self.inner.write_lock.lock();
        let mut writes = WriteSet::new();
        for (key, value) in items {
            if self.inner.backend.get(key)?.is_none() {
                return Err(StoreError::NotFound(key.clone()));
            }
            writes.insert(key.clone(), Some(serde_json::to_vec(value)?));
        }
        self.inner.backend.apply(&writes)
    }
}

impl StoreOps for Store {
    fn has(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.inner.backend.get(key)?.is_some())
    }

    fn get_raw(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.inner
            .backend
            .get(key)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn insert_raw(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let _guard = self.inner.write_lock.lock();
        if self.inner.backend.get(key)?.is_some() {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        let mut writes = WriteSet::new();
        writes.insert(key.to_string(), Some(value));
        self.inner.backend.apply(&writes)
    }

    fn update_raw(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let _guard = self.inner.write_lock.lock();
        if self.inner.backend.get(key)?.is_none() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        let mut writes = WriteSet::new();
        writes.insert(key.to_string(), Some(value));
        self.inner.backend.apply(&writes)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let _guard = self.inner.write_lock.lock();
        if self.inner.backend.get(key)?.is_none() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        let mut writes = WriteSet::new();
        writes.insert(key.to_string(), None);
        self.inner.backend.apply(&writes)
    }
}

/// A snapshot iterator over a key prefix.
pub struct StoreIterator {
    items: std::vec::IntoIter<(String, Vec<u8>)>,
}

impl Iterator for StoreIterator {
    type Item = (String, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next()
    }
}
