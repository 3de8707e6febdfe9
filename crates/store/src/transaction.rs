//! Scoped store transactions.

use crate::backend::WriteSet;
use crate::store::Store;
use crate::{StoreError, StoreOps};
use parking_lot::MutexGuard;

/// A serializable transaction over a [`Store`].
///
/// Writes buffer into an overlay applied atomically on [`commit`]; reads see
/// the overlay first, then the committed state. Dropping the transaction
/// without committing discards it. The store's write lock is held for the
/// whole scope, so do not interleave direct store writes from the same
/// thread while a transaction is open.
///
/// [`commit`]: StoreTransaction::commit
pub struct StoreTransaction<'a> {
    store: &'a Store,
    _guard: MutexGuard<'a, ()>,
    writes: WriteSet,
}

impl<'a> StoreTransaction<'a> {
    pub(crate) fn begin(store: &'a Store) -> StoreTransaction<'a> {
        StoreTransaction {
            store,
            _guard: store.inner.write_lock.lock(),
            writes: WriteSet::new(),
        }
    }

    /// Apply every buffered write atomically.
    pub fn commit(self) -> Result<(), StoreError> {
        self.store.inner.backend.apply(&self.writes)
    }

    /// Drop every buffered write.
    pub fn discard(self) {}
}

impl StoreOps for StoreTransaction<'_> {
    fn has(&self, key: &str) -> Result<bool, StoreError> {
        match self.writes.get(key) {
            Some(Some(_)) => Ok(true),
            Some(None) => Ok(false),
            None => Ok(self.store.inner.backend.get(key)?.is_some()),
        }
    }

    fn get_raw(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        match self.writes.get(key) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(StoreError::NotFound(key.to_string())),
            None => self
                .store
                .inner
                .backend
                .get(key)?
                .ok_or_else(|| StoreError::NotFound(key.to_string())),
        }
    }

    fn insert_raw(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        if self.has(key)? {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        self.writes.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn update_raw(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        if !self.has(key)? {
            return Err(StoreError::NotFound(key.to_string()));
        }
        self.writes.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if !self.has(key)? {
            return Err(StoreError::NotFound(key.to_string()));
        }
        self.writes.insert(key.to_string(), None);
        Ok(())
    }
}
