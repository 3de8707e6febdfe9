//! Storage backends.

use crate::StoreError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::Path;

/// A batch of pending writes; `None` marks a deletion.
pub(crate) type WriteSet = BTreeMap<String, Option<Vec<u8>>>;

pub(crate) enum Backend {
    Memory(RwLock<BTreeMap<String, Vec<u8>>>),
    Rocks(rocksdb::DB),
}

impl Backend {
    pub(crate) fn memory() -> Backend {
        Backend::Memory(RwLock::new(BTreeMap::new()))
    }

    pub(crate) fn open_rocksdb(path: &Path) -> Result<Backend, StoreError> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let db = rocksdb::DB::open(&opts, path)?;
        Ok(Backend::Rocks(db))
    }

    pub(crate) fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self {
            Backend::Memory(map) => Ok(map.read().get(key).cloned()),
            Backend::Rocks(db) => Ok(db.get(key.as_bytes())?),
        }
    }

    /// Apply a write set atomically.
    pub(crate) fn apply(&self, writes: &WriteSet) -> Result<(), StoreError> {
        match self {
            Backend::Memory(map) => {
                let mut map = map.write();
                for (key, value) in writes {
                    match value {
                        Some(value) => {
                            map.insert(key.clone(), value.clone());
                        }
                        None => {
                            map.remove(key);
                        }
                    }
                }
                Ok(())
            }
            Backend::Rocks(db) => {
                let mut batch = rocksdb::WriteBatch::default();
                for (key, value) in writes {
                    match value {
                        Some(value) => batch.put(key.as_bytes(), value),
                        None => batch.delete(key.as_bytes()),
                    }
                }
                db.write(batch)?;
                Ok(())
            }
        }
    }

    /// All entries under `prefix` in lexicographic key order.
    ///
    /// Collected into a `Vec` at call time: the result is a snapshot, and it
    /// sidesteps RocksDB iterator lifetimes.
    pub(crate) fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        match self {
            Backend::Memory(map) => Ok(map
                .read()
                .range(prefix.to_string()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()),
            Backend::Rocks(db) => {
                let mode = if prefix.is_empty() {
                    rocksdb::IteratorMode::Start
                } else {
                    rocksdb::IteratorMode::From(prefix.as_bytes(), rocksdb::Direction::Forward)
                };
                let mut items = Vec::new();
                for entry in db.iterator(mode) {
                    let (key, value) = entry?;
                    if !key.starts_with(prefix.as_bytes()) {
                        break;
                    }
                    let key = String::from_utf8(key.to_vec())
                        .map_err(|_| StoreError::Io("non-utf8 key".to_string()))?;
                    items.push((key, value.to_vec()));
                }
                Ok(items)
            }
        }
    }
}
