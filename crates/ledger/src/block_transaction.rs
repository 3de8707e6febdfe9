//! Persistent records of externalized transactions.

use crate::storage_error;
use concord_store::{Store, StoreError, StoreOps};
use concord_types::{now_iso8601, Address, Amount, Error, Transaction};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const BLOCK_TRANSACTION_PREFIX: &str = "bt:";
pub const BLOCK_TRANSACTION_SOURCE_PREFIX: &str = "bt-source:";

/// The durable record of one externalized transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTransaction {
    pub hash: String,
    pub source: Address,
    pub fee: Amount,
    pub checkpoint: String,
    /// Total transferred amount, fees excluded.
    pub amount: Amount,
    /// Canonical hashes of the operations, in application order.
    pub operations: Vec<String>,
    /// The serialized ballot that closed consensus on this transaction.
    pub raw_ballot: String,
    pub saved_at: String,
}

impl BlockTransaction {
    pub fn from_transaction(tx: &Transaction, raw_ballot: String) -> Self {
        BlockTransaction {
            hash: tx.hash().to_string(),
            source: tx.source().clone(),
            fee: tx.body.fee,
            checkpoint: tx.body.checkpoint.clone(),
            amount: tx.total_amount(false),
            operations: tx
                .body
                .operations
                .iter()
                .map(|op| op.hash_string())
                .collect(),
            raw_ballot,
            saved_at: now_iso8601(),
        }
    }

    pub fn storage_key(hash: &str) -> String {
        format!("{}{}", BLOCK_TRANSACTION_PREFIX, hash)
    }

    fn source_index_key(&self) -> String {
        format!(
            "{}{}:{}:{}",
            BLOCK_TRANSACTION_SOURCE_PREFIX, self.source, self.saved_at, self.hash
        )
    }

    /// Persist this record and its per-source index entry.
    ///
    /// Strictly create-only: a hash seen before fails with
    /// [`Error::AlreadySaved`], which externalization treats as a benign
    /// double close.
    pub fn save<S: StoreOps>(&self, store: &mut S) -> Result<(), Error> {
        match store.new(&Self::storage_key(&self.hash), self) {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(_)) => return Err(Error::AlreadySaved),
            Err(e) => return Err(storage_error(e)),
        }
        store
            .insert_raw(&self.source_index_key(), Vec::new())
            .map_err(storage_error)?;
        debug!(hash = %self.hash, source = %self.source, "block transaction saved");
        Ok(())
    }
}

pub fn exists_block_transaction<S: StoreOps>(store: &S, hash: &str) -> Result<bool, Error> {
    store
        .has(&BlockTransaction::storage_key(hash))
        .map_err(storage_error)
}

pub fn get_block_transaction<S: StoreOps>(store: &S, hash: &str) -> Result<BlockTransaction, Error> {
    match store.get(&BlockTransaction::storage_key(hash)) {
        Ok(bt) => Ok(bt),
        Err(StoreError::NotFound(_)) => Err(Error::BlockTransactionDoesNotExists),
        Err(e) => Err(storage_error(e)),
    }
}

/// Every externalized transaction in store (hash) order.
pub fn get_block_transactions(
    store: &Store,
    reverse: bool,
) -> Result<Vec<BlockTransaction>, Error> {
    let mut records = Vec::new();
    for (_, value) in store
        .iterator(BLOCK_TRANSACTION_PREFIX, reverse)
        .map_err(storage_error)?
    {
        let bt: BlockTransaction = serde_json::from_slice(&value)
            .map_err(|e| Error::InvalidState(e.to_string()))?;
        records.push(bt);
    }
    Ok(records)
}

/// Transactions spent by `source`, in `saved_at` order via the index keys.
pub fn get_block_transactions_by_source(
    store: &Store,
    source: &Address,
    reverse: bool,
) -> Result<Vec<BlockTransaction>, Error> {
    let prefix = format!("{}{}:", BLOCK_TRANSACTION_SOURCE_PREFIX, source);
    let mut records = Vec::new();
    for (key, _) in store.iterator(&prefix, reverse).map_err(storage_error)? {
        let hash = key
            .rsplit(':')
            .next()
            .ok_or_else(|| Error::InvalidState(format!("malformed index key '{key}'")))?;
        records.push(get_block_transaction(store, hash)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_types::test_utils::test_transaction;
    use concord_types::KeyPair;

    fn saved_tx(store: &mut Store, source: &KeyPair, amount: u64) -> BlockTransaction {
        let tx = test_transaction(
            source,
            "u-u",
            &KeyPair::random().address(),
            Amount::new(amount),
        );
        let bt = BlockTransaction::from_transaction(&tx, "{}".to_string());
        bt.save(store).unwrap();
        bt
    }

    #[test]
    fn save_is_create_only() {
        let mut store = Store::memory();
        let source = KeyPair::random();
        let bt = saved_tx(&mut store, &source, 100);

        assert!(exists_block_transaction(&store, &bt.hash).unwrap());
        assert_eq!(bt.save(&mut store).unwrap_err(), Error::AlreadySaved);

        let loaded = get_block_transaction(&store, &bt.hash).unwrap();
        assert_eq!(loaded, bt);
    }

    #[test]
    fn missing_hash_is_a_distinct_error() {
        let store = Store::memory();
        assert_eq!(
            get_block_transaction(&store, "nope").unwrap_err(),
            Error::BlockTransactionDoesNotExists
        );
    }

    #[test]
    fn listing_by_source_uses_the_index() {
        let mut store = Store::memory();
        let source = KeyPair::random();
        let other = KeyPair::random();
        let a = saved_tx(&mut store, &source, 10);
        let b = saved_tx(&mut store, &source, 20);
        saved_tx(&mut store, &other, 30);

        let mine = get_block_transactions_by_source(&store, &source.address(), false).unwrap();
        let hashes: Vec<&str> = mine.iter().map(|bt| bt.hash.as_str()).collect();
        assert_eq!(mine.len(), 2);
        assert!(hashes.contains(&a.hash.as_str()));
        assert!(hashes.contains(&b.hash.as_str()));

        let all = get_block_transactions(&store, false).unwrap();
        assert_eq!(all.len(), 3);
    }
}
