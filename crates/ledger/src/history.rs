//! Breadcrumbs for transactions seen but not yet externalized.

use crate::storage_error;
use concord_store::{StoreError, StoreOps};
use concord_types::{now_iso8601, Address, Error, Transaction};
use serde::{Deserialize, Serialize};

pub const BLOCK_TRANSACTION_HISTORY_PREFIX: &str = "bth:";

/// A shadow record written when a transaction first enters the pipelines,
/// so `GET /transactions/{hash}` can answer before agreement closes. Also
/// the novelty check: a hash with history is not accepted again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTransactionHistory {
    pub hash: String,
    pub source: Address,
    /// The raw transaction JSON as received.
    pub message: String,
    pub confirmed: String,
}

impl BlockTransactionHistory {
    pub fn from_transaction(tx: &Transaction) -> Self {
        BlockTransactionHistory {
            hash: tx.hash().to_string(),
            source: tx.source().clone(),
            message: String::from_utf8(tx.to_json()).expect("json is utf-8"),
            confirmed: now_iso8601(),
        }
    }

    pub fn storage_key(hash: &str) -> String {
        format!("{}{}", BLOCK_TRANSACTION_HISTORY_PREFIX, hash)
    }

    pub fn save<S: StoreOps>(&self, store: &mut S) -> Result<(), Error> {
        match store.new(&Self::storage_key(&self.hash), self) {
            Ok(()) => Ok(()),
            Err(StoreError::AlreadyExists(_)) => Err(Error::AlreadySaved),
            Err(e) => Err(storage_error(e)),
        }
    }
}

pub fn exists_block_transaction_history<S: StoreOps>(store: &S, hash: &str) -> Result<bool, Error> {
    store
        .has(&BlockTransactionHistory::storage_key(hash))
        .map_err(storage_error)
}

pub fn get_block_transaction_history<S: StoreOps>(
    store: &S,
    hash: &str,
) -> Result<BlockTransactionHistory, Error> {
    match store.get(&BlockTransactionHistory::storage_key(hash)) {
        Ok(bth) => Ok(bth),
        Err(StoreError::NotFound(_)) => Err(Error::StorageRecordDoesNotExist),
        Err(e) => Err(storage_error(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_store::Store;
    use concord_types::test_utils::test_transaction;
    use concord_types::{Amount, KeyPair};

    #[test]
    fn history_round_trips_and_rejects_duplicates() {
        let mut store = Store::memory();
        let source = KeyPair::random();
        let tx = test_transaction(
            &source,
            "u-u",
            &KeyPair::random().address(),
            Amount::new(5),
        );

        let bth = BlockTransactionHistory::from_transaction(&tx);
        bth.save(&mut store).unwrap();
        assert!(exists_block_transaction_history(&store, tx.hash()).unwrap());
        assert_eq!(bth.save(&mut store).unwrap_err(), Error::AlreadySaved);

        let loaded = get_block_transaction_history(&store, tx.hash()).unwrap();
        let embedded = Transaction::from_json(loaded.message.as_bytes()).unwrap();
        assert_eq!(embedded.hash(), tx.hash());
    }
}
