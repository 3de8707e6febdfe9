//! Persistent records of externalized operations.

use crate::storage_error;
use concord_store::{Store, StoreError, StoreOps};
use concord_types::{Address, Amount, Error, Operation, OperationKind, Transaction};
use serde::{Deserialize, Serialize};

pub const BLOCK_OPERATION_PREFIX: &str = "bo:";

/// One externalized operation, keyed under its transaction by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockOperation {
    pub hash: String,
    pub tx_hash: String,
    pub index: usize,
    pub kind: OperationKind,
    pub source: Address,
    pub target: Address,
    pub amount: Amount,
}

impl BlockOperation {
    pub fn from_operation(tx: &Transaction, op: &Operation, index: usize) -> Self {
        BlockOperation {
            hash: op.hash_string(),
            tx_hash: tx.hash().to_string(),
            index,
            kind: op.kind,
            source: tx.source().clone(),
            target: op.body.target.clone(),
            amount: op.body.amount,
        }
    }

    /// Index is zero-padded so sibling keys iterate in application order.
    pub fn storage_key(tx_hash: &str, index: usize) -> String {
        format!("{}{}:{:04}", BLOCK_OPERATION_PREFIX, tx_hash, index)
    }

    pub fn save<S: StoreOps>(&self, store: &mut S) -> Result<(), Error> {
        match store.new(&Self::storage_key(&self.tx_hash, self.index), self) {
            Ok(()) => Ok(()),
            Err(StoreError::AlreadyExists(_)) => Err(Error::AlreadySaved),
            Err(e) => Err(storage_error(e)),
        }
    }
}

pub fn get_block_operation<S: StoreOps>(
    store: &S,
    tx_hash: &str,
    index: usize,
) -> Result<BlockOperation, Error> {
    match store.get(&BlockOperation::storage_key(tx_hash, index)) {
        Ok(bo) => Ok(bo),
        Err(StoreError::NotFound(_)) => Err(Error::BlockOperationDoesNotExists),
        Err(e) => Err(storage_error(e)),
    }
}

/// Every operation of one transaction, in application order.
pub fn get_block_operations(store: &Store, tx_hash: &str) -> Result<Vec<BlockOperation>, Error> {
    let prefix = format!("{}{}:", BLOCK_OPERATION_PREFIX, tx_hash);
    let mut records = Vec::new();
    for (_, value) in store.iterator(&prefix, false).map_err(storage_error)? {
        let bo: BlockOperation =
            serde_json::from_slice(&value).map_err(|e| Error::InvalidState(e.to_string()))?;
        records.push(bo);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_types::test_utils::test_transaction;
    use concord_types::KeyPair;

    #[test]
    fn operations_iterate_in_application_order() {
        let mut store = Store::memory();
        let source = KeyPair::random();
        let tx = test_transaction(
            &source,
            "u-u",
            &KeyPair::random().address(),
            Amount::new(10),
        );

        // write out of order; the zero-padded key restores order
        for index in [2usize, 0, 1] {
            let bo = BlockOperation {
                hash: format!("op-{index}"),
                tx_hash: tx.hash().to_string(),
                index,
                kind: OperationKind::Payment,
                source: tx.source().clone(),
                target: KeyPair::random().address(),
                amount: Amount::new(10),
            };
            bo.save(&mut store).unwrap();
        }

        let ops = get_block_operations(&store, tx.hash()).unwrap();
        let indices: Vec<usize> = ops.iter().map(|bo| bo.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);

        assert_eq!(
            get_block_operation(&store, tx.hash(), 1).unwrap().hash,
            "op-1"
        );
        assert_eq!(
            get_block_operation(&store, tx.hash(), 9).unwrap_err(),
            Error::BlockOperationDoesNotExists
        );
    }
}
