//! Externalization: durably applying an agreed transaction.

use crate::{
    account::get_block_account, block_operation::BlockOperation,
    block_transaction::BlockTransaction, BlockAccount,
};
use concord_store::{Store, StoreTransaction};
use concord_types::{Ballot, Error, Operation, OperationKind, Transaction};
use tracing::{debug, info};

/// Apply one agreed transaction to the account book and block store.
///
/// Everything happens inside a single store transaction: the block
/// transaction record, one block operation and account mutation per
/// operation, and the source withdrawal with its checkpoint rotation.
/// Any failure discards the transaction, so partial state is impossible.
/// A hash that was already externalized fails with [`Error::AlreadySaved`],
/// the benign double-close signal.
pub fn finish_transaction(
    store: &Store,
    ballot: &Ballot,
    tx: &Transaction,
) -> Result<BlockTransaction, Error> {
    let raw_ballot =
        String::from_utf8(ballot.to_json()).map_err(|_| Error::InvalidMessage)?;

    let mut ts = store.begin_transaction();

    let bt = BlockTransaction::from_transaction(tx, raw_ballot);
    if let Err(e) = bt.save(&mut ts) {
        ts.discard();
        return Err(e);
    }

    for (index, op) in tx.body.operations.iter().enumerate() {
        if let Err(e) = finish_operation(&mut ts, tx, op, index) {
            ts.discard();
            return Err(e);
        }
    }

    if let Err(e) = settle_source(&mut ts, tx) {
        ts.discard();
        return Err(e);
    }

    ts.commit().map_err(crate::storage_error)?;

    info!(
        hash = %bt.hash,
        source = %bt.source,
        amount = %bt.amount,
        operations = bt.operations.len(),
        "transaction externalized",
    );
    Ok(bt)
}

/// Apply one operation: mutate the target account and write its record.
fn finish_operation(
    ts: &mut StoreTransaction<'_>,
    tx: &Transaction,
    op: &Operation,
    index: usize,
) -> Result<(), Error> {
    let target = &op.body.target;
    let next_checkpoint = tx.next_target_checkpoint();

    match op.kind {
        OperationKind::CreateAccount => {
            if crate::exists_block_account(&*ts, target)? {
                return Err(Error::BlockAccountAlreadyExists);
            }
            let account = BlockAccount::new(target.clone(), op.body.amount, next_checkpoint);
            account.save(ts)?;
        }
        OperationKind::Payment => {
            let mut account = get_block_account(&*ts, target)?;
            account.deposit(op.body.amount, &next_checkpoint)?;
            account.save(ts)?;
        }
    }

    BlockOperation::from_operation(tx, op, index).save(ts)?;
    debug!(tx_hash = tx.hash(), index, target = %target, "operation applied");
    Ok(())
}

/// Withdraw the total (fees included) from the source and rotate its
/// checkpoint onto this transaction's hash.
fn settle_source(ts: &mut StoreTransaction<'_>, tx: &Transaction) -> Result<(), Error> {
    let mut source = get_block_account(&*ts, tx.source())?;
    source.withdraw(tx.total_amount(true), &tx.next_source_checkpoint())?;
    source.save(ts)
}
