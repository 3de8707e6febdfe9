//! Account book and block records.
//!
//! Persistent state of the ledger, all JSON values under prefixed keys:
//!
//! ```text
//! account:<address>                     -> BlockAccount
//! bt:<tx_hash>                          -> BlockTransaction
//! bt-source:<address>:<saved_at>:<hash> -> empty (per-account index)
//! bo:<tx_hash>:<op_index>               -> BlockOperation
//! bth:<tx_hash>                         -> BlockTransactionHistory
//! ```
//!
//! Records mutate only through their typed methods, and balance changes only
//! inside a store transaction during externalization.

mod account;
mod block_operation;
mod block_transaction;
mod externalize;
mod history;

pub use account::{exists_block_account, get_block_account, BlockAccount, BLOCK_ACCOUNT_PREFIX};
pub use block_operation::{
    get_block_operation, get_block_operations, BlockOperation, BLOCK_OPERATION_PREFIX,
};
pub use block_transaction::{
    exists_block_transaction, get_block_transaction, get_block_transactions,
    get_block_transactions_by_source, BlockTransaction, BLOCK_TRANSACTION_PREFIX,
    BLOCK_TRANSACTION_SOURCE_PREFIX,
};
pub use externalize::finish_transaction;
pub use history::{
    exists_block_transaction_history, get_block_transaction_history, BlockTransactionHistory,
    BLOCK_TRANSACTION_HISTORY_PREFIX,
};

use concord_store::StoreError;
use concord_types::Error;

/// Map a storage failure into the protocol error space.
///
/// Callers that need a context-specific meaning (`AlreadySaved`, a missing
/// account) match on [`StoreError`] themselves before falling back to this.
pub(crate) fn storage_error(e: StoreError) -> Error {
    match e {
        StoreError::NotFound(_) => Error::StorageRecordDoesNotExist,
        StoreError::AlreadyExists(_) => Error::BlockAlreadyExists,
        StoreError::Io(m) => Error::InvalidState(m),
        StoreError::Codec(m) => Error::InvalidState(m.to_string()),
    }
}
