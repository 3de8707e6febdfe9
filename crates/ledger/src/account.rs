//! The per-address account book.

use crate::storage_error;
use concord_store::{StoreError, StoreOps};
use concord_types::{Address, Amount, Error};
use serde::{Deserialize, Serialize};

pub const BLOCK_ACCOUNT_PREFIX: &str = "account:";

/// Balance and checkpoint of one address.
///
/// Every checkpoint rotation goes through [`withdraw`] or [`deposit`];
/// direct mutation is forbidden so the checkpoint chain stays linear.
///
/// [`withdraw`]: BlockAccount::withdraw
/// [`deposit`]: BlockAccount::deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAccount {
    pub address: Address,
    balance: Amount,
    checkpoint: String,
}

impl BlockAccount {
    pub fn new(address: Address, balance: Amount, checkpoint: String) -> Self {
        BlockAccount {
            address,
            balance,
            checkpoint,
        }
    }

    pub fn storage_key(address: &Address) -> String {
        format!("{}{}", BLOCK_ACCOUNT_PREFIX, address)
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn checkpoint(&self) -> &str {
        &self.checkpoint
    }

    /// Persist this account: create on first save, update after.
    pub fn save<S: StoreOps>(&self, store: &mut S) -> Result<(), Error> {
        let key = Self::storage_key(&self.address);
        let exists = store.has(&key).map_err(storage_error)?;
        if exists {
            store.set(&key, self).map_err(storage_error)
        } else {
            store.new(&key, self).map_err(storage_error)
        }
    }

    /// Deduct `amount` and rotate to `next_checkpoint`, in memory.
    /// Persistence is the caller's `save`.
    pub fn withdraw(&mut self, amount: Amount, next_checkpoint: &str) -> Result<(), Error> {
        self.balance = self.balance.sub(amount)?;
        self.checkpoint = next_checkpoint.to_string();
        Ok(())
    }

    /// Add `amount` and rotate to `next_checkpoint`, in memory.
    pub fn deposit(&mut self, amount: Amount, next_checkpoint: &str) -> Result<(), Error> {
        self.balance = self.balance.add(amount)?;
        self.checkpoint = next_checkpoint.to_string();
        Ok(())
    }
}

/// Load an account, failing with [`Error::BlockAccountDoesNotExists`] when
/// the address has never been funded.
pub fn get_block_account<S: StoreOps>(store: &S, address: &Address) -> Result<BlockAccount, Error> {
    match store.get(&BlockAccount::storage_key(address)) {
        Ok(account) => Ok(account),
        Err(StoreError::NotFound(_)) => Err(Error::BlockAccountDoesNotExists),
        Err(e) => Err(storage_error(e)),
    }
}

pub fn exists_block_account<S: StoreOps>(store: &S, address: &Address) -> Result<bool, Error> {
    store
        .has(&BlockAccount::storage_key(address))
        .map_err(storage_error)
}
