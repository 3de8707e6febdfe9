//! Ledger operations: value transfers and account creation.

use crate::{object_hash_string, Address, Amount, Error};
use serde::{Deserialize, Serialize};

/// The kind of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    #[serde(rename = "create-account")]
    CreateAccount,
    #[serde(rename = "payment")]
    Payment,
}

/// The operation payload. Both kinds move `amount` to `target`; the kind
/// decides whether the target account must or must not already exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationBody {
    pub target: Address,
    pub amount: Amount,
}

/// One operation inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub body: OperationBody,
}

impl Operation {
    pub fn payment(target: Address, amount: Amount) -> Self {
        Operation {
            kind: OperationKind::Payment,
            body: OperationBody { target, amount },
        }
    }

    pub fn create_account(target: Address, amount: Amount) -> Self {
        Operation {
            kind: OperationKind::CreateAccount,
            body: OperationBody { target, amount },
        }
    }

    /// Canonical hash of this operation, used to key block-operation records.
    pub fn hash_string(&self) -> String {
        object_hash_string(self)
    }

    /// Structural validity: a positive amount and a parseable target.
    ///
    /// The target is already validated by the [`Address`] type; the check is
    /// kept so operations built in process fail the same way as parsed ones.
    pub fn is_well_formed(&self) -> Result<(), Error> {
        if self.body.amount.is_zero() {
            return Err(Error::InvalidOperation);
        }
        Address::parse(self.body.target.as_str()).map_err(|_| Error::InvalidOperation)?;
        Ok(())
    }
}
