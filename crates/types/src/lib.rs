//! Core types for the Concord FBA ledger.
//!
//! This crate provides the foundational types used throughout the node
//! implementation:
//!
//! - **Primitives**: Amount, Address, Checkpoint, canonical object hashing
//! - **Crypto**: Ed25519 keypairs and base58 text encodings
//! - **Messages**: Transaction, Operation, Ballot
//! - **Errors**: the stable-coded protocol error set
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer. Messages are
//! passive data: hashing and signing live here, but no I/O does.

mod amount;
mod ballot;
mod checkpoint;
mod crypto;
mod error;
mod hash;
mod operation;
mod transaction;

pub use amount::{Amount, BASE_FEE, MAXIMUM_SUPPLY};
pub use ballot::{Ballot, BallotState, VotingHole};
pub use checkpoint::{same_origin, Checkpoint};
pub use crypto::{Address, KeyPair};
pub use error::Error;
pub use hash::{hash_string, object_hash, object_hash_string};
pub use operation::{Operation, OperationBody, OperationKind};
pub use transaction::{
    signing_payload, Transaction, TransactionBody, TransactionHeader, TRANSACTION_VERSION,
};

/// Current ISO 8601 timestamp, used for `created` and `saved_at` fields.
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;

    /// Network id shared by unit tests.
    pub const TEST_NETWORK_ID: &[u8] = b"concord-test-network";

    /// Create a signed payment transaction from `keypair` over one target.
    pub fn test_transaction(
        keypair: &KeyPair,
        checkpoint: &str,
        target: &Address,
        amount: Amount,
    ) -> Transaction {
        let op = Operation::payment(target.clone(), amount);
        let mut tx = Transaction::new(keypair.address(), checkpoint.to_string(), vec![op])
            .expect("one operation is always well formed");
        tx.sign(keypair, TEST_NETWORK_ID);
        tx
    }
}
