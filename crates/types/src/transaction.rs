//! Signed client transactions.

use crate::{
    now_iso8601, object_hash_string, same_origin, Address, Amount, Checkpoint, Error, KeyPair,
    Operation, BASE_FEE,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const TRANSACTION_VERSION: &str = "1";

/// Header of a signed transaction. `hash` is the canonical digest of the
/// body; `signature` covers `network_id || hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHeader {
    pub version: String,
    pub created: String,
    pub hash: String,
    pub signature: String,
}

/// The hashed portion of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBody {
    pub source: Address,
    pub fee: Amount,
    pub checkpoint: String,
    pub operations: Vec<Operation>,
}

impl TransactionBody {
    /// Canonical base58 digest of this body.
    pub fn hash_string(&self) -> String {
        object_hash_string(self)
    }
}

/// A signed client transaction binding operations to a source account's
/// checkpoint chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "type", default = "transaction_type")]
    pub kind: String,
    pub header: TransactionHeader,
    pub body: TransactionBody,
}

fn transaction_type() -> String {
    "transaction".to_string()
}

/// The byte sequence a message signature covers.
pub fn signing_payload(network_id: &[u8], hash: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(network_id.len() + hash.len());
    payload.extend_from_slice(network_id);
    payload.extend_from_slice(hash.as_bytes());
    payload
}

impl Transaction {
    /// Build an unsigned transaction with the base fee.
    pub fn new(
        source: Address,
        checkpoint: String,
        operations: Vec<Operation>,
    ) -> Result<Self, Error> {
        if operations.is_empty() {
            return Err(Error::TransactionEmptyOperations);
        }

        let body = TransactionBody {
            source,
            fee: BASE_FEE,
            checkpoint,
            operations,
        };
        let hash = body.hash_string();

        Ok(Transaction {
            kind: transaction_type(),
            header: TransactionHeader {
                version: TRANSACTION_VERSION.to_string(),
                created: now_iso8601(),
                hash,
                signature: String::new(),
            },
            body,
        })
    }

    pub fn from_json(data: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(data).map_err(|_| Error::InvalidMessage)
    }

    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("transaction should be encodable")
    }

    pub fn hash(&self) -> &str {
        &self.header.hash
    }

    pub fn source(&self) -> &Address {
        &self.body.source
    }

    /// Recompute the body hash and sign it under `network_id`.
    pub fn sign(&mut self, keypair: &KeyPair, network_id: &[u8]) {
        self.header.hash = self.body.hash_string();
        self.header.signature = keypair.sign(&signing_payload(network_id, &self.header.hash));
    }

    pub fn verify_signature(&self, network_id: &[u8]) -> Result<(), Error> {
        self.body.source.verify(
            &signing_payload(network_id, &self.header.hash),
            &self.header.signature,
        )
    }

    /// Structural validity of a received transaction.
    ///
    /// Checks, in order: checkpoint shape, fee floor, operation set (present,
    /// well-formed, no duplicated targets), total within supply, signature,
    /// and the hash/body binding.
    pub fn is_well_formed(&self, network_id: &[u8]) -> Result<(), Error> {
        Checkpoint::parse(&self.body.checkpoint).or_else(|_| {
            // initial checkpoints are opaque agreed strings; only reject
            // the empty one
            if self.body.checkpoint.is_empty() {
                Err(Error::TransactionInvalidCheckpoint)
            } else {
                Ok(Checkpoint {
                    subtracted: self.body.checkpoint.clone(),
                    added: self.body.checkpoint.clone(),
                })
            }
        })?;

        if self.body.fee < BASE_FEE {
            return Err(Error::InvalidFee);
        }
        if self.body.operations.is_empty() {
            return Err(Error::TransactionEmptyOperations);
        }

        let mut targets = HashSet::new();
        let mut total = Amount::ZERO;
        for op in &self.body.operations {
            op.is_well_formed()?;
            if !targets.insert(op.body.target.as_str()) {
                return Err(Error::DuplicatedOperation);
            }
            total = total.add(op.body.amount)?;
        }
        // fees must fit under the supply cap too, so must_* stays safe later
        total.add(self.body.fee.mult(self.body.operations.len())?)?;

        self.verify_signature(network_id)?;

        if self.header.hash != self.body.hash_string() {
            return Err(Error::HashDoesNotMatch);
        }

        Ok(())
    }

    /// Whether this transaction may spend from an account currently at
    /// `checkpoint`.
    pub fn is_valid_checkpoint(&self, checkpoint: &str) -> bool {
        same_origin(&self.body.checkpoint, checkpoint)
    }

    /// The total monetary value of this transaction: the sum of its
    /// operations, optionally with per-operation fees.
    ///
    /// Uses panicking arithmetic; well-formedness has already bounded the sum.
    pub fn total_amount(&self, with_fee: bool) -> Amount {
        let mut amount: Amount = self
            .body
            .operations
            .iter()
            .map(|op| op.body.amount)
            .sum();

        if with_fee {
            amount = amount.must_add(self.body.fee.must_mult(self.body.operations.len()));
        }

        amount
    }

    /// The source account's checkpoint after this transaction externalizes.
    pub fn next_source_checkpoint(&self) -> String {
        Checkpoint::compose(self.hash(), self.hash())
    }

    /// A target account's checkpoint after this transaction deposits into it.
    pub fn next_target_checkpoint(&self) -> String {
        let subtracted = match Checkpoint::parse(&self.body.checkpoint) {
            Ok(cp) => cp.subtracted,
            Err(_) => self.body.checkpoint.clone(),
        };
        Checkpoint::compose(&subtracted, self.hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_transaction, TEST_NETWORK_ID};

    fn two_keypairs() -> (KeyPair, KeyPair) {
        (KeyPair::random(), KeyPair::random())
    }

    #[test]
    fn empty_operations_are_rejected() {
        let kp = KeyPair::random();
        assert_eq!(
            Transaction::new(kp.address(), "u-u".into(), vec![]).unwrap_err(),
            Error::TransactionEmptyOperations
        );
    }

    #[test]
    fn signed_transaction_is_well_formed() {
        let (kp, target) = two_keypairs();
        let tx = test_transaction(&kp, "u-u", &target.address(), Amount::new(100));
        assert!(tx.is_well_formed(TEST_NETWORK_ID).is_ok());
    }

    #[test]
    fn json_round_trip_preserves_hash() {
        let (kp, target) = two_keypairs();
        let tx = test_transaction(&kp, "u-u", &target.address(), Amount::new(100));
        let parsed = Transaction::from_json(&tx.to_json()).unwrap();
        assert_eq!(parsed.body.hash_string(), tx.header.hash);
        assert!(parsed.is_well_formed(TEST_NETWORK_ID).is_ok());
    }

    #[test]
    fn tampered_body_fails_hash_check() {
        let (kp, target) = two_keypairs();
        let mut tx = test_transaction(&kp, "u-u", &target.address(), Amount::new(100));
        tx.body.fee = Amount::new(20_000);
        assert!(matches!(
            tx.is_well_formed(TEST_NETWORK_ID),
            Err(Error::SignatureVerificationFailed) | Err(Error::HashDoesNotMatch)
        ));
    }

    #[test]
    fn wrong_network_id_fails_signature() {
        let (kp, target) = two_keypairs();
        let tx = test_transaction(&kp, "u-u", &target.address(), Amount::new(100));
        assert_eq!(
            tx.is_well_formed(b"another-network"),
            Err(Error::SignatureVerificationFailed)
        );
    }

    #[test]
    fn duplicated_targets_are_rejected() {
        let (kp, target) = two_keypairs();
        let target = target.address();
        let ops = vec![
            Operation::payment(target.clone(), Amount::new(10)),
            Operation::payment(target.clone(), Amount::new(20)),
        ];
        let mut tx = Transaction::new(kp.address(), "u-u".into(), ops).unwrap();
        tx.sign(&kp, TEST_NETWORK_ID);
        assert_eq!(
            tx.is_well_formed(TEST_NETWORK_ID),
            Err(Error::DuplicatedOperation)
        );
    }

    #[test]
    fn low_fee_is_rejected() {
        let (kp, target) = two_keypairs();
        let mut tx = test_transaction(&kp, "u-u", &target.address(), Amount::new(100));
        tx.body.fee = Amount::new(1);
        tx.sign(&kp, TEST_NETWORK_ID);
        assert_eq!(tx.is_well_formed(TEST_NETWORK_ID), Err(Error::InvalidFee));
    }

    #[test]
    fn total_amount_with_and_without_fee() {
        let (kp, target) = two_keypairs();
        let tx = test_transaction(&kp, "u-u", &target.address(), Amount::new(100));
        assert_eq!(tx.total_amount(false), Amount::new(100));
        assert_eq!(tx.total_amount(true), Amount::new(100).must_add(BASE_FEE));
    }

    #[test]
    fn checkpoint_rotation_chains_on_hash() {
        let (kp, target) = two_keypairs();
        let tx = test_transaction(&kp, "u-u", &target.address(), Amount::new(100));
        assert_eq!(
            tx.next_source_checkpoint(),
            Checkpoint::compose(tx.hash(), tx.hash())
        );
        assert_eq!(
            tx.next_target_checkpoint(),
            Checkpoint::compose("u", tx.hash())
        );
        assert!(tx.is_valid_checkpoint("u-u"));
        assert!(!tx.is_valid_checkpoint(&Checkpoint::compose("x", "y")));
    }

    #[test]
    fn uuid_initial_checkpoint_is_well_formed() {
        let (kp, target) = two_keypairs();
        let checkpoint = uuid::Uuid::new_v4().to_string();
        let tx = test_transaction(&kp, &checkpoint, &target.address(), Amount::new(1));
        assert!(tx.is_well_formed(TEST_NETWORK_ID).is_ok());
        assert!(tx.is_valid_checkpoint(&checkpoint));
    }
}
