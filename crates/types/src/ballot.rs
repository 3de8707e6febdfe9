//! Validator ballots: one node's signed assertion about one candidate
//! transaction at one protocol state.

use crate::{object_hash_string, signing_payload, Address, Error, KeyPair, Transaction};
use serde::{Deserialize, Serialize};

/// Protocol states a candidate message moves through.
///
/// Ordering is meaningful: states only ever advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BallotState {
    #[serde(rename = "INIT")]
    Init,
    #[serde(rename = "SIGN")]
    Sign,
    #[serde(rename = "ACCEPT")]
    Accept,
    #[serde(rename = "ALL_CONFIRM")]
    AllConfirm,
}

impl BallotState {
    /// The state after this one, if any.
    pub fn next(self) -> Option<BallotState> {
        match self {
            BallotState::Init => Some(BallotState::Sign),
            BallotState::Sign => Some(BallotState::Accept),
            BallotState::Accept => Some(BallotState::AllConfirm),
            BallotState::AllConfirm => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == BallotState::AllConfirm
    }

    pub fn name(self) -> &'static str {
        match self {
            BallotState::Init => "INIT",
            BallotState::Sign => "SIGN",
            BallotState::Accept => "ACCEPT",
            BallotState::AllConfirm => "ALL_CONFIRM",
        }
    }
}

/// A validator's verdict on the candidate message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VotingHole {
    #[serde(rename = "YES")]
    Yes,
    #[serde(rename = "NO")]
    No,
    #[serde(rename = "NOT_YET")]
    NotYet,
}

/// The hashed portion of a ballot. The message itself is bound through its
/// hash, so the signature covers network id, message, state and verdict.
#[derive(Serialize)]
struct BallotSigningBody<'a> {
    node_key: &'a Address,
    message_hash: &'a str,
    state: BallotState,
    voting_hole: VotingHole,
}

/// A signed assertion by `node_key` about the message `message_hash`.
///
/// `INIT` ballots carry the full message so peers can learn it; every later
/// state carries only the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    #[serde(rename = "type", default = "ballot_type")]
    pub kind: String,
    pub node_key: Address,
    pub message_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Transaction>,
    pub state: BallotState,
    pub voting_hole: VotingHole,
    pub hash: String,
    pub signature: String,
}

fn ballot_type() -> String {
    "ballot".to_string()
}

impl Ballot {
    /// Create an unsigned `INIT` ballot carrying the full message.
    pub fn from_message(node_key: Address, message: Transaction) -> Self {
        Ballot {
            kind: ballot_type(),
            node_key,
            message_hash: message.hash().to_string(),
            message: Some(message),
            state: BallotState::Init,
            voting_hole: VotingHole::NotYet,
            hash: String::new(),
            signature: String::new(),
        }
    }

    /// Create an unsigned follow-up ballot carrying only the message hash.
    pub fn from_hash(
        node_key: Address,
        message_hash: String,
        state: BallotState,
        voting_hole: VotingHole,
    ) -> Self {
        Ballot {
            kind: ballot_type(),
            node_key,
            message_hash,
            message: None,
            state,
            voting_hole,
            hash: String::new(),
            signature: String::new(),
        }
    }

    pub fn from_json(data: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(data).map_err(|_| Error::InvalidMessage)
    }

    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("ballot should be encodable")
    }

    fn hash_string(&self) -> String {
        object_hash_string(&BallotSigningBody {
            node_key: &self.node_key,
            message_hash: &self.message_hash,
            state: self.state,
            voting_hole: self.voting_hole,
        })
    }

    /// Set the voting hole, recompute the hash and sign under `network_id`.
    pub fn vote_and_sign(&mut self, keypair: &KeyPair, voting_hole: VotingHole, network_id: &[u8]) {
        self.voting_hole = voting_hole;
        self.hash = self.hash_string();
        self.signature = keypair.sign(&signing_payload(network_id, &self.hash));
    }

    pub fn verify_signature(&self, network_id: &[u8]) -> Result<(), Error> {
        self.node_key
            .verify(&signing_payload(network_id, &self.hash), &self.signature)
    }

    /// Structural validity of a received ballot.
    pub fn is_well_formed(&self, network_id: &[u8]) -> Result<(), Error> {
        if self.message_hash.is_empty() {
            return Err(Error::InvalidHash);
        }
        match (self.state, &self.message) {
            (BallotState::Init, None) => return Err(Error::BallotEmptyMessage),
            (BallotState::Init, Some(message)) => {
                message.is_well_formed(network_id)?;
                if message.hash() != self.message_hash {
                    return Err(Error::HashDoesNotMatch);
                }
            }
            (_, Some(_)) => return Err(Error::BallotHasMessage),
            (_, None) => {}
        }

        if self.hash != self.hash_string() {
            return Err(Error::HashDoesNotMatch);
        }
        self.verify_signature(network_id)?;

        Ok(())
    }
}
