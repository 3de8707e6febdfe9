//! The ballot box: voting results keyed by message hash.

use crate::{VotingResult, VotingStateStaging, VotingThresholdPolicy};
use concord_types::{Address, Ballot, Error, Transaction};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// The FBA agreement core of one node.
///
/// Owns every in-flight [`VotingResult`]. The box performs no I/O and is
/// driven exclusively by the node runner's single dispatch task; operations
/// are constant-time amortized over the number of in-flight messages.
///
/// Closed message hashes stay remembered: a straggling terminal ballot for
/// an already-closed message must not reopen a voting result, or peers
/// would bounce terminal ballots between each other indefinitely.
pub struct Isaac {
    policy: VotingThresholdPolicy,
    validators: Vec<Address>,
    boxes: HashMap<String, VotingResult>,
    closed: HashSet<String>,
}

impl Isaac {
    pub fn new(policy: VotingThresholdPolicy, validators: Vec<Address>) -> Result<Self, Error> {
        let mut policy = policy;
        policy.set_validators(validators.len())?;
        Ok(Isaac {
            policy,
            validators,
            boxes: HashMap::new(),
            closed: HashSet::new(),
        })
    }

    pub fn policy(&self) -> &VotingThresholdPolicy {
        &self.policy
    }

    pub fn has_message_by_hash(&self, message_hash: &str) -> bool {
        self.boxes.contains_key(message_hash)
    }

    /// Whether any in-flight message spends from `source`.
    pub fn has_message_by_source(&self, source: &Address) -> bool {
        self.boxes
            .values()
            .any(|result| result.source() == Some(source))
    }

    pub fn result(&self, message_hash: &str) -> Option<&VotingResult> {
        self.boxes.get(message_hash)
    }

    /// Open a voting result for a client-submitted message.
    pub fn receive_message(&mut self, message: &Transaction) -> Result<(), Error> {
        if self.boxes.contains_key(message.hash()) || self.closed.contains(message.hash()) {
            return Err(Error::VotingResultAlreadyExists);
        }
        let result = VotingResult::from_message(message, self.validators.clone());
        debug!(message_hash = message.hash(), "voting result opened");
        self.boxes.insert(message.hash().to_string(), result);
        Ok(())
    }

    /// Record a ballot, opening a voting result if this is the first sight
    /// of its message. Ballots for closed messages are known, not new.
    pub fn receive_ballot(&mut self, ballot: &Ballot) -> Result<(), Error> {
        if self.closed.contains(&ballot.message_hash) {
            return Err(Error::NewButKnownMessage);
        }
        let result = self
            .boxes
            .entry(ballot.message_hash.clone())
            .or_insert_with(|| VotingResult::from_ballot(ballot, self.validators.clone()));
        result.record(ballot)
    }

    /// Tally the current round for a message.
    pub fn evaluate(&self, message_hash: &str) -> Result<VotingStateStaging, Error> {
        let result = self
            .boxes
            .get(message_hash)
            .ok_or(Error::VotingResultNotFound)?;
        Ok(result.evaluate(&self.policy))
    }

    /// Apply a staging that advances the round.
    pub fn advance(&mut self, staging: &VotingStateStaging) -> Result<(), Error> {
        let Some(next) = staging.next_state else {
            return Err(Error::VotingResultFailedToSetState);
        };
        let result = self
            .boxes
            .get_mut(&staging.message_hash)
            .ok_or(Error::VotingResultNotFound)?;
        result.advance(next)?;
        debug!(
            message_hash = %staging.message_hash,
            state = next.name(),
            "voting result advanced",
        );
        Ok(())
    }

    /// The message carried by a result, if any INIT ballot supplied it.
    pub fn message_of(&self, message_hash: &str) -> Option<&Transaction> {
        self.boxes.get(message_hash).and_then(|r| r.message.as_ref())
    }

    /// Drop the voting result for a message and remember it as closed.
    /// Idempotent: closing a hash not in the box is a no-op.
    pub fn close_consensus(&mut self, message_hash: &str) {
        if self.boxes.remove(message_hash).is_some() {
            debug!(message_hash, "consensus closed");
        }
        self.closed.insert(message_hash.to_string());
    }

    pub fn in_flight(&self) -> usize {
        self.boxes.len()
    }
}
