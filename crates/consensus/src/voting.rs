//! Per-candidate-message voting state.

use crate::VotingThresholdPolicy;
use chrono::{DateTime, Utc};
use concord_types::{Address, Ballot, BallotState, Error, Transaction, VotingHole};
use std::collections::HashMap;

/// The outcome of evaluating a voting result against the threshold policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotingStateStaging {
    pub message_hash: String,
    /// The state that was tallied.
    pub state: BallotState,
    /// The winning verdict, or `NotYet` while the state is still open.
    pub voting_hole: VotingHole,
    /// The state to advance to when quorum was reached below the terminal
    /// state.
    pub next_state: Option<BallotState>,
}

impl VotingStateStaging {
    /// Whether this staging advances the result to a new round.
    pub fn is_changed(&self) -> bool {
        self.next_state.is_some()
    }

    /// Whether consensus finished for this message: a quorum of either
    /// verdict at the terminal state.
    pub fn is_closed(&self) -> bool {
        self.state.is_terminal() && self.voting_hole != VotingHole::NotYet
    }

    /// Whether this staging calls for externalization.
    pub fn is_externalizable(&self) -> bool {
        self.state.is_terminal() && self.voting_hole == VotingHole::Yes
    }
}

/// The in-memory vote automaton for one candidate message.
///
/// Votes are keyed by node address and carry the state they were cast in;
/// advancing a round clears them. For any node there is at most one recorded
/// vote per `(message_hash, state)`.
#[derive(Debug, Clone)]
pub struct VotingResult {
    pub message_hash: String,
    /// The full message, once some INIT ballot carried it.
    pub message: Option<Transaction>,
    pub state: BallotState,
    pub started_at: DateTime<Utc>,
    votes: HashMap<String, (BallotState, VotingHole)>,
    /// Snapshot of the validator set this result counts against.
    validators: Vec<Address>,
}

impl VotingResult {
    /// Seed a result from the first ballot seen for a message.
    pub fn from_ballot(ballot: &Ballot, validators: Vec<Address>) -> Self {
        VotingResult {
            message_hash: ballot.message_hash.clone(),
            message: ballot.message.clone(),
            state: ballot.state,
            started_at: Utc::now(),
            votes: HashMap::new(),
            validators,
        }
    }

    /// Seed a result from a client message before any ballot exists.
    pub fn from_message(message: &Transaction, validators: Vec<Address>) -> Self {
        VotingResult {
            message_hash: message.hash().to_string(),
            message: Some(message.clone()),
            state: BallotState::Init,
            started_at: Utc::now(),
            votes: HashMap::new(),
            validators,
        }
    }

    pub fn source(&self) -> Option<&Address> {
        self.message.as_ref().map(|m| m.source())
    }

    pub fn validators(&self) -> &[Address] {
        &self.validators
    }

    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    pub fn has_voted(&self, node: &Address, state: BallotState) -> bool {
        self.votes
            .get(node.as_str())
            .is_some_and(|(s, _)| *s == state)
    }

    /// Record a ballot's vote.
    ///
    /// Fails with [`Error::NewButKnownMessage`] when this exact
    /// `(message_hash, node, state)` was already recorded; a vote at a new
    /// state replaces the node's previous one.
    pub fn record(&mut self, ballot: &Ballot) -> Result<(), Error> {
        if self.has_voted(&ballot.node_key, ballot.state) {
            return Err(Error::NewButKnownMessage);
        }
        // carry the message forward from whichever INIT ballot first has it
        if self.message.is_none() {
            self.message = ballot.message.clone();
        }
        self.votes.insert(
            ballot.node_key.as_str().to_string(),
            (ballot.state, ballot.voting_hole),
        );
        Ok(())
    }

    fn count(&self, state: BallotState, hole: VotingHole) -> usize {
        self.votes
            .values()
            .filter(|(s, h)| *s == state && *h == hole)
            .count()
    }

    /// Tally the current state against `policy`.
    ///
    /// Below the terminal state any YES quorum wins, even when NO also has
    /// one; at `ALL_CONFIRM` the tie breaks the other way and NO dominates.
    pub fn evaluate(&self, policy: &VotingThresholdPolicy) -> VotingStateStaging {
        let mut policy = *policy;
        // count against this result's snapshot, not the live config
        policy
            .set_validators(self.validators.len())
            .expect("voting result always holds validators");
        let threshold = policy.threshold(self.state);

        let yes = self.count(self.state, VotingHole::Yes);
        let no = self.count(self.state, VotingHole::No);

        let winner = if self.state.is_terminal() {
            if no >= threshold {
                Some(VotingHole::No)
            } else if yes >= threshold {
                Some(VotingHole::Yes)
            } else {
                None
            }
        } else if yes >= threshold {
            Some(VotingHole::Yes)
        } else if no >= threshold {
            Some(VotingHole::No)
        } else {
            None
        };

        match winner {
            None => VotingStateStaging {
                message_hash: self.message_hash.clone(),
                state: self.state,
                voting_hole: VotingHole::NotYet,
                next_state: None,
            },
            Some(hole) => VotingStateStaging {
                message_hash: self.message_hash.clone(),
                state: self.state,
                voting_hole: hole,
                next_state: self.state.next(),
            },
        }
    }

    /// Advance to `state`, clearing the votes for the new round.
    pub fn advance(&mut self, state: BallotState) -> Result<(), Error> {
        if state <= self.state {
            return Err(Error::VotingResultFailedToSetState);
        }
        self.state = state;
        self.votes.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_types::test_utils::{test_transaction, TEST_NETWORK_ID};
    use concord_types::{Amount, KeyPair};

    fn policy() -> VotingThresholdPolicy {
        VotingThresholdPolicy::uniform(60).unwrap()
    }

    fn setup(n: usize) -> (Vec<KeyPair>, VotingResult) {
        let keypairs: Vec<KeyPair> = (0..n).map(|_| KeyPair::random()).collect();
        let validators: Vec<Address> = keypairs.iter().map(|kp| kp.address()).collect();
        let source = KeyPair::random();
        let tx = test_transaction(
            &source,
            "u-u",
            &KeyPair::random().address(),
            Amount::new(100),
        );
        let result = VotingResult::from_message(&tx, validators);
        (keypairs, result)
    }

    fn ballot(
        node: &KeyPair,
        hash: &str,
        state: BallotState,
        hole: VotingHole,
    ) -> Ballot {
        let mut b = Ballot::from_hash(node.address(), hash.to_string(), state, hole);
        b.vote_and_sign(node, hole, TEST_NETWORK_ID);
        b
    }

    #[test]
    fn duplicate_vote_for_same_state_is_rejected() {
        let (nodes, mut result) = setup(3);
        let hash = result.message_hash.clone();
        let b = ballot(&nodes[0], &hash, BallotState::Init, VotingHole::Yes);
        result.record(&b).unwrap();
        assert_eq!(result.record(&b).unwrap_err(), Error::NewButKnownMessage);
    }

    #[test]
    fn vote_at_new_state_replaces_previous() {
        let (nodes, mut result) = setup(3);
        let hash = result.message_hash.clone();
        result
            .record(&ballot(&nodes[0], &hash, BallotState::Init, VotingHole::Yes))
            .unwrap();
        result
            .record(&ballot(&nodes[0], &hash, BallotState::Sign, VotingHole::Yes))
            .unwrap();
        assert_eq!(result.vote_count(), 1);
        assert!(result.has_voted(&nodes[0].address(), BallotState::Sign));
        assert!(!result.has_voted(&nodes[0].address(), BallotState::Init));
    }

    #[test]
    fn open_until_quorum_then_advances() {
        let (nodes, mut result) = setup(3);
        let hash = result.message_hash.clone();

        result
            .record(&ballot(&nodes[0], &hash, BallotState::Init, VotingHole::Yes))
            .unwrap();
        let staging = result.evaluate(&policy());
        assert_eq!(staging.voting_hole, VotingHole::NotYet);
        assert!(!staging.is_changed());
        assert!(!staging.is_closed());

        result
            .record(&ballot(&nodes[1], &hash, BallotState::Init, VotingHole::Yes))
            .unwrap();
        let staging = result.evaluate(&policy());
        assert_eq!(staging.voting_hole, VotingHole::Yes);
        assert_eq!(staging.next_state, Some(BallotState::Sign));
        assert!(staging.is_changed());
        assert!(!staging.is_closed());
    }

    #[test]
    fn advance_clears_votes_and_rejects_regression() {
        let (nodes, mut result) = setup(3);
        let hash = result.message_hash.clone();
        result
            .record(&ballot(&nodes[0], &hash, BallotState::Init, VotingHole::Yes))
            .unwrap();
        result.advance(BallotState::Sign).unwrap();
        assert_eq!(result.vote_count(), 0);
        assert_eq!(
            result.advance(BallotState::Init).unwrap_err(),
            Error::VotingResultFailedToSetState
        );
    }

    #[test]
    fn terminal_yes_quorum_externalizes() {
        let (nodes, mut result) = setup(3);
        let hash = result.message_hash.clone();
        result.advance(BallotState::AllConfirm).unwrap();
        for node in &nodes[..2] {
            result
                .record(&ballot(node, &hash, BallotState::AllConfirm, VotingHole::Yes))
                .unwrap();
        }
        let staging = result.evaluate(&policy());
        assert!(staging.is_closed());
        assert!(staging.is_externalizable());
        assert_eq!(staging.next_state, None);
    }

    #[test]
    fn no_dominates_only_at_terminal_state() {
        // 2-of-2 thresholds make simultaneous YES/NO quorum impossible, so
        // use a policy where both can reach quorum: 50% over 4 validators.
        let mut policy = VotingThresholdPolicy::uniform(50).unwrap();
        policy.set_validators(4).unwrap();

        let (nodes, mut result) = setup(4);
        let hash = result.message_hash.clone();

        // non-terminal: YES and NO both reach 2 votes; YES wins
        for (i, node) in nodes.iter().enumerate() {
            let hole = if i % 2 == 0 { VotingHole::Yes } else { VotingHole::No };
            result
                .record(&ballot(node, &hash, BallotState::Init, hole))
                .unwrap();
        }
        let staging = result.evaluate(&policy);
        assert_eq!(staging.voting_hole, VotingHole::Yes);
        assert_eq!(staging.next_state, Some(BallotState::Sign));

        // terminal: the same split lets NO dominate
        result.advance(BallotState::AllConfirm).unwrap();
        for (i, node) in nodes.iter().enumerate() {
            let hole = if i % 2 == 0 { VotingHole::Yes } else { VotingHole::No };
            result
                .record(&ballot(node, &hash, BallotState::AllConfirm, hole))
                .unwrap();
        }
        let staging = result.evaluate(&policy);
        assert_eq!(staging.voting_hole, VotingHole::No);
        assert!(staging.is_closed());
        assert!(!staging.is_externalizable());
    }
}
