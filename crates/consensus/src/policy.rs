//! Quorum thresholds per protocol state.

use concord_types::{BallotState, Error};

/// Threshold percentages over a validator count, one per protocol state.
///
/// A state reaches quorum when `ceil(validators * percent / 100)` matching
/// votes (the node's own included) are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotingThresholdPolicy {
    init: u32,
    sign: u32,
    accept: u32,
    all_confirm: u32,
    validators: usize,
}

impl VotingThresholdPolicy {
    /// Build a policy from per-state percentages. Each must be in `1..=100`.
    pub fn new(init: u32, sign: u32, accept: u32, all_confirm: u32) -> Result<Self, Error> {
        for percent in [init, sign, accept, all_confirm] {
            if percent == 0 || percent > 100 {
                return Err(Error::InvalidVotingThresholdPolicy);
            }
        }
        Ok(VotingThresholdPolicy {
            init,
            sign,
            accept,
            all_confirm,
            validators: 0,
        })
    }

    /// A single percentage applied to every state.
    pub fn uniform(percent: u32) -> Result<Self, Error> {
        Self::new(percent, percent, percent, percent)
    }

    /// Fix the number of known validators this policy counts against.
    pub fn set_validators(&mut self, validators: usize) -> Result<(), Error> {
        if validators == 0 {
            return Err(Error::VotingThresholdInvalidValidators);
        }
        self.validators = validators;
        Ok(())
    }

    pub fn validators(&self) -> usize {
        self.validators
    }

    pub fn percent(&self, state: BallotState) -> u32 {
        match state {
            BallotState::Init => self.init,
            BallotState::Sign => self.sign,
            BallotState::Accept => self.accept,
            BallotState::AllConfirm => self.all_confirm,
        }
    }

    /// Number of matching votes required to close `state`.
    pub fn threshold(&self, state: BallotState) -> usize {
        let validators = self.validators as u64;
        let percent = self.percent(state) as u64;
        // ceil(validators * percent / 100)
        ((validators * percent).div_ceil(100)) as usize
    }
}
