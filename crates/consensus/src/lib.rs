//! Checker pipelines and the FBA voting core.
//!
//! This crate is the agreement layer of the node, implemented as a
//! synchronous, I/O-free state machine plus a generic validation pipeline:
//!
//! - [`Checker`]: an ordered list of named stages over a caller-owned
//!   context, with a defer hook and a typed early-stop signal
//! - [`VotingThresholdPolicy`]: per-state quorum thresholds over a static
//!   validator set
//! - [`VotingResult`]: the per-candidate-message vote automaton
//! - [`Isaac`]: the ballot box mapping message hashes to voting results
//!
//! All I/O (networking, persistence, observers) lives with the node
//! runner, which drives this crate through the pipelines.

mod checker;
mod isaac;
mod policy;
mod voting;

pub use checker::{Checker, DeferFn, RunOutcome, Stage, StageOutcome, StageResult};
pub use isaac::Isaac;
pub use policy::VotingThresholdPolicy;
pub use voting::{VotingResult, VotingStateStaging};
