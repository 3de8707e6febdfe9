//! Pipeline for ballots from peer validators.

use super::PipelineDeps;
use crate::MessageKind;
use concord_consensus::{Checker, Isaac, Stage, StageOutcome, StageResult, VotingStateStaging};
use concord_ledger::{
    exists_block_account, exists_block_transaction_history, finish_transaction, get_block_account,
    BlockTransactionHistory,
};
use concord_types::{Ballot, BallotState, Error, OperationKind, Transaction, VotingHole};
use std::sync::Arc;
use tracing::debug;

/// Context threaded through the ballot stages.
pub(crate) struct BallotContext<'a> {
    pub deps: PipelineDeps,
    pub isaac: &'a mut Isaac,
    pub data: Vec<u8>,
    pub ballot: Option<Ballot>,
    /// First sight of this message hash.
    pub is_new: bool,
    /// The tally after recording this ballot.
    pub staging: Option<VotingStateStaging>,
    /// The state this node will vote at in response, if any.
    pub broadcast_state: Option<BallotState>,
    /// This node's verdict for its own ballot.
    pub voting_hole: VotingHole,
}

impl<'a> BallotContext<'a> {
    pub fn new(deps: PipelineDeps, isaac: &'a mut Isaac, data: Vec<u8>) -> Self {
        BallotContext {
            deps,
            isaac,
            data,
            ballot: None,
            is_new: false,
            staging: None,
            broadcast_state: None,
            voting_hole: VotingHole::NotYet,
        }
    }

    fn ballot(&self) -> Result<&Ballot, Error> {
        self.ballot
            .as_ref()
            .ok_or_else(|| Error::InvalidState("ballot not yet unmarshaled".to_string()))
    }
}

/// The ordered stages a peer ballot traverses.
pub(crate) fn ballot_checker<'a>() -> Checker<BallotContext<'a>> {
    Checker::new(
        "ballot",
        vec![
            Stage { name: "is-wellformed", func: check_is_wellformed },
            Stage { name: "from-known-validators", func: check_from_known_validators },
            Stage { name: "is-new", func: check_is_new },
            Stage { name: "receive-ballot", func: check_receive_ballot },
            Stage { name: "history", func: check_history },
            Stage { name: "store", func: check_store },
            Stage { name: "is-broadcastable", func: check_is_broadcastable },
            Stage { name: "voting-hole", func: check_voting_hole },
            Stage { name: "broadcast", func: check_broadcast },
        ],
    )
}

/// Parse and structurally validate. Malformed ballots are a clean drop,
/// not a fault: any peer can send garbage.
fn check_is_wellformed(ctx: &mut BallotContext<'_>) -> StageResult {
    let ballot = match Ballot::from_json(&ctx.data) {
        Ok(ballot) => ballot,
        Err(_) => return Ok(StageOutcome::Stop("failed to parse ballot".to_string())),
    };
    if let Err(e) = ballot.is_well_formed(&ctx.deps.network_id) {
        return Ok(StageOutcome::Stop(format!("malformed ballot: {e}")));
    }
    ctx.ballot = Some(ballot);
    Ok(StageOutcome::Continue)
}

/// Only configured validators get a say.
fn check_from_known_validators(ctx: &mut BallotContext<'_>) -> StageResult {
    let ballot = ctx.ballot()?;
    let node_key = &ballot.node_key;
    if node_key == ctx.deps.local_node.address() {
        return Ok(StageOutcome::Stop("ballot from ourselves".to_string()));
    }
    if !ctx.deps.local_node.has_validator(node_key) {
        return Ok(StageOutcome::Stop("ballot from unknown validator".to_string()));
    }
    Ok(StageOutcome::Continue)
}

/// Remember whether this is the first sight of the message hash; the first
/// sight obliges this node to cast its own opening vote.
fn check_is_new(ctx: &mut BallotContext<'_>) -> StageResult {
    let hash = ctx.ballot()?.message_hash.clone();
    ctx.is_new = !ctx.isaac.has_message_by_hash(&hash);
    Ok(StageOutcome::Continue)
}

/// Record the vote and tally the round, advancing it on quorum.
fn check_receive_ballot(ctx: &mut BallotContext<'_>) -> StageResult {
    let ballot = ctx.ballot()?.clone();
    match ctx.isaac.receive_ballot(&ballot) {
        Ok(()) => {}
        Err(Error::NewButKnownMessage) => {
            return Ok(StageOutcome::Stop("received new, but known ballot".to_string()));
        }
        Err(e) => return Err(e),
    }

    let staging = ctx.isaac.evaluate(&ballot.message_hash)?;
    if staging.is_changed() && !staging.is_closed() {
        ctx.isaac.advance(&staging)?;
    }
    ctx.staging = Some(staging);
    Ok(StageOutcome::Continue)
}

/// INIT ballots carry the message; leave the history breadcrumb for it.
fn check_history(ctx: &mut BallotContext<'_>) -> StageResult {
    let Some(message) = ctx.ballot()?.message.clone() else {
        return Ok(StageOutcome::Continue);
    };
    if exists_block_transaction_history(&ctx.deps.store, message.hash())? {
        return Ok(StageOutcome::Continue);
    }
    BlockTransactionHistory::from_transaction(&message).save(&mut ctx.deps.store)?;
    Ok(StageOutcome::Continue)
}

/// Externalize once the tally closed YES at the terminal state.
fn check_store(ctx: &mut BallotContext<'_>) -> StageResult {
    let Some(staging) = ctx.staging.clone() else {
        return Ok(StageOutcome::Continue);
    };
    if !staging.is_externalizable() {
        return Ok(StageOutcome::Continue);
    }

    let ballot = ctx.ballot()?.clone();
    let message = ctx
        .isaac
        .message_of(&ballot.message_hash)
        .cloned()
        .or_else(|| ballot.message.clone())
        .ok_or_else(|| {
            Error::InvalidState(format!(
                "message '{}' closed without its content",
                ballot.message_hash,
            ))
        })?;

    match finish_transaction(&ctx.deps.store, &ballot, &message) {
        Ok(bt) => {
            let hash = bt.hash.clone();
            ctx.deps
                .observer
                .trigger(&format!("saved hash-{hash}"), Arc::new(bt));
            Ok(StageOutcome::Continue)
        }
        // a benign double close: another ballot already finished the work
        Err(Error::AlreadySaved) => Ok(StageOutcome::Stop(format!(
            "transaction '{}' already saved",
            ballot.message_hash,
        ))),
        Err(e) => Err(e),
    }
}

/// Decide whether (and at which state) this node answers with its own
/// ballot: always on first sight, and whenever the round advanced.
fn check_is_broadcastable(ctx: &mut BallotContext<'_>) -> StageResult {
    let ballot_state = ctx.ballot()?.state;
    let Some(staging) = &ctx.staging else {
        return Ok(StageOutcome::Stop("no staging to answer".to_string()));
    };

    if staging.is_closed() {
        return Ok(StageOutcome::Stop("consensus already closed".to_string()));
    }
    ctx.broadcast_state = if staging.is_changed() {
        staging.next_state
    } else if ctx.is_new {
        Some(ballot_state)
    } else {
        None
    };

    match ctx.broadcast_state {
        Some(_) => Ok(StageOutcome::Continue),
        None => Ok(StageOutcome::Stop("nothing to broadcast".to_string())),
    }
}

/// This node's verdict: the message must spend from an existing account,
/// on the account's current checkpoint, within its balance, and aim at
/// targets consistent with each operation's kind.
fn check_voting_hole(ctx: &mut BallotContext<'_>) -> StageResult {
    let hash = ctx.ballot()?.message_hash.clone();
    let Some(message) = ctx.isaac.message_of(&hash).cloned() else {
        // no content to judge yet; vote NO rather than guess
        ctx.voting_hole = VotingHole::No;
        return Ok(StageOutcome::Continue);
    };

    ctx.voting_hole = match validate_against_ledger(ctx, &message) {
        Ok(()) => VotingHole::Yes,
        Err(e) => {
            debug!(
                message_hash = %hash,
                reason = %e,
                "voting NO",
            );
            VotingHole::No
        }
    };
    Ok(StageOutcome::Continue)
}

fn validate_against_ledger(ctx: &BallotContext<'_>, message: &Transaction) -> Result<(), Error> {
    let source = get_block_account(&ctx.deps.store, message.source())?;
    if !message.is_valid_checkpoint(source.checkpoint()) {
        return Err(Error::TransactionInvalidCheckpoint);
    }
    if message.total_amount(true) > source.balance() {
        return Err(Error::AccountBalanceUnderZero);
    }
    for op in &message.body.operations {
        let target_exists = exists_block_account(&ctx.deps.store, &op.body.target)?;
        match op.kind {
            OperationKind::CreateAccount if target_exists => {
                return Err(Error::BlockAccountAlreadyExists);
            }
            OperationKind::Payment if !target_exists => {
                return Err(Error::BlockAccountDoesNotExists);
            }
            _ => {}
        }
    }
    Ok(())
}

/// Cast and broadcast this node's ballot at the decided state.
fn check_broadcast(ctx: &mut BallotContext<'_>) -> StageResult {
    let Some(state) = ctx.broadcast_state else {
        return Ok(StageOutcome::Stop("nothing to broadcast".to_string()));
    };
    let hash = ctx.ballot()?.message_hash.clone();
    let local = ctx.deps.local_node.clone();

    let mut own = if state == BallotState::Init {
        // INIT ballots must carry the message
        let message = ctx.isaac.message_of(&hash).cloned().ok_or_else(|| {
            Error::InvalidState(format!("INIT broadcast for '{hash}' without message"))
        })?;
        Ballot::from_message(local.address().clone(), message)
    } else {
        Ballot::from_hash(local.address().clone(), hash, state, ctx.voting_hole)
    };
    own.vote_and_sign(local.keypair(), ctx.voting_hole, &ctx.deps.network_id);

    match ctx.isaac.receive_ballot(&own) {
        Ok(()) => {}
        Err(Error::NewButKnownMessage) => {
            return Ok(StageOutcome::Stop("own vote already recorded".to_string()));
        }
        Err(e) => return Err(e),
    }

    ctx.deps.conn.broadcast(MessageKind::Ballot, own.to_json());
    Ok(StageOutcome::Continue)
}
