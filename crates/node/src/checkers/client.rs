//! Pipeline for transactions submitted by clients.

use super::PipelineDeps;
use crate::MessageKind;
use concord_consensus::{Checker, Isaac, Stage, StageOutcome, StageResult};
use concord_ledger::{exists_block_transaction_history, BlockTransactionHistory};
use concord_types::{Ballot, Error, Transaction, VotingHole};

/// Context threaded through the client-message stages.
pub(crate) struct ClientMessageContext<'a> {
    pub deps: PipelineDeps,
    pub isaac: &'a mut Isaac,
    pub data: Vec<u8>,
    pub transaction: Option<Transaction>,
    pub ballot: Option<Ballot>,
}

impl<'a> ClientMessageContext<'a> {
    pub fn new(deps: PipelineDeps, isaac: &'a mut Isaac, data: Vec<u8>) -> Self {
        ClientMessageContext {
            deps,
            isaac,
            data,
            transaction: None,
            ballot: None,
        }
    }

    fn transaction(&self) -> Result<&Transaction, Error> {
        self.transaction
            .as_ref()
            .ok_or_else(|| Error::InvalidState("transaction not yet unmarshaled".to_string()))
    }
}

/// The ordered stages a client transaction traverses.
pub(crate) fn client_message_checker<'a>() -> Checker<ClientMessageContext<'a>> {
    Checker::new(
        "client-message",
        vec![
            Stage { name: "unmarshal", func: check_unmarshal },
            Stage { name: "has-same-source", func: check_has_same_source },
            Stage { name: "history", func: check_history },
            Stage { name: "receive-message", func: check_receive_message },
            Stage { name: "sign-ballot", func: check_sign_ballot },
            Stage { name: "broadcast", func: check_broadcast },
        ],
    )
}

/// Parse and structurally validate the submitted transaction.
fn check_unmarshal(ctx: &mut ClientMessageContext<'_>) -> StageResult {
    let tx = Transaction::from_json(&ctx.data)?;
    tx.is_well_formed(&ctx.deps.network_id)?;
    ctx.transaction = Some(tx);
    Ok(StageOutcome::Continue)
}

/// One in-flight transaction per source: concurrent spends would race the
/// same checkpoint.
fn check_has_same_source(ctx: &mut ClientMessageContext<'_>) -> StageResult {
    let tx = ctx.transaction()?;
    if ctx.isaac.has_message_by_source(tx.source()) {
        return Ok(StageOutcome::Stop(format!(
            "source '{}' already has a transaction in consensus",
            tx.source(),
        )));
    }
    Ok(StageOutcome::Continue)
}

/// Ignore a hash this node has already seen; otherwise leave the
/// breadcrumb that serves GET-by-hash until externalization.
fn check_history(ctx: &mut ClientMessageContext<'_>) -> StageResult {
    let tx = ctx.transaction()?.clone();
    if exists_block_transaction_history(&ctx.deps.store, tx.hash())? {
        return Ok(StageOutcome::Stop(format!(
            "transaction '{}' already in history",
            tx.hash(),
        )));
    }
    BlockTransactionHistory::from_transaction(&tx).save(&mut ctx.deps.store)?;
    Ok(StageOutcome::Continue)
}

/// Open the voting result for this message.
fn check_receive_message(ctx: &mut ClientMessageContext<'_>) -> StageResult {
    let tx = ctx.transaction()?.clone();
    match ctx.isaac.receive_message(&tx) {
        Ok(()) => Ok(StageOutcome::Continue),
        Err(Error::VotingResultAlreadyExists) => Ok(StageOutcome::Stop(format!(
            "transaction '{}' already in consensus",
            tx.hash(),
        ))),
        Err(e) => Err(e),
    }
}

/// Cast this node's own INIT ballot.
fn check_sign_ballot(ctx: &mut ClientMessageContext<'_>) -> StageResult {
    let tx = ctx.transaction()?.clone();
    let mut ballot = Ballot::from_message(ctx.deps.local_node.address().clone(), tx);
    ballot.vote_and_sign(
        ctx.deps.local_node.keypair(),
        VotingHole::Yes,
        &ctx.deps.network_id,
    );
    ctx.isaac.receive_ballot(&ballot)?;
    ctx.ballot = Some(ballot);
    Ok(StageOutcome::Continue)
}

/// Hand the INIT ballot to every configured validator.
fn check_broadcast(ctx: &mut ClientMessageContext<'_>) -> StageResult {
    let ballot = ctx
        .ballot
        .as_ref()
        .ok_or_else(|| Error::InvalidState("ballot not yet signed".to_string()))?;
    ctx.deps.conn.broadcast(MessageKind::Ballot, ballot.to_json());
    Ok(StageOutcome::Continue)
}
