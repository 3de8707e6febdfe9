//! The node runner's two checker pipelines.
//!
//! Client messages and peer ballots each traverse an ordered list of stages
//! over a mutable context. Stages that drop a message for benign reasons
//! (duplicate, unknown sender, nothing left to do) stop the pipeline
//! cleanly; faults abort it with a protocol error.

mod ballot;
mod client;

pub(crate) use ballot::{ballot_checker, BallotContext};
pub(crate) use client::{client_message_checker, ClientMessageContext};

use crate::{BlockTransactionObserver, ConnectionManager, LocalNode};
use concord_store::Store;
use std::sync::Arc;

/// The shared, cheaply-cloneable half of a pipeline context.
#[derive(Clone)]
pub(crate) struct PipelineDeps {
    pub network_id: Arc<Vec<u8>>,
    pub local_node: Arc<LocalNode>,
    pub store: Store,
    pub conn: Arc<ConnectionManager>,
    pub observer: BlockTransactionObserver,
}
