//! The node runner: network → pipelines → voting → store.

use crate::api::{self, ApiState};
use crate::checkers::{
    ballot_checker, client_message_checker, BallotContext, ClientMessageContext, PipelineDeps,
};
use crate::network::{Network, NetworkError};
use crate::{
    BlockTransactionObserver, ConnectionManager, InboundMessage, LocalNode, MessageKind, NodeError,
    Observer, Validator,
};
use concord_consensus::{Isaac, VotingThresholdPolicy};
use concord_store::Store;
use concord_types::Error;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Bridges the network, the checker pipelines, the voting core and the
/// store into a single running node.
///
/// The runner owns the store handle, the voting registry and the connection
/// manager. Its shutdown signal is the parent of every task it starts:
/// inbound dispatch, validator connection maintenance, and the network
/// accept loop.
pub struct NodeRunner {
    network_id: Arc<Vec<u8>>,
    local_node: Arc<LocalNode>,
    policy: VotingThresholdPolicy,
    network: Arc<dyn Network>,
    store: Store,
    observer: BlockTransactionObserver,
    conn: Arc<ConnectionManager>,
    shutdown: watch::Sender<bool>,
}

impl NodeRunner {
    pub fn new(
        network_id: impl Into<Vec<u8>>,
        local_node: LocalNode,
        policy: VotingThresholdPolicy,
        network: Arc<dyn Network>,
        store: Store,
    ) -> Arc<NodeRunner> {
        let validators: Vec<Validator> = local_node.validators().cloned().collect();
        let conn = ConnectionManager::new(network.clone(), validators);
        let (shutdown, _) = watch::channel(false);

        Arc::new(NodeRunner {
            network_id: Arc::new(network_id.into()),
            local_node: Arc::new(local_node),
            policy,
            network,
            store,
            observer: Observer::new(),
            conn,
            shutdown,
        })
    }

    pub fn local_node(&self) -> &Arc<LocalNode> {
        &self.local_node
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn observer(&self) -> &BlockTransactionObserver {
        &self.observer
    }

    pub fn connection_manager(&self) -> &Arc<ConnectionManager> {
        &self.conn
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    /// Whether the network layer is accepting messages.
    pub fn is_ready(&self) -> bool {
        self.network.is_ready()
    }

    /// Run the node until [`stop`] is called or the network fails.
    ///
    /// [`stop`]: NodeRunner::stop
    pub async fn start(self: Arc<Self>) -> Result<(), NodeError> {
        let receiver = self
            .network
            .take_receiver()
            .ok_or(NetworkError::ChannelClosed)?;

        let deps = PipelineDeps {
            network_id: self.network_id.clone(),
            local_node: self.local_node.clone(),
            store: self.store.clone(),
            conn: self.conn.clone(),
            observer: self.observer.clone(),
        };
        let isaac = Isaac::new(self.policy, self.local_node.voting_addresses())?;

        self.network.attach_api(api::router(ApiState {
            store: self.store.clone(),
            observer: self.observer.clone(),
            inbound: self.network.inbound_sender(),
            local_node: self.local_node.clone(),
            network_id: self.network_id.clone(),
        }));

        info!(
            node = self.local_node.alias(),
            endpoint = %self.local_node.endpoint(),
            validators = self.local_node.validators().count(),
            "node starting",
        );

        let dispatch = tokio::spawn(dispatch_loop(
            deps,
            isaac,
            receiver,
            self.shutdown.subscribe(),
        ));
        let maintenance = tokio::spawn(self.conn.clone().run(self.shutdown.subscribe()));

        let served = self.network.serve(self.shutdown.subscribe()).await;

        // the network is down; wind the other tasks down with it
        let _ = self.shutdown.send(true);
        let _ = dispatch.await;
        let _ = maintenance.await;

        served.map_err(NodeError::from)
    }

    /// Signal every task to stop.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// The single consumer of inbound messages. Owns the voting box.
async fn dispatch_loop(
    deps: PipelineDeps,
    mut isaac: Isaac,
    mut receiver: mpsc::Receiver<InboundMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            inbound = receiver.recv() => match inbound {
                Some(message) => handle_inbound(&deps, &mut isaac, message),
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!(node = deps.local_node.alias(), "dispatch drained");
}

fn handle_inbound(deps: &PipelineDeps, isaac: &mut Isaac, message: InboundMessage) {
    if message.is_empty() {
        error!(kind = message.kind.name(), "got empty message");
        return;
    }
    debug!(
        node = deps.local_node.alias(),
        kind = message.kind.name(),
        head = %message.head(50),
        "inbound message",
    );

    match message.kind {
        MessageKind::Connect => handle_connect(&message),
        MessageKind::FromClient => handle_client_message(deps, isaac, message.data),
        MessageKind::Ballot => handle_ballot(deps, isaac, message.data),
    }
}

fn handle_connect(message: &InboundMessage) {
    match serde_json::from_slice::<Validator>(&message.data) {
        Ok(validator) => debug!(validator = %validator.alias, "validator connected"),
        Err(_) => error!(head = %message.head(50), "invalid validator data received"),
    }
}

fn handle_client_message(deps: &PipelineDeps, isaac: &mut Isaac, data: Vec<u8>) {
    let checker = client_message_checker();
    let mut ctx = ClientMessageContext::new(deps.clone(), isaac, data);
    match checker.run(&mut ctx) {
        // clean stops were already logged at debug by the pipeline
        Ok(_) => {}
        Err(e) => error!(error = %e, "failed to handle message from client"),
    }
}

fn handle_ballot(deps: &PipelineDeps, isaac: &mut Isaac, data: Vec<u8>) {
    let checker = ballot_checker();
    let mut ctx = BallotContext::new(deps.clone(), isaac, data);
    let result = checker.run(&mut ctx);
    let staging = ctx.staging.take();

    // An externalization failure must leave the voting result open: the
    // next re-receive of a terminal ballot retries the store. Only a clean
    // pipeline run (or the benign double-close) finishes the message.
    let keep_open = match result {
        Ok(_) => false,
        Err(Error::AlreadySaved) => false,
        Err(e) => {
            error!(error = %e, "failed to handle ballot");
            true
        }
    };
    if keep_open {
        return;
    }

    if let Some(staging) = staging {
        if staging.is_closed() {
            isaac.close_consensus(&staging.message_hash);
        }
    }
}
