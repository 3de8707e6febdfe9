//! Validator connection maintenance.

use crate::network::{Network, NetworkClient};
use crate::{MessageKind, Validator};
use concord_types::Address;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// How often to poll the local network for readiness before connecting out.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(5);
/// Cadence of the per-validator liveness probe once running.
const PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Keeps one live client per configured validator.
///
/// Clients are created lazily through the network's factory. Broadcasts are
/// queued and drained by the maintenance task one at a time, so every peer
/// observes this node's messages in submission order. Components other than
/// the maintenance task only read: [`client`] and [`broadcast`] never mutate
/// the validator set.
///
/// [`client`]: ConnectionManager::client
/// [`broadcast`]: ConnectionManager::broadcast
pub struct ConnectionManager {
    network: Arc<dyn Network>,
    validators: Vec<Validator>,
    clients: RwLock<HashMap<String, Arc<dyn NetworkClient>>>,
    outbound: mpsc::UnboundedSender<(MessageKind, Vec<u8>)>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<(MessageKind, Vec<u8>)>>>,
}

impl ConnectionManager {
    pub fn new(network: Arc<dyn Network>, validators: Vec<Validator>) -> Arc<Self> {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        Arc::new(ConnectionManager {
            network,
            validators,
            clients: RwLock::new(HashMap::new()),
            outbound,
            outbound_rx: Mutex::new(Some(outbound_rx)),
        })
    }

    /// The client for one validator address, if known.
    pub fn client(&self, address: &Address) -> Option<Arc<dyn NetworkClient>> {
        if let Some(client) = self.clients.read().get(address.as_str()) {
            return Some(client.clone());
        }
        // lazily create for a configured validator not yet connected
        let validator = self.validators.iter().find(|v| &v.address == address)?;
        Some(self.ensure_client(validator))
    }

    fn ensure_client(&self, validator: &Validator) -> Arc<dyn NetworkClient> {
        let mut clients = self.clients.write();
        clients
            .entry(validator.address.as_str().to_string())
            .or_insert_with(|| self.network.client(&validator.endpoint))
            .clone()
    }

    /// Queue a payload for every configured validator.
    ///
    /// Never blocks the caller; the maintenance task delivers queued
    /// payloads in order, and failures are logged and left to the
    /// liveness probe.
    pub fn broadcast(&self, kind: MessageKind, payload: Vec<u8>) {
        if self.outbound.send((kind, payload)).is_err() {
            warn!("broadcast queued after connection manager stopped");
        }
    }

    pub fn connected_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Maintenance loop: wait for the local network, establish every
    /// client, then drain broadcasts and probe liveness until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        // the local transport must be up before connecting out
        while !self.network.is_ready() {
            if *shutdown.borrow() {
                return;
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
        debug!(
            validators = self.validators.len(),
            "network ready, connecting to validators",
        );

        for validator in &self.validators {
            self.ensure_client(validator);
        }

        let mut outbound_rx = self
            .outbound_rx
            .lock()
            .take()
            .expect("connection manager runs once");

        let mut probe = tokio::time::interval(PROBE_INTERVAL);
        probe.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                queued = outbound_rx.recv() => match queued {
                    Some((kind, payload)) => self.send_to_all(kind, payload).await,
                    None => return,
                },
                _ = probe.tick() => self.probe_validators().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn send_to_all(&self, kind: MessageKind, payload: Vec<u8>) {
        for validator in &self.validators {
            let client = self.ensure_client(validator);
            let result = match kind {
                MessageKind::Ballot => client.send_ballot(payload.clone()).await,
                MessageKind::FromClient => client.send_message(payload.clone()).await,
                MessageKind::Connect => client.connect(payload.clone()).await,
            };
            if let Err(e) = result {
                warn!(validator = %validator.alias, error = %e, "broadcast send failed");
            }
        }
    }

    async fn probe_validators(&self) {
        for validator in &self.validators {
            let client = self.ensure_client(validator);
            match client.get_node_info().await {
                Ok(_) => debug!(validator = %validator.alias, "validator alive"),
                Err(e) => warn!(validator = %validator.alias, error = %e, "validator probe failed"),
            }
        }
    }
}
