//! In-process network transport.
//!
//! Nodes register their inbound channel in a process-global registry keyed
//! by endpoint host name; clients push messages straight into the target's
//! channel. Used by tests and `memory://` endpoints.

use super::{Network, NetworkClient, NetworkError};
use crate::{Endpoint, InboundMessage, MessageKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, watch};
use tracing::debug;

const INBOUND_CAPACITY: usize = 1024;

fn registry() -> &'static Mutex<HashMap<String, mpsc::Sender<InboundMessage>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, mpsc::Sender<InboundMessage>>>> =
        OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Drop every registered in-process node.
///
/// Tests sharing the registry call this between cases (and serialize on it).
pub fn cleanup_memory_network() {
    registry().lock().clear();
}

/// The in-process transport for one node.
pub struct MemoryNetwork {
    endpoint: Endpoint,
    sender: mpsc::Sender<InboundMessage>,
    receiver: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
    ready: AtomicBool,
}

impl MemoryNetwork {
    pub fn new(endpoint: Endpoint) -> Self {
        let (sender, receiver) = mpsc::channel(INBOUND_CAPACITY);
        MemoryNetwork {
            endpoint,
            sender,
            receiver: Mutex::new(Some(receiver)),
            ready: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Network for MemoryNetwork {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn take_receiver(&self) -> Option<mpsc::Receiver<InboundMessage>> {
        self.receiver.lock().take()
    }

    fn inbound_sender(&self) -> mpsc::Sender<InboundMessage> {
        self.sender.clone()
    }

    fn client(&self, endpoint: &Endpoint) -> Arc<dyn NetworkClient> {
        Arc::new(MemoryClient {
            endpoint: endpoint.clone(),
        })
    }

    async fn serve(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), NetworkError> {
        registry()
            .lock()
            .insert(self.endpoint.host.clone(), self.sender.clone());
        self.ready.store(true, Ordering::SeqCst);
        debug!(endpoint = %self.endpoint, "memory network ready");

        // nothing to accept; inbound flows through the registry channel
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        registry().lock().remove(&self.endpoint.host);
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Client half of the in-process transport. Resolves the target at send
/// time so clients may be created before the peer is up.
pub struct MemoryClient {
    endpoint: Endpoint,
}

impl MemoryClient {
    async fn push(&self, kind: MessageKind, data: Vec<u8>) -> Result<(), NetworkError> {
        let sender = registry()
            .lock()
            .get(&self.endpoint.host)
            .cloned()
            .ok_or_else(|| NetworkError::Unreachable(self.endpoint.to_string()))?;
        sender
            .send(InboundMessage::new(kind, data))
            .await
            .map_err(|_| NetworkError::Unreachable(self.endpoint.to_string()))
    }
}

#[async_trait]
impl NetworkClient for MemoryClient {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn connect(&self, payload: Vec<u8>) -> Result<(), NetworkError> {
        self.push(MessageKind::Connect, payload).await
    }

    async fn get_node_info(&self) -> Result<Vec<u8>, NetworkError> {
        // reachability doubles as the liveness answer in process
        if registry().lock().contains_key(&self.endpoint.host) {
            Ok(self.endpoint.to_string().into_bytes())
        } else {
            Err(NetworkError::Unreachable(self.endpoint.to_string()))
        }
    }

    async fn send_message(&self, payload: Vec<u8>) -> Result<(), NetworkError> {
        self.push(MessageKind::FromClient, payload).await
    }

    async fn send_ballot(&self, payload: Vec<u8>) -> Result<(), NetworkError> {
        self.push(MessageKind::Ballot, payload).await
    }
}
