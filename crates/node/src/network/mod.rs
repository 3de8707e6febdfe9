//! Network transports.
//!
//! A [`Network`] accepts inbound messages and hands them to the dispatch
//! task through a channel; a [`NetworkClient`] talks to one remote node.
//! Two transports exist: [`MemoryNetwork`] peers through an in-process
//! registry (tests, `memory` endpoints) and [`HttpNetwork`] serves the HTTP
//! API (`https` endpoints).

mod http;
mod memory;

pub use http::{HttpClient, HttpNetwork};
pub use memory::{cleanup_memory_network, MemoryNetwork};

use crate::{Endpoint, InboundMessage};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Failures from the network layer.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error("failed to bind {0}: {1}")]
    Bind(String, String),
    #[error("endpoint '{0}' is not reachable")]
    Unreachable(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("inbound channel closed")]
    ChannelClosed,
    #[error("remote rejected the payload: {0}")]
    Rejected(String),
}

/// One node's view of the network.
#[async_trait]
pub trait Network: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    /// Whether the transport is accepting messages yet.
    fn is_ready(&self) -> bool;

    /// The inbound message stream. Yields once; the dispatch task takes it.
    fn take_receiver(&self) -> Option<mpsc::Receiver<InboundMessage>>;

    /// A sender feeding the inbound stream, used by the API's POST handlers.
    fn inbound_sender(&self) -> mpsc::Sender<InboundMessage>;

    /// A client for a remote endpoint. Creation is cheap and lazy; failures
    /// surface on use.
    fn client(&self, endpoint: &Endpoint) -> Arc<dyn NetworkClient>;

    /// Attach the HTTP API router. Transports without an HTTP surface
    /// ignore it.
    fn attach_api(&self, _router: axum::Router) {}

    /// Run the accept loop until `shutdown` flips. Binding errors surface
    /// here before the transport reports ready.
    async fn serve(&self, shutdown: watch::Receiver<bool>) -> Result<(), NetworkError>;
}

/// A connection to one remote node.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    /// Announce a validator identity payload.
    async fn connect(&self, payload: Vec<u8>) -> Result<(), NetworkError>;

    /// Liveness/identity probe.
    async fn get_node_info(&self) -> Result<Vec<u8>, NetworkError>;

    /// Submit a client transaction payload.
    async fn send_message(&self, payload: Vec<u8>) -> Result<(), NetworkError>;

    /// Submit a ballot payload.
    async fn send_ballot(&self, payload: Vec<u8>) -> Result<(), NetworkError>;
}

/// Build the transport matching an endpoint's scheme.
pub fn new_network(endpoint: &Endpoint) -> Arc<dyn Network> {
    match endpoint.scheme {
        crate::Scheme::Memory => Arc::new(MemoryNetwork::new(endpoint.clone())),
        crate::Scheme::Https => Arc::new(HttpNetwork::new(endpoint.clone())),
    }
}
