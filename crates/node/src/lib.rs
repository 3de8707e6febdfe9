//! Node runner with async I/O.
//!
//! This crate binds the network layer, the checker pipelines, the voting
//! core and the block store into a running node:
//!
//! ```text
//! network inbound ──> dispatch task ──> checker pipeline ──> voting core
//!                                            │
//!                                            ▼ (closed, YES-terminal)
//!                                      externalization ──> observer ──> SSE
//! ```
//!
//! A single dispatch task owns the voting box; the connection manager and
//! the network accept loop run as their own tasks. All cross-task
//! communication goes through channels, and the runner's shutdown signal is
//! the parent of every task.

pub mod api;
mod checkers;
mod config;
mod connection;
mod endpoint;
mod local;
mod message;
pub mod network;
mod observer;
mod runner;

pub use config::{
    GenesisConfig, NodeConfig, NodeSection, PolicyConfig, StorageSection, ValidatorConfig,
};
pub use connection::ConnectionManager;
pub use endpoint::{Endpoint, Scheme};
pub use local::{LocalNode, NodeInfo, Validator};
pub use message::{InboundMessage, MessageKind};
pub use observer::{BlockTransactionObserver, Observer, Subscription};
pub use runner::NodeRunner;

use network::NetworkError;

/// Top-level failures from assembling or running a node.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] concord_store::StoreError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Protocol(#[from] concord_types::Error),
}
