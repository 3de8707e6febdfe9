//! HTTP network transport.
//!
//! The server side is the node's axum router (attached by the runner before
//! serving); the client side wraps `reqwest`. Inbound transactions and
//! ballots arrive through the API's POST endpoints, which feed the same
//! inbound channel the memory transport uses.

use super::{Network, NetworkClient, NetworkError};
use crate::{Endpoint, InboundMessage};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;

const INBOUND_CAPACITY: usize = 1024;

/// HTTP transport for one node.
pub struct HttpNetwork {
    endpoint: Endpoint,
    sender: mpsc::Sender<InboundMessage>,
    receiver: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
    router: Mutex<Option<axum::Router>>,
    ready: AtomicBool,
}

impl HttpNetwork {
    pub fn new(endpoint: Endpoint) -> Self {
        let (sender, receiver) = mpsc::channel(INBOUND_CAPACITY);
        HttpNetwork {
            endpoint,
            sender,
            receiver: Mutex::new(Some(receiver)),
            router: Mutex::new(None),
            ready: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
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
        Arc::new(HttpClient::new(endpoint.clone()))
    }

    fn attach_api(&self, router: axum::Router) {
        *self.router.lock() = Some(router);
    }

    async fn serve(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), NetworkError> {
        let router = self
            .router
            .lock()
            .take()
            .unwrap_or_else(axum::Router::new);

        let addr = self.endpoint.authority();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| NetworkError::Bind(addr.clone(), e.to_string()))?;
        self.ready.store(true, Ordering::SeqCst);
        info!(addr = %addr, "http network listening");

        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()));

        self.ready.store(false, Ordering::SeqCst);
        result
    }
}

/// HTTP client for one remote node.
pub struct HttpClient {
    endpoint: Endpoint,
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(endpoint: Endpoint) -> Self {
        HttpClient {
            endpoint,
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, payload: Vec<u8>) -> Result<(), NetworkError> {
        let url = format!("{}{}", self.endpoint.base_url(), path);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|_| NetworkError::Unreachable(self.endpoint.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NetworkError::Rejected(body))
        }
    }
}

#[async_trait]
impl NetworkClient for HttpClient {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn connect(&self, payload: Vec<u8>) -> Result<(), NetworkError> {
        self.post("/connect", payload).await
    }

    async fn get_node_info(&self) -> Result<Vec<u8>, NetworkError> {
        let url = format!("{}/node-info", self.endpoint.base_url());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|_| NetworkError::Unreachable(self.endpoint.to_string()))?;
        if !response.status().is_success() {
            return Err(NetworkError::Unreachable(self.endpoint.to_string()));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;
        Ok(body.to_vec())
    }

    async fn send_message(&self, payload: Vec<u8>) -> Result<(), NetworkError> {
        self.post("/transactions", payload).await
    }

    async fn send_ballot(&self, payload: Vec<u8>) -> Result<(), NetworkError> {
        self.post("/ballots", payload).await
    }
}
