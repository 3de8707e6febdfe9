//! Local node identity and the configured validator set.

use crate::Endpoint;
use concord_types::{Address, KeyPair};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One configured peer validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub endpoint: Endpoint,
    pub alias: String,
}

/// Public identity of a node, as served from the node-info probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub address: Address,
    pub alias: String,
    pub endpoint: Endpoint,
    pub validators: Vec<Validator>,
}

/// This node's identity: its keypair, endpoint, and static validator set.
pub struct LocalNode {
    keypair: KeyPair,
    address: Address,
    alias: String,
    endpoint: Endpoint,
    validators: BTreeMap<String, Validator>,
}

impl LocalNode {
    pub fn new(keypair: KeyPair, endpoint: Endpoint, alias: Option<String>) -> Self {
        let address = keypair.address();
        let alias = alias.unwrap_or_else(|| address.as_str().chars().take(8).collect());
        LocalNode {
            keypair,
            address,
            alias,
            endpoint,
            validators: BTreeMap::new(),
        }
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn add_validator(&mut self, validator: Validator) {
        self.validators
            .insert(validator.address.as_str().to_string(), validator);
    }

    pub fn has_validator(&self, address: &Address) -> bool {
        self.validators.contains_key(address.as_str())
    }

    /// The configured peers, self excluded.
    pub fn validators(&self) -> impl Iterator<Item = &Validator> {
        self.validators.values()
    }

    /// Every voting participant: the peers plus this node.
    pub fn voting_addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self
            .validators
            .values()
            .map(|v| v.address.clone())
            .collect();
        addresses.push(self.address.clone());
        addresses
    }

    pub fn node_info(&self) -> NodeInfo {
        NodeInfo {
            address: self.address.clone(),
            alias: self.alias.clone(),
            endpoint: self.endpoint.clone(),
            validators: self.validators.values().cloned().collect(),
        }
    }
}

impl std::fmt::Debug for LocalNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalNode")
            .field("address", &self.address)
            .field("alias", &self.alias)
            .field("endpoint", &self.endpoint)
            .field("validators", &self.validators.len())
            .finish()
    }
}
