//! Node configuration.

use crate::{Endpoint, LocalNode, NodeError, Validator};
use concord_consensus::VotingThresholdPolicy;
use concord_types::{Address, Amount, KeyPair};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level node configuration, loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Network identifier mixed into every signature.
    pub network_id: String,

    pub node: NodeSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub policy: PolicyConfig,

    /// The static validator set, this node excluded.
    #[serde(default)]
    pub validators: Vec<ValidatorConfig>,

    /// Optional genesis account created at first start.
    #[serde(default)]
    pub genesis: Option<GenesisConfig>,
}

/// Node identity section.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSection {
    /// Base58 Ed25519 seed. Generated (and logged) when absent.
    #[serde(default)]
    pub secret_seed: Option<String>,

    #[serde(default)]
    pub alias: Option<String>,

    /// This node's own endpoint, e.g. `https://0.0.0.0:12345`.
    pub endpoint: Endpoint,
}

/// Storage section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSection {
    /// RocksDB directory. In-memory storage when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Per-state voting threshold percentages.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_threshold")]
    pub init: u32,
    #[serde(default = "default_threshold")]
    pub sign: u32,
    #[serde(default = "default_threshold")]
    pub accept: u32,
    #[serde(default = "default_threshold")]
    pub all_confirm: u32,
}

fn default_threshold() -> u32 {
    60
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            init: default_threshold(),
            sign: default_threshold(),
            accept: default_threshold(),
            all_confirm: default_threshold(),
        }
    }
}

/// One configured peer validator.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    pub address: Address,
    pub endpoint: Endpoint,
    #[serde(default)]
    pub alias: Option<String>,
}

/// Genesis account bootstrap.
#[derive(Debug, Clone, Deserialize)]
pub struct GenesisConfig {
    pub address: Address,
    pub balance: Amount,
    /// Initial checkpoint; a fresh UUID when absent.
    #[serde(default)]
    pub checkpoint: Option<String>,
}

impl NodeConfig {
    /// Load and parse a TOML configuration file.
    pub fn load(path: &Path) -> Result<NodeConfig, NodeError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&contents)
            .map_err(|e| NodeError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Build the voting threshold policy from the configured percentages.
    pub fn voting_policy(&self) -> Result<VotingThresholdPolicy, NodeError> {
        VotingThresholdPolicy::new(
            self.policy.init,
            self.policy.sign,
            self.policy.accept,
            self.policy.all_confirm,
        )
        .map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Build the local node identity with its validator set.
    pub fn local_node(&self) -> Result<LocalNode, NodeError> {
        let keypair = match &self.node.secret_seed {
            Some(seed) => KeyPair::from_secret(seed)
                .map_err(|e| NodeError::Config(format!("invalid secret seed: {e}")))?,
            None => KeyPair::random(),
        };

        let mut local = LocalNode::new(
            keypair,
            self.node.endpoint.clone(),
            self.node.alias.clone(),
        );
        for v in &self.validators {
            let alias = v
                .alias
                .clone()
                .unwrap_or_else(|| v.address.as_str().chars().take(8).collect());
            local.add_validator(Validator {
                address: v.address.clone(),
                endpoint: v.endpoint.clone(),
                alias,
            });
        }
        Ok(local)
    }
}
