//! Concord consensus node.
//!
//! # Usage
//!
//! ```bash
//! # Start with a configuration file
//! concordd --config node.toml
//!
//! # Override the log level
//! concordd --config node.toml --log-level debug
//! ```
//!
//! # Configuration
//!
//! Example TOML:
//!
//! ```toml
//! network_id = "concord-testnet"
//!
//! [node]
//! secret_seed = "..."                # base58 Ed25519 seed; generated if absent
//! alias = "n0"
//! endpoint = "https://0.0.0.0:12345"
//!
//! [storage]
//! path = "./data/db"                 # in-memory when absent
//!
//! [policy]
//! init = 60
//! sign = 60
//! accept = 60
//! all_confirm = 60
//!
//! [[validators]]
//! address = "..."
//! endpoint = "https://10.0.0.2:12345"
//! alias = "n1"
//!
//! [genesis]
//! address = "..."
//! balance = "10000000000"
//! ```
//!
//! # Exit codes
//!
//! `0` clean shutdown, `1` configuration error, `2` store open failure,
//! `3` network bind failure.

use anyhow::Context;
use clap::Parser;
use concord_ledger::{exists_block_account, BlockAccount};
use concord_node::network::{new_network, NetworkError};
use concord_node::{NodeConfig, NodeError, NodeRunner};
use concord_store::Store;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_CONFIG: u8 = 1;
const EXIT_STORE: u8 = 2;
const EXIT_BIND: u8 = 3;

/// Concord consensus node.
#[derive(Parser, Debug)]
#[command(name = "concordd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Log level filter (overrides RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    match run(&cli).await {
        Ok(()) => {
            info!("clean shutdown");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "node failed");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn exit_code_for(e: &NodeError) -> u8 {
    match e {
        NodeError::Config(_) | NodeError::Protocol(_) => EXIT_CONFIG,
        NodeError::Store(_) => EXIT_STORE,
        NodeError::Network(NetworkError::Bind(_, _)) => EXIT_BIND,
        NodeError::Network(_) => EXIT_BIND,
    }
}

async fn run(cli: &Cli) -> Result<(), NodeError> {
    let config = NodeConfig::load(&cli.config)?;
    let policy = config.voting_policy()?;
    let local_node = config.local_node()?;

    info!(
        address = %local_node.address(),
        alias = local_node.alias(),
        endpoint = %local_node.endpoint(),
        validators = config.validators.len(),
        "configuration loaded",
    );

    let store = match &config.storage.path {
        Some(path) => Store::open(path)?,
        None => Store::memory(),
    };

    bootstrap_genesis(&config, &store)?;

    let network = new_network(local_node.endpoint());
    let runner = NodeRunner::new(
        config.network_id.as_bytes().to_vec(),
        local_node,
        policy,
        network,
        store,
    );

    let shutdown_runner = runner.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.context("ctrl-c").is_ok() {
            info!("interrupt received, shutting down");
            shutdown_runner.stop();
        }
    });

    runner.start().await
}

/// Create the configured genesis account when the store does not have it.
fn bootstrap_genesis(config: &NodeConfig, store: &Store) -> Result<(), NodeError> {
    let Some(genesis) = &config.genesis else {
        return Ok(());
    };
    let mut store = store.clone();
    if exists_block_account(&store, &genesis.address)? {
        return Ok(());
    }
    let checkpoint = genesis
        .checkpoint
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    BlockAccount::new(genesis.address.clone(), genesis.balance, checkpoint)
        .save(&mut store)?;
    info!(address = %genesis.address, balance = %genesis.balance, "genesis account created");
    Ok(())
}
