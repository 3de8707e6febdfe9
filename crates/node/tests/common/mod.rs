//! Shared fixtures for the end-to-end suites.

use concord_consensus::VotingThresholdPolicy;
use concord_ledger::{exists_block_transaction, get_block_account, BlockAccount};
use concord_node::network::{cleanup_memory_network, MemoryNetwork, Network, NetworkClient};
use concord_node::{Endpoint, LocalNode, NodeRunner, Validator};
use concord_store::Store;
use concord_types::{Address, Amount, KeyPair};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const NETWORK_ID: &[u8] = concord_types::test_utils::TEST_NETWORK_ID;

/// A set of locally-running nodes peered over the memory network.
pub struct TestCluster {
    pub runners: Vec<Arc<NodeRunner>>,
    pub endpoints: Vec<Endpoint>,
    tasks: Vec<JoinHandle<()>>,
}

impl TestCluster {
    /// Start `n` nodes, each configured with every other as a validator.
    pub async fn start(n: usize, prefix: &str) -> TestCluster {
        cleanup_memory_network();

        let node_keys: Vec<KeyPair> = (0..n).map(|_| KeyPair::random()).collect();
        let endpoints: Vec<Endpoint> = (0..n)
            .map(|i| Endpoint::memory(&format!("{prefix}-{i}")))
            .collect();

        let mut runners = Vec::new();
        let mut tasks = Vec::new();
        for i in 0..n {
            let mut local = LocalNode::new(
                node_keys[i].clone(),
                endpoints[i].clone(),
                Some(format!("{prefix}-{i}")),
            );
            for j in 0..n {
                if i == j {
                    continue;
                }
                local.add_validator(Validator {
                    address: node_keys[j].address(),
                    endpoint: endpoints[j].clone(),
                    alias: format!("{prefix}-{j}"),
                });
            }

            let network = Arc::new(MemoryNetwork::new(endpoints[i].clone()));
            let runner = NodeRunner::new(
                NETWORK_ID.to_vec(),
                local,
                VotingThresholdPolicy::uniform(60).unwrap(),
                network as Arc<dyn Network>,
                Store::memory(),
            );

            let task = {
                let runner = runner.clone();
                tokio::spawn(async move {
                    let _ = runner.start().await;
                })
            };
            runners.push(runner);
            tasks.push(task);
        }

        let cluster = TestCluster {
            runners,
            endpoints,
            tasks,
        };
        cluster.wait_ready().await;
        cluster
    }

    async fn wait_ready(&self) {
        for runner in &self.runners {
            let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
            while !runner.is_ready() {
                assert!(
                    tokio::time::Instant::now() < deadline,
                    "node never became ready"
                );
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    /// A client speaking to node `i`, as an external submitter would.
    pub fn client_to(&self, i: usize) -> Arc<dyn NetworkClient> {
        self.runners[i].network().client(&self.endpoints[i])
    }

    /// Create the same funded account on every node's store.
    pub fn create_account_everywhere(&self, address: &Address, balance: Amount, checkpoint: &str) {
        for runner in &self.runners {
            let mut store = runner.store().clone();
            BlockAccount::new(address.clone(), balance, checkpoint.to_string())
                .save(&mut store)
                .unwrap();
        }
    }

    /// Wait until every node has externalized `hash`.
    pub async fn wait_for_externalization(&self, hash: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let done = self
                .runners
                .iter()
                .all(|r| exists_block_transaction(r.store(), hash).unwrap());
            if done {
                return true;
            }
            if tokio::time::Instant::now() > deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// The balance of `address` as node `i` sees it.
    pub fn balance_at(&self, i: usize, address: &Address) -> Amount {
        get_block_account(self.runners[i].store(), address)
            .unwrap()
            .balance()
    }

    pub fn stop(&self) {
        for runner in &self.runners {
            runner.stop();
        }
        for task in &self.tasks {
            task.abort();
        }
        cleanup_memory_network();
    }
}

/// Let in-flight ballots settle: used when asserting that nothing happened.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(300)).await;
}
