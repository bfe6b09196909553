//! Shared fixtures for node integration tests.
#![allow(dead_code)]

use std::sync::LazyLock;
use std::time::Duration;

use murmur_identity::{LocalIdentity, PeerId, Peerstore, RsaPrivateKey};
use murmur_node::{Node, NodeConfig, NodeEvent};
use murmur_pubsub_memory::{MemoryNetwork, MemoryPubSub};
use rand::rngs::OsRng;
use tokio::sync::broadcast;
use tokio::time::timeout;

pub type TestNode = Node<MemoryPubSub, LocalIdentity>;

pub const TIMEOUT: Duration = Duration::from_secs(5);

// Key generation dominates test time, so keys are made once per test binary.
static KEYS: LazyLock<Vec<RsaPrivateKey>> = LazyLock::new(|| {
    (0..3)
        .map(|_| RsaPrivateKey::new(&mut OsRng, 1024).expect("Failed to generate key"))
        .collect()
});

/// A network plus the key directory all of its nodes share.
pub struct TestNet {
    pub network: MemoryNetwork,
    pub peerstore: Peerstore,
}

impl TestNet {
    pub fn new() -> Self {
        Self {
            network: MemoryNetwork::default(),
            peerstore: Peerstore::new(),
        }
    }

    /// Starts a node named `name` using the `index`th shared key.
    pub fn node(&self, name: &str, index: usize) -> TestNode {
        self.node_with_config(name, index, test_config())
    }

    pub fn node_with_config(&self, name: &str, index: usize, config: NodeConfig) -> TestNode {
        let identity = LocalIdentity::new(KEYS[index].clone(), self.peerstore.clone())
            .expect("Failed to create identity")
            .with_peer_id(name);
        let pubsub = self.network.connect(name);

        Node::new(config, identity, pubsub)
    }
}

pub fn test_config() -> NodeConfig {
    NodeConfig {
        presence_interval: Duration::from_millis(50),
        ..NodeConfig::default()
    }
}

pub fn peer(name: &str) -> PeerId {
    PeerId::new(name)
}

/// Waits until an event matching `predicate` arrives.
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<NodeEvent>,
    predicate: impl Fn(&NodeEvent) -> bool,
) -> NodeEvent {
    timeout(TIMEOUT, async {
        loop {
            let event = events.recv().await.expect("Event channel failed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("Timed out waiting for event")
}
