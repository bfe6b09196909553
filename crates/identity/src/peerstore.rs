use crate::PeerId;

use std::sync::Arc;

use dashmap::DashMap;
use rsa::RsaPublicKey;
use tracing::debug;

/// Concurrent record of the public keys observed for each peer.
///
/// Cloning is cheap; every clone shares the same underlying map.
#[derive(Clone, Debug, Default)]
pub struct Peerstore {
    keys: Arc<DashMap<PeerId, RsaPublicKey>>,
}

impl Peerstore {
    /// Creates an empty peerstore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the public key of a peer, replacing any previous key.
    pub fn insert(&self, peer_id: PeerId, public_key: RsaPublicKey) {
        debug!(peer = %peer_id, "recording public key");
        self.keys.insert(peer_id, public_key);
    }

    /// Returns the public key recorded for `peer_id`, if any.
    #[must_use]
    pub fn get(&self, peer_id: &PeerId) -> Option<RsaPublicKey> {
        self.keys.get(peer_id).map(|entry| entry.value().clone())
    }

    /// Forgets the key of a peer.
    pub fn remove(&self, peer_id: &PeerId) -> Option<RsaPublicKey> {
        self.keys.remove(peer_id).map(|(_, key)| key)
    }

    /// Returns true if a key is known for `peer_id`.
    #[must_use]
    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.keys.contains_key(peer_id)
    }

    /// Number of peers with a known key.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no key is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
