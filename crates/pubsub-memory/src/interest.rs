//! Interest tracking for the in-memory overlay
//!
//! Records which peers hold live subscriptions on which topics, together with
//! the delivery channel of each subscription.

use std::collections::HashMap;

use murmur_identity::PeerId;
use murmur_pubsub::Message;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct Subscriber {
    pub id: Uuid,
    pub peer_id: PeerId,
    pub sender: mpsc::Sender<Message>,
}

/// Topic -> live subscribers, in subscription order.
#[derive(Debug, Default)]
pub struct InterestTracker {
    topics: RwLock<HashMap<String, Vec<Subscriber>>>,
}

impl InterestTracker {
    pub fn add(&self, topic: &str, subscriber: Subscriber) {
        debug!(topic, peer = %subscriber.peer_id, id = %subscriber.id, "added interest");
        self.topics
            .write()
            .entry(topic.to_string())
            .or_default()
            .push(subscriber);
    }

    pub fn remove(&self, topic: &str, id: Uuid) {
        let mut topics = self.topics.write();

        if let Some(subscribers) = topics.get_mut(topic) {
            subscribers.retain(|s| s.id != id);
            if subscribers.is_empty() {
                topics.remove(topic);
            }
        }

        trace!(topic, %id, "removed interest");
    }

    /// Drops every subscription held by `peer_id`. Returns how many were removed.
    pub fn remove_peer(&self, peer_id: &PeerId) -> usize {
        let mut topics = self.topics.write();
        let mut removed = 0;

        topics.retain(|_, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|s| &s.peer_id != peer_id);
            removed += before - subscribers.len();
            !subscribers.is_empty()
        });

        debug!(peer = %peer_id, removed, "removed all interests of peer");
        removed
    }

    pub fn subscribers(&self, topic: &str) -> Vec<Subscriber> {
        self.topics.read().get(topic).cloned().unwrap_or_default()
    }

    /// Distinct peers subscribed to `topic`, excluding `local`.
    pub fn peers(&self, topic: &str, local: &PeerId) -> Vec<PeerId> {
        let topics = self.topics.read();
        let mut peers: Vec<PeerId> = Vec::new();

        for subscriber in topics.get(topic).into_iter().flatten() {
            if &subscriber.peer_id != local && !peers.contains(&subscriber.peer_id) {
                peers.push(subscriber.peer_id.clone());
            }
        }

        peers
    }
}
