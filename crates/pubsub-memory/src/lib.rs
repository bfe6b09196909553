//! In-memory implementation of the pubsub crate.
//!
//! A [`MemoryNetwork`] routes messages between handles living in the same
//! process. Each participating peer obtains its own [`MemoryPubSub`] handle
//! through [`MemoryNetwork::connect`].
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod interest;
mod subscription;

pub use error::Error;
pub use subscription::MemorySubscription;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use interest::{InterestTracker, Subscriber};
use murmur_identity::PeerId;
use murmur_pubsub::{Message, PubSub};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Options for the in-memory network.
#[derive(Clone, Debug)]
pub struct MemoryNetworkOptions {
    /// Messages buffered per subscription before new ones are dropped.
    pub subscription_capacity: usize,
}

impl Default for MemoryNetworkOptions {
    fn default() -> Self {
        Self {
            subscription_capacity: 1024,
        }
    }
}

/// Shared in-process overlay.
#[derive(Clone, Debug)]
pub struct MemoryNetwork {
    interests: Arc<InterestTracker>,
    options: MemoryNetworkOptions,
}

impl MemoryNetwork {
    /// Creates an empty network.
    #[must_use]
    pub fn new(options: MemoryNetworkOptions) -> Self {
        Self {
            interests: Arc::new(InterestTracker::default()),
            options,
        }
    }

    /// Returns a handle that publishes and subscribes as `peer_id`.
    pub fn connect(&self, peer_id: impl Into<PeerId>) -> MemoryPubSub {
        let peer_id = peer_id.into();
        info!(peer = %peer_id, "peer joined memory network");

        MemoryPubSub {
            network: self.clone(),
            peer_id,
            shut_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Closes every subscription held by `peer_id`, as a broken transport would.
    ///
    /// Returns the number of subscriptions closed.
    pub fn sever(&self, peer_id: &PeerId) -> usize {
        let closed = self.interests.remove_peer(peer_id);
        warn!(peer = %peer_id, closed, "severed peer");
        closed
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new(MemoryNetworkOptions::default())
    }
}

/// A peer's handle on a [`MemoryNetwork`].
#[derive(Clone, Debug)]
pub struct MemoryPubSub {
    network: MemoryNetwork,
    peer_id: PeerId,
    shut_down: Arc<AtomicBool>,
}

impl MemoryPubSub {
    fn ensure_running(&self) -> Result<(), Error> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(Error::Shutdown);
        }
        Ok(())
    }

    fn validate_topic(topic: &str) -> Result<(), Error> {
        if topic.is_empty() {
            return Err(Error::InvalidTopic(topic.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PubSub for MemoryPubSub {
    type Error = Error;
    type Subscription = MemorySubscription;

    fn local_peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    async fn subscribe(&self, topic: &str) -> Result<MemorySubscription, Error> {
        self.ensure_running()?;
        Self::validate_topic(topic)?;

        let (sender, receiver) = mpsc::channel(self.network.options.subscription_capacity);
        let id = Uuid::new_v4();

        self.network.interests.add(
            topic,
            Subscriber {
                id,
                peer_id: self.peer_id.clone(),
                sender,
            },
        );

        Ok(MemorySubscription::new(
            id,
            topic.to_string(),
            receiver,
            self.network.interests.clone(),
        ))
    }

    async fn publish(&self, topic: &str, data: Bytes) -> Result<(), Error> {
        self.ensure_running()?;
        Self::validate_topic(topic)?;

        let subscribers = self.network.interests.subscribers(topic);
        debug!(
            topic,
            from = %self.peer_id,
            size = data.len(),
            subscribers = subscribers.len(),
            "publishing"
        );

        for subscriber in subscribers {
            let message = Message {
                from: self.peer_id.clone(),
                topic: topic.to_string(),
                data: data.clone(),
            };

            match subscriber.sender.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(topic, peer = %subscriber.peer_id, "subscription full, dropping message");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(topic, peer = %subscriber.peer_id, "subscription gone, skipping");
                }
            }
        }

        Ok(())
    }

    async fn list_peers(&self, topic: &str) -> Vec<PeerId> {
        self.network.interests.peers(topic, &self.peer_id)
    }

    async fn shutdown(&self) -> Result<(), Error> {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            self.network.interests.remove_peer(&self.peer_id);
            info!(peer = %self.peer_id, "peer left memory network");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use murmur_pubsub::Subscription;
    use tokio::time::{Duration, timeout};

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let network = MemoryNetwork::default();
        let alice = network.connect("alice");
        let bob = network.connect("bob");

        let mut sub_alice = alice.subscribe("room").await.unwrap();
        let mut sub_bob = bob.subscribe("room").await.unwrap();

        alice.publish("room", Bytes::from("hi")).await.unwrap();

        for sub in [&mut sub_alice, &mut sub_bob] {
            let message = timeout(Duration::from_secs(1), sub.next())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(message.from, PeerId::new("alice"));
            assert_eq!(message.topic, "room");
            assert_eq!(message.data, Bytes::from("hi"));
        }
    }

    #[tokio::test]
    async fn test_list_peers_excludes_self() {
        let network = MemoryNetwork::default();
        let alice = network.connect("alice");
        let bob = network.connect("bob");

        let _sub_alice = alice.subscribe("room").await.unwrap();
        assert!(alice.list_peers("room").await.is_empty());
        assert_eq!(bob.list_peers("room").await, vec![PeerId::new("alice")]);
    }

    #[tokio::test]
    async fn test_dropping_subscription_removes_interest() {
        let network = MemoryNetwork::default();
        let alice = network.connect("alice");
        let bob = network.connect("bob");

        let sub = alice.subscribe("room").await.unwrap();
        assert_eq!(bob.list_peers("room").await.len(), 1);

        drop(sub);
        assert!(bob.list_peers("room").await.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let network = MemoryNetwork::default();
        let alice = network.connect("alice");

        let mut sub = alice.subscribe("room").await.unwrap();
        sub.unsubscribe().await.unwrap();
        sub.unsubscribe().await.unwrap();

        alice.publish("room", Bytes::from("late")).await.unwrap();
        assert_eq!(
            sub.next().await,
            Err(Error::Unsubscribed("room".to_string()))
        );
    }

    #[tokio::test]
    async fn test_sever_closes_subscriptions() {
        let network = MemoryNetwork::default();
        let alice = network.connect("alice");

        let mut sub = alice.subscribe("room").await.unwrap();
        assert_eq!(network.sever(&PeerId::new("alice")), 1);

        let result = timeout(Duration::from_secs(1), sub.next()).await.unwrap();
        assert_eq!(result, Err(Error::Closed("room".to_string())));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_further_use() {
        let network = MemoryNetwork::default();
        let alice = network.connect("alice");

        alice.shutdown().await.unwrap();

        assert_eq!(alice.subscribe("room").await.unwrap_err(), Error::Shutdown);
        assert_eq!(
            alice.publish("room", Bytes::new()).await.unwrap_err(),
            Error::Shutdown
        );
    }

    #[tokio::test]
    async fn test_empty_topic_is_rejected() {
        let network = MemoryNetwork::default();
        let alice = network.connect("alice");

        assert_eq!(
            alice.subscribe("").await.unwrap_err(),
            Error::InvalidTopic(String::new())
        );
    }

    #[tokio::test]
    async fn test_full_subscription_drops_instead_of_blocking() {
        let network = MemoryNetwork::new(MemoryNetworkOptions {
            subscription_capacity: 1,
        });
        let alice = network.connect("alice");

        let mut sub = alice.subscribe("room").await.unwrap();
        alice.publish("room", Bytes::from("one")).await.unwrap();
        alice.publish("room", Bytes::from("two")).await.unwrap();

        assert_eq!(sub.next().await.unwrap().data, Bytes::from("one"));
        assert!(
            timeout(Duration::from_millis(50), sub.next())
                .await
                .is_err()
        );
    }
}
