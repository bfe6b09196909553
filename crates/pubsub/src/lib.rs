//! Abstract interface for a topic-based publish/subscribe overlay.
//!
//! Implementations provide best-effort delivery: no ordering, deduplication or
//! persistence is promised beyond what the underlying network offers.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use murmur_identity::PeerId;

/// Marker trait for pub/sub errors
pub trait PubSubError: Error + Send + Sync + 'static {}

/// A message received on a topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// The peer that published the message.
    pub from: PeerId,

    /// The topic the message was published to.
    pub topic: String,

    /// The raw payload.
    pub data: Bytes,
}

/// Capability to publish to and subscribe on named topics.
#[async_trait]
pub trait PubSub
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the overlay.
    type Error: PubSubError;

    /// The type of subscription returned by `subscribe`.
    type Subscription: Subscription<Error = Self::Error>;

    /// Identifier the overlay stamps on messages published through this handle.
    fn local_peer_id(&self) -> &PeerId;

    /// Subscribe to messages on a topic.
    async fn subscribe(&self, topic: &str) -> Result<Self::Subscription, Self::Error>;

    /// Publish a message to a topic.
    async fn publish(&self, topic: &str, data: Bytes) -> Result<(), Self::Error>;

    /// Remote peers currently subscribed to a topic. Never includes the local
    /// peer.
    async fn list_peers(&self, topic: &str) -> Vec<PeerId>;

    /// Leave the overlay. Later calls to `subscribe` and `publish` fail.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// A live subscription to a single topic.
#[async_trait]
pub trait Subscription
where
    Self: Debug + Send + Sync + 'static,
{
    /// The error type for the subscription.
    type Error: PubSubError;

    /// The topic this subscription listens on.
    fn topic(&self) -> &str;

    /// Waits for the next message.
    ///
    /// Cancel safe: dropping the returned future loses no message. Fails once
    /// the subscription has been severed by the overlay or unsubscribed.
    async fn next(&mut self) -> Result<Message, Self::Error>;

    /// Stops receiving messages on the topic.
    async fn unsubscribe(&mut self) -> Result<(), Self::Error>;
}
