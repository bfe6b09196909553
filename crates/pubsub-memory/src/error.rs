use murmur_pubsub::PubSubError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The subscription was severed by the network.
    #[error("subscription to {0} closed")]
    Closed(String),

    /// Topic names must be non-empty.
    #[error("invalid topic: {0:?}")]
    InvalidTopic(String),

    /// The handle has left the network.
    #[error("pubsub handle is shut down")]
    Shutdown,

    /// The subscription was explicitly cancelled.
    #[error("subscription to {0} was cancelled")]
    Unsubscribed(String),
}

impl PubSubError for Error {}
