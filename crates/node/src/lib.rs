//! Encrypted one-to-one messaging over a publish/subscribe overlay.
//!
//! A [`Node`] holds the local identity and a registry of [`Contact`]s. Each
//! pair of peers talks over two directional topics derived with
//! [`derive_topic`]; every message is sealed for its recipient with
//! RSA-OAEP wrapped AES-256-GCM and framed as an [`Envelope`].
//!
//! The crate is generic over the overlay ([`murmur_pubsub::PubSub`]) and the
//! key source ([`murmur_identity::IdentityProvider`]).
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod cipher;
mod config;
mod contact;
pub mod envelope;
mod error;
mod event;
mod node;
mod presence;
mod store;
mod topic;

pub use cipher::{CipherError, SealedMessage};
pub use config::NodeConfig;
pub use contact::{CloseReason, Contact, ContactState, InboundMessage, Inbox};
pub use envelope::{Envelope, EnvelopeError, EnvelopeKind};
pub use error::{Error, Result};
pub use event::{EventBus, EventBusStats, EventHandler, NodeEvent, SubscriptionId};
pub use node::Node;
pub use store::{ContactStore, FsContactStore, MemoryContactStore, StoreError};
pub use topic::{TopicPair, derive_topic};
