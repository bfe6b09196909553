use crate::cipher::CipherError;
use crate::envelope::EnvelopeError;
use crate::store::StoreError;

use murmur_identity::PeerId;
use thiserror::Error;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Encryption of an outgoing message failed.
    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// The contact has been closed.
    #[error("contact {0} is closed")]
    ContactClosed(PeerId),

    /// No contact is registered under the identifier.
    #[error("contact {0} not found")]
    ContactNotFound(PeerId),

    /// A contact is already registered under the identifier.
    #[error("contact {0} already exists")]
    DuplicateContact(PeerId),

    /// An outgoing envelope could not be built.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// No public key is known for the correspondent.
    #[error("public key unavailable for {0}")]
    PublicKeyUnavailable(PeerId),

    /// The overlay rejected a publish.
    #[error("publish failed: {0}")]
    Publish(String),

    /// The overlay failed to shut down.
    #[error("pubsub error: {0}")]
    PubSub(String),

    /// A node cannot hold itself as a contact.
    #[error("cannot add own peer id {0} as a contact")]
    SelfContact(PeerId),

    /// The node has been shut down.
    #[error("node is shut down")]
    Shutdown,

    /// Contact-list persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No contact store was attached to the node.
    #[error("no contact store configured")]
    StoreNotConfigured,

    /// The overlay rejected a subscription.
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}
