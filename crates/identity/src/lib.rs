//! Peer identities for murmur nodes: the own RSA keypair and lookup of the
//! public keys of correspondents.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod local;
mod peer_id;
mod peerstore;

pub use error::{Error, Result};
pub use local::{DEFAULT_KEY_BITS, LocalIdentity};
pub use peer_id::PeerId;
pub use peerstore::Peerstore;

pub use rsa::{RsaPrivateKey, RsaPublicKey};

use async_trait::async_trait;

/// Source of the local keypair and of correspondents' public keys.
///
/// Keys are only ever exposed through these accessors; callers never reach
/// into the representation of an implementation.
#[async_trait]
pub trait IdentityProvider
where
    Self: Send + Sync + 'static,
{
    /// Identifier of the local peer.
    fn peer_id(&self) -> &PeerId;

    /// Public half of the local keypair.
    fn public_key(&self) -> &RsaPublicKey;

    /// Private half of the local keypair.
    fn private_key(&self) -> &RsaPrivateKey;

    /// Resolves the public key of a correspondent.
    ///
    /// Fails with [`Error::PublicKeyNotFound`] if the peer has never been
    /// observed.
    async fn public_key_of(&self, peer_id: &PeerId) -> Result<RsaPublicKey>;
}
