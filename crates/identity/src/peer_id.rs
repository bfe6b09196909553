use std::fmt;

use rsa::RsaPublicKey;
use rsa::pkcs8::EncodePublicKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque, stable identifier of a peer.
///
/// Peers are compared by exact string equality. Identifiers derived with
/// [`PeerId::from_public_key`] are the lowercase hex SHA-256 digest of the
/// key's SPKI DER encoding, so two nodes holding the same public key always
/// agree on the identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wraps an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives the identifier of the holder of `public_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be DER encoded.
    pub fn from_public_key(public_key: &RsaPublicKey) -> crate::Result<Self> {
        let der = public_key.to_public_key_der()?;
        let digest = Sha256::digest(der.as_bytes());

        Ok(Self(hex::encode(digest)))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<PeerId> for String {
    fn from(peer_id: PeerId) -> Self {
        peer_id.0
    }
}
