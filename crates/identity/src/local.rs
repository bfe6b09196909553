use crate::error::{Error, Result};
use crate::{IdentityProvider, PeerId, Peerstore};

use std::path::Path;

use async_trait::async_trait;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tokio::fs;
use tracing::info;

/// Default RSA modulus size for generated identities.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Identity backed by an RSA keypair held in memory.
///
/// Remote keys are resolved through the shared [`Peerstore`]; the own key is
/// recorded there on construction so every node sharing the store can reach
/// this one.
#[derive(Clone, Debug)]
pub struct LocalIdentity {
    peer_id: PeerId,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    peerstore: Peerstore,
}

impl LocalIdentity {
    /// Creates an identity from an existing private key. The peer identifier is
    /// derived from the public half.
    ///
    /// # Errors
    ///
    /// Returns an error if the public key cannot be encoded.
    pub fn new(private_key: RsaPrivateKey, peerstore: Peerstore) -> Result<Self> {
        let public_key = RsaPublicKey::from(&private_key);
        let peer_id = PeerId::from_public_key(&public_key)?;

        peerstore.insert(peer_id.clone(), public_key.clone());

        Ok(Self {
            peer_id,
            private_key,
            public_key,
            peerstore,
        })
    }

    /// Generates a fresh keypair of `bits` bits.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate(bits: usize, peerstore: Peerstore) -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)?;
        Self::new(private_key, peerstore)
    }

    /// Replaces the derived identifier with a caller-chosen one.
    #[must_use]
    pub fn with_peer_id(mut self, peer_id: impl Into<PeerId>) -> Self {
        self.peerstore.remove(&self.peer_id);
        self.peer_id = peer_id.into();
        self.peerstore
            .insert(self.peer_id.clone(), self.public_key.clone());
        self
    }

    /// Decodes a PKCS#8 PEM private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM document is not a valid RSA private key.
    pub fn from_pkcs8_pem(pem: &str, peerstore: Peerstore) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)?;
        private_key.validate()?;
        Self::new(private_key, peerstore)
    }

    /// Encodes the private key as a PKCS#8 PEM document.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be encoded.
    pub fn to_pkcs8_pem(&self) -> Result<String> {
        let pem = self.private_key.to_pkcs8_pem(LineEnding::LF)?;
        Ok(pem.as_str().to_owned())
    }

    /// Loads the key stored at `path`, or generates one and stores it there.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written, or holds an
    /// invalid key.
    pub async fn load_or_generate(
        path: impl AsRef<Path>,
        bits: usize,
        peerstore: Peerstore,
    ) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path).await {
            Ok(pem) => {
                let identity = Self::from_pkcs8_pem(&pem, peerstore)?;
                info!(peer = %identity.peer_id, path = %path.display(), "loaded identity");
                Ok(identity)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let identity = Self::generate(bits, peerstore)?;
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).await?;
                }
                fs::write(path, identity.to_pkcs8_pem()?).await?;
                info!(peer = %identity.peer_id, path = %path.display(), "generated identity");
                Ok(identity)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// The peerstore this identity resolves remote keys from.
    #[must_use]
    pub const fn peerstore(&self) -> &Peerstore {
        &self.peerstore
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    async fn public_key_of(&self, peer_id: &PeerId) -> Result<RsaPublicKey> {
        self.peerstore
            .get(peer_id)
            .ok_or_else(|| Error::PublicKeyNotFound(peer_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_own_key_is_resolvable() {
        let peerstore = Peerstore::new();
        let identity = LocalIdentity::generate(1024, peerstore.clone()).unwrap();

        let key = identity.public_key_of(identity.peer_id()).await.unwrap();
        assert_eq!(&key, identity.public_key());
        assert_eq!(peerstore.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_peer_is_not_found() {
        let identity = LocalIdentity::generate(1024, Peerstore::new()).unwrap();

        let result = identity.public_key_of(&PeerId::new("nobody")).await;
        assert!(matches!(result, Err(Error::PublicKeyNotFound(id)) if id.as_str() == "nobody"));
    }

    #[tokio::test]
    async fn test_with_peer_id_moves_peerstore_entry() {
        let peerstore = Peerstore::new();
        let identity = LocalIdentity::generate(1024, peerstore.clone()).unwrap();
        let derived = identity.peer_id().clone();

        let identity = identity.with_peer_id("alice");

        assert_eq!(identity.peer_id().as_str(), "alice");
        assert!(peerstore.contains(&PeerId::new("alice")));
        assert!(!peerstore.contains(&derived));
    }

    #[tokio::test]
    async fn test_pem_round_trip_keeps_peer_id() {
        let identity = LocalIdentity::generate(1024, Peerstore::new()).unwrap();
        let pem = identity.to_pkcs8_pem().unwrap();

        let restored = LocalIdentity::from_pkcs8_pem(&pem, Peerstore::new()).unwrap();
        assert_eq!(restored.peer_id(), identity.peer_id());
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn test_load_or_generate_persists_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("self.pem");

        let generated = LocalIdentity::load_or_generate(&path, 1024, Peerstore::new())
            .await
            .unwrap();
        assert!(path.exists());

        let loaded = LocalIdentity::load_or_generate(&path, 1024, Peerstore::new())
            .await
            .unwrap();
        assert_eq!(loaded.peer_id(), generated.peer_id());
    }

    #[tokio::test]
    async fn test_garbage_pem_is_rejected() {
        let result = LocalIdentity::from_pkcs8_pem("not a key", Peerstore::new());
        assert!(matches!(result, Err(Error::Pkcs8(_))));
    }
}
