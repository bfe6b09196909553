use crate::PeerId;

use thiserror::Error;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading or writing a key file failed.
    #[error("key file error: {0}")]
    Io(#[from] std::io::Error),

    /// Key generation or key validation failed.
    #[error(transparent)]
    Key(#[from] rsa::Error),

    /// The key could not be encoded or decoded as PKCS#8.
    #[error("pkcs8 error: {0}")]
    Pkcs8(String),

    /// No public key has been observed for the peer.
    #[error("public key not found for peer {0}")]
    PublicKeyNotFound(PeerId),
}

impl From<rsa::pkcs8::Error> for Error {
    fn from(e: rsa::pkcs8::Error) -> Self {
        Self::Pkcs8(e.to_string())
    }
}

impl From<rsa::pkcs8::spki::Error> for Error {
    fn from(e: rsa::pkcs8::spki::Error) -> Self {
        Self::Pkcs8(e.to_string())
    }
}
