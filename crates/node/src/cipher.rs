//! Hybrid public-key encryption of message bodies.
//!
//! Each message gets a fresh 256-bit AES key. The key is wrapped with the
//! recipient's RSA public key using OAEP over SHA-1 with an empty label, and
//! the body is sealed with AES-256-GCM. The sealed body is laid out as
//! `nonce (12) || ciphertext || tag (16)`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use bytes::{BufMut, Bytes, BytesMut};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use thiserror::Error;
use zeroize::Zeroizing;

/// Size of the per-message symmetric key.
pub const KEY_SIZE: usize = 32;

/// Size of the GCM nonce prefixed to each sealed body.
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag.
pub const TAG_SIZE: usize = 16;

/// Errors from sealing or opening a message.
///
/// Variants carry no detail on purpose: the caller learns which stage
/// failed, nothing about key material.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// The symmetric key could not be wrapped for the recipient.
    #[error("failed to wrap message key")]
    KeyWrap,

    /// The wrapped key could not be opened with the local private key.
    #[error("failed to unwrap message key")]
    KeyUnwrap,

    /// The body could not be sealed.
    #[error("failed to encrypt message body")]
    BodyEncryption,

    /// The sealed body was truncated or failed authentication.
    #[error("failed to decrypt message body")]
    BodyDecryption,
}

/// A message sealed for one recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedMessage {
    /// Symmetric key encrypted to the recipient's public key.
    pub wrapped_key: Bytes,
    /// Nonce-prefixed AES-GCM ciphertext of the body.
    pub ciphertext: Bytes,
}

/// Seals `plaintext` so that only the holder of `recipient`'s private key
/// can open it.
///
/// # Errors
///
/// Returns [`CipherError::KeyWrap`] when the key is too small for OAEP and
/// [`CipherError::BodyEncryption`] when sealing fails.
pub fn encrypt(plaintext: &[u8], recipient: &RsaPublicKey) -> Result<SealedMessage, CipherError> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng.fill_bytes(&mut key[..]);

    let wrapped_key = recipient
        .encrypt(&mut OsRng, Oaep::new::<Sha1>(), &key[..])
        .map_err(|_| CipherError::KeyWrap)?;

    let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| CipherError::BodyEncryption)?;

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CipherError::BodyEncryption)?;

    let mut ciphertext = BytesMut::with_capacity(NONCE_SIZE + sealed.len());
    ciphertext.put_slice(&nonce);
    ciphertext.put_slice(&sealed);

    Ok(SealedMessage {
        wrapped_key: Bytes::from(wrapped_key),
        ciphertext: ciphertext.freeze(),
    })
}

/// Opens a message produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`CipherError::KeyUnwrap`] when `wrapped_key` was not made for
/// `private_key`, and [`CipherError::BodyDecryption`] when the body is
/// truncated or has been tampered with.
pub fn decrypt(
    wrapped_key: &[u8],
    ciphertext: &[u8],
    private_key: &RsaPrivateKey,
) -> Result<Vec<u8>, CipherError> {
    let key = Zeroizing::new(
        private_key
            .decrypt(Oaep::new::<Sha1>(), wrapped_key)
            .map_err(|_| CipherError::KeyUnwrap)?,
    );
    if key.len() != KEY_SIZE {
        return Err(CipherError::KeyUnwrap);
    }

    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CipherError::BodyDecryption);
    }
    let (nonce, sealed) = ciphertext.split_at(NONCE_SIZE);

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CipherError::BodyDecryption)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CipherError::BodyDecryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::LazyLock;

    use proptest::prelude::*;

    static ALICE: LazyLock<RsaPrivateKey> =
        LazyLock::new(|| RsaPrivateKey::new(&mut OsRng, 1024).unwrap());
    static MALLORY: LazyLock<RsaPrivateKey> =
        LazyLock::new(|| RsaPrivateKey::new(&mut OsRng, 1024).unwrap());

    #[test]
    fn test_seal_and_open() {
        let sealed = encrypt(b"hello from c1", &ALICE.to_public_key()).unwrap();

        assert_eq!(sealed.ciphertext.len(), NONCE_SIZE + 13 + TAG_SIZE);
        assert_eq!(
            decrypt(&sealed.wrapped_key, &sealed.ciphertext, &ALICE).unwrap(),
            b"hello from c1"
        );
    }

    #[test]
    fn test_empty_plaintext() {
        let sealed = encrypt(b"", &ALICE.to_public_key()).unwrap();
        assert!(
            decrypt(&sealed.wrapped_key, &sealed.ciphertext, &ALICE)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_each_message_uses_fresh_key_and_nonce() {
        let public = ALICE.to_public_key();
        let first = encrypt(b"same", &public).unwrap();
        let second = encrypt(b"same", &public).unwrap();

        assert_ne!(first.wrapped_key, second.wrapped_key);
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn test_wrong_private_key() {
        let sealed = encrypt(b"secret", &ALICE.to_public_key()).unwrap();
        assert_eq!(
            decrypt(&sealed.wrapped_key, &sealed.ciphertext, &MALLORY),
            Err(CipherError::KeyUnwrap)
        );
    }

    #[test]
    fn test_truncated_body() {
        let sealed = encrypt(b"secret", &ALICE.to_public_key()).unwrap();
        assert_eq!(
            decrypt(&sealed.wrapped_key, &sealed.ciphertext[..NONCE_SIZE], &ALICE),
            Err(CipherError::BodyDecryption)
        );
    }

    #[test]
    fn test_key_too_small_for_oaep() {
        // OAEP-SHA1 needs at least 2 * 20 + 2 + 32 bytes of modulus.
        let tiny = RsaPrivateKey::new(&mut OsRng, 512).unwrap();
        assert_eq!(
            encrypt(b"x", &tiny.to_public_key()),
            Err(CipherError::KeyWrap)
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_any_body_bit_flip_is_rejected(
            plaintext in proptest::collection::vec(any::<u8>(), 0..256),
            position in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let sealed = encrypt(&plaintext, &ALICE.to_public_key()).unwrap();
            let mut tampered = sealed.ciphertext.to_vec();
            let index = position.index(tampered.len());
            tampered[index] ^= 1 << bit;

            prop_assert_eq!(
                decrypt(&sealed.wrapped_key, &tampered, &ALICE),
                Err(CipherError::BodyDecryption)
            );
        }
    }
}
