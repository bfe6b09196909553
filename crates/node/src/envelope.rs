//! Binary envelope carrying a sealed message on the overlay.
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! +------+----------------+---------+-----------------+------+
//! | kind | key length u32 | key ... | body length u32 | body |
//! +------+----------------+---------+-----------------+------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Largest key or body accepted in one envelope (16 MiB).
pub const MAX_FIELD_SIZE: usize = 16 * 1024 * 1024;

/// Fixed overhead of an encoded envelope.
pub const ENVELOPE_HEADER_SIZE: usize = 1 + 4 + 4;

/// Errors from building or parsing an envelope.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The input ended before a declared field.
    #[error("envelope truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the next field requires.
        needed: usize,
        /// Bytes left in the input.
        remaining: usize,
    },

    /// A message envelope has no wrapped key.
    #[error("message envelope has an empty key")]
    MissingKey,

    /// A message envelope has no body.
    #[error("message envelope has an empty body")]
    MissingBody,

    /// A field exceeds [`MAX_FIELD_SIZE`].
    #[error("envelope field of {size} bytes exceeds maximum of {max}")]
    FieldTooLarge {
        /// Declared field size.
        size: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Bytes remain after the body.
    #[error("{0} trailing bytes after envelope")]
    TrailingBytes(usize),
}

/// Discriminator of an envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    /// An encrypted user message.
    Message,
    /// A kind this version does not understand. Receivers drop these.
    Unknown(u8),
}

impl EnvelopeKind {
    const MESSAGE: u8 = 0x01;
}

impl From<u8> for EnvelopeKind {
    fn from(value: u8) -> Self {
        match value {
            Self::MESSAGE => Self::Message,
            other => Self::Unknown(other),
        }
    }
}

impl From<EnvelopeKind> for u8 {
    fn from(kind: EnvelopeKind) -> Self {
        match kind {
            EnvelopeKind::Message => EnvelopeKind::MESSAGE,
            EnvelopeKind::Unknown(value) => value,
        }
    }
}

/// A decoded envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    kind: EnvelopeKind,
    key: Bytes,
    body: Bytes,
}

impl Envelope {
    /// Builds a message envelope.
    ///
    /// # Errors
    ///
    /// Fails when either field is empty or larger than [`MAX_FIELD_SIZE`].
    pub fn message(key: Bytes, body: Bytes) -> Result<Self, EnvelopeError> {
        Self::new(EnvelopeKind::Message, key, body)
    }

    /// Builds an envelope of any kind.
    ///
    /// # Errors
    ///
    /// Fails when a field is larger than [`MAX_FIELD_SIZE`], or when a
    /// message envelope has an empty field.
    pub fn new(kind: EnvelopeKind, key: Bytes, body: Bytes) -> Result<Self, EnvelopeError> {
        // `Unknown` may carry a known discriminator; fold it to match decode.
        let kind = EnvelopeKind::from(u8::from(kind));
        check_size(key.len())?;
        check_size(body.len())?;

        if kind == EnvelopeKind::Message {
            if key.is_empty() {
                return Err(EnvelopeError::MissingKey);
            }
            if body.is_empty() {
                return Err(EnvelopeError::MissingBody);
            }
        }

        Ok(Self { kind, key, body })
    }

    /// The envelope kind.
    #[must_use]
    pub const fn kind(&self) -> EnvelopeKind {
        self.kind
    }

    /// The wrapped symmetric key.
    #[must_use]
    pub const fn key(&self) -> &Bytes {
        &self.key
    }

    /// The sealed body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Size of the encoded form.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        ENVELOPE_HEADER_SIZE + self.key.len() + self.body.len()
    }

    /// Serialises the envelope.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self) -> Bytes {
        // Field sizes are bounded by MAX_FIELD_SIZE, which fits in a u32.
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.kind.into());
        buf.put_u32(self.key.len() as u32);
        buf.put_slice(&self.key);
        buf.put_u32(self.body.len() as u32);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// Parses an envelope, rejecting truncated input and trailing bytes.
    ///
    /// # Errors
    ///
    /// See [`EnvelopeError`].
    pub fn decode(data: &[u8]) -> Result<Self, EnvelopeError> {
        let mut buf = data;

        ensure_remaining(buf.remaining(), 1)?;
        let kind = EnvelopeKind::from(buf.get_u8());
        let key = read_field(&mut buf)?;
        let body = read_field(&mut buf)?;

        if buf.has_remaining() {
            return Err(EnvelopeError::TrailingBytes(buf.remaining()));
        }

        Self::new(kind, key, body)
    }
}

const fn check_size(size: usize) -> Result<(), EnvelopeError> {
    if size > MAX_FIELD_SIZE {
        return Err(EnvelopeError::FieldTooLarge {
            size,
            max: MAX_FIELD_SIZE,
        });
    }
    Ok(())
}

const fn ensure_remaining(remaining: usize, needed: usize) -> Result<(), EnvelopeError> {
    if remaining < needed {
        return Err(EnvelopeError::Truncated { needed, remaining });
    }
    Ok(())
}

fn read_field(buf: &mut &[u8]) -> Result<Bytes, EnvelopeError> {
    ensure_remaining(buf.remaining(), 4)?;
    let len = buf.get_u32() as usize;
    check_size(len)?;
    ensure_remaining(buf.remaining(), len)?;
    Ok(buf.copy_to_bytes(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn sample() -> Envelope {
        Envelope::message(Bytes::from_static(b"key"), Bytes::from_static(b"body")).unwrap()
    }

    #[test]
    fn test_wire_layout() {
        let encoded = sample().encode();
        assert_eq!(
            encoded.as_ref(),
            b"\x01\x00\x00\x00\x03key\x00\x00\x00\x04body".as_slice()
        );
        assert_eq!(encoded.len(), sample().encoded_len());
    }

    #[test]
    fn test_decode_sample() {
        let decoded = Envelope::decode(&sample().encode()).unwrap();
        assert_eq!(decoded, sample());
        assert_eq!(decoded.kind(), EnvelopeKind::Message);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(
            Envelope::decode(&[]),
            Err(EnvelopeError::Truncated {
                needed: 1,
                remaining: 0
            })
        );
    }

    #[test]
    fn test_declared_length_beyond_input() {
        let data = b"\x01\x00\x00\x00\x09key";
        assert_eq!(
            Envelope::decode(data),
            Err(EnvelopeError::Truncated {
                needed: 9,
                remaining: 3
            })
        );
    }

    #[test]
    fn test_oversized_field_rejected_before_reading() {
        let data = b"\x01\xff\xff\xff\xff";
        assert!(matches!(
            Envelope::decode(data),
            Err(EnvelopeError::FieldTooLarge { .. })
        ));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut data = sample().encode().to_vec();
        data.push(0);
        assert_eq!(Envelope::decode(&data), Err(EnvelopeError::TrailingBytes(1)));
    }

    #[test]
    fn test_message_requires_key_and_body() {
        assert_eq!(
            Envelope::message(Bytes::new(), Bytes::from_static(b"body")),
            Err(EnvelopeError::MissingKey)
        );
        assert_eq!(
            Envelope::message(Bytes::from_static(b"key"), Bytes::new()),
            Err(EnvelopeError::MissingBody)
        );

        let data = b"\x01\x00\x00\x00\x00\x00\x00\x00\x04body";
        assert_eq!(Envelope::decode(data), Err(EnvelopeError::MissingKey));
    }

    #[test]
    fn test_unknown_kind_is_preserved() {
        let envelope = Envelope::new(EnvelopeKind::Unknown(0x7f), Bytes::new(), Bytes::new()).unwrap();
        let decoded = Envelope::decode(&envelope.encode()).unwrap();
        assert_eq!(decoded.kind(), EnvelopeKind::Unknown(0x7f));
    }

    #[test]
    fn test_unknown_with_known_discriminator_is_normalised() {
        let envelope = Envelope::new(
            EnvelopeKind::Unknown(0x01),
            Bytes::from_static(b"k"),
            Bytes::from_static(b"b"),
        )
        .unwrap();
        assert_eq!(envelope.kind(), EnvelopeKind::Message);
        assert_eq!(Envelope::decode(&envelope.encode()), Ok(envelope));

        assert_eq!(
            Envelope::new(EnvelopeKind::Unknown(0x01), Bytes::new(), Bytes::new()),
            Err(EnvelopeError::MissingKey)
        );
    }

    proptest! {
        #[test]
        fn test_decode_inverts_encode(
            kind in any::<u8>(),
            key in proptest::collection::vec(any::<u8>(), 0..32),
            body in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let built = Envelope::new(EnvelopeKind::Unknown(kind), key.into(), body.into());
            if let Ok(envelope) = built {
                prop_assert_eq!(Envelope::decode(&envelope.encode()), Ok(envelope));
            } else {
                prop_assert_eq!(kind, 0x01);
            }
        }

        #[test]
        fn test_decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = Envelope::decode(&data);
        }

        #[test]
        fn test_every_strict_prefix_fails(
            key in proptest::collection::vec(any::<u8>(), 1..32),
            body in proptest::collection::vec(any::<u8>(), 1..64),
        ) {
            let encoded = Envelope::message(key.into(), body.into()).unwrap().encode();
            for end in 0..encoded.len() {
                prop_assert!(Envelope::decode(&encoded[..end]).is_err());
            }
        }
    }
}
