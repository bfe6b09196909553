//! Directional topic names for a pair of peers.

use murmur_identity::PeerId;
use sha2::{Digest, Sha256};

/// Derives the topic carrying messages from `from` to `to`.
///
/// The name is the lowercase hex SHA-256 of `from:<from>,to:<to>`, so it is
/// deterministic and differs for each direction.
#[must_use]
pub fn derive_topic(from: &PeerId, to: &PeerId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"from:");
    hasher.update(from.as_str().as_bytes());
    hasher.update(b",to:");
    hasher.update(to.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

/// The two topics linking a local node to one correspondent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicPair {
    /// Topic the local node subscribes to.
    pub inbound: String,
    /// Topic the local node publishes to.
    pub outbound: String,
}

impl TopicPair {
    /// Builds the pair as seen from `local`.
    #[must_use]
    pub fn new(local: &PeerId, remote: &PeerId) -> Self {
        Self {
            inbound: derive_topic(remote, local),
            outbound: derive_topic(local, remote),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_known_vector() {
        // sha256("from:A,to:B")
        let expected = hex::encode(Sha256::digest(b"from:A,to:B"));
        assert_eq!(derive_topic(&PeerId::new("A"), &PeerId::new("B")), expected);
        assert_eq!(expected.len(), 64);
    }

    #[test]
    fn test_pairs_mirror_each_other() {
        let alice = PeerId::new("alice");
        let bob = PeerId::new("bob");

        let from_alice = TopicPair::new(&alice, &bob);
        let from_bob = TopicPair::new(&bob, &alice);

        assert_eq!(from_alice.inbound, from_bob.outbound);
        assert_eq!(from_alice.outbound, from_bob.inbound);
        assert_ne!(from_alice.inbound, from_alice.outbound);
    }

    proptest! {
        #[test]
        fn test_direction_matters(a in "[a-zA-Z0-9]{1,46}", b in "[a-zA-Z0-9]{1,46}") {
            prop_assume!(a != b);
            let a = PeerId::new(a);
            let b = PeerId::new(b);
            prop_assert_ne!(derive_topic(&a, &b), derive_topic(&b, &a));
        }

        #[test]
        fn test_output_is_lowercase_hex(a in ".*", b in ".*") {
            let topic = derive_topic(&PeerId::new(a), &PeerId::new(b));
            prop_assert_eq!(topic.len(), 64);
            prop_assert!(topic.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }
}
