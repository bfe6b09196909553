use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::Node`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Period between two presence polls.
    ///
    /// Presence is inferred from overlay topic membership and can lag
    /// reality; it is not a delivery guarantee.
    pub presence_interval: Duration,

    /// Bound of each contact's inbound queue. A full queue blocks the
    /// contact's reader rather than dropping messages.
    pub inbox_capacity: usize,

    /// Number of recently accepted envelopes remembered per contact to drop
    /// redeliveries and replays. `0` disables the check.
    pub replay_window: usize,

    /// Buffer of the broadcast channel behind [`crate::Node::events`].
    pub event_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            presence_interval: Duration::from_secs(4),
            inbox_capacity: 256,
            replay_window: 256,
            event_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: NodeConfig = serde_json::from_str(r#"{ "inbox_capacity": 8 }"#).unwrap();

        assert_eq!(config.inbox_capacity, 8);
        assert_eq!(config.presence_interval, Duration::from_secs(4));
        assert_eq!(config.replay_window, 256);
    }
}
