//! Node lifecycle events and the bus that delivers them.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use murmur_identity::PeerId;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::contact::InboundMessage;

/// Something that happened on a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeEvent {
    /// A contact was registered.
    ContactAdded {
        /// The correspondent.
        peer_id: PeerId,
    },

    /// A contact was removed.
    ContactDeleted {
        /// The correspondent.
        peer_id: PeerId,
    },

    /// A contact's inbound topic subscription is live.
    Subscribed {
        /// The correspondent.
        peer_id: PeerId,
        /// The inbound topic.
        topic: String,
    },

    /// A message was decrypted and is about to be queued.
    MessageReceived(InboundMessage),

    /// An envelope was published.
    MessageSent {
        /// The correspondent.
        to: PeerId,
        /// The encoded envelope as published.
        envelope: Bytes,
    },

    /// The correspondent was seen on the outbound topic.
    ContactOnline {
        /// The correspondent.
        peer_id: PeerId,
    },

    /// The correspondent is no longer seen on the outbound topic.
    ContactOffline {
        /// The correspondent.
        peer_id: PeerId,
    },

    /// A contact's subscription broke and its reader stopped.
    ContactFailed {
        /// The correspondent.
        peer_id: PeerId,
        /// Why the subscription broke.
        reason: String,
    },
}

impl NodeEvent {
    /// Stable name of the event kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ContactAdded { .. } => "contact:add",
            Self::ContactDeleted { .. } => "contact:delete",
            Self::Subscribed { .. } => "subscribed",
            Self::MessageReceived(_) => "message:received",
            Self::MessageSent { .. } => "message:sent",
            Self::ContactOnline { .. } => "contact:online",
            Self::ContactOffline { .. } => "contact:offline",
            Self::ContactFailed { .. } => "contact:failed",
        }
    }

    /// The correspondent the event concerns.
    #[must_use]
    pub const fn peer_id(&self) -> &PeerId {
        match self {
            Self::ContactAdded { peer_id }
            | Self::ContactDeleted { peer_id }
            | Self::Subscribed { peer_id, .. }
            | Self::ContactOnline { peer_id }
            | Self::ContactOffline { peer_id }
            | Self::ContactFailed { peer_id, .. } => peer_id,
            Self::MessageReceived(message) => &message.from,
            Self::MessageSent { to, .. } => to,
        }
    }
}

/// Receives node events synchronously, on the task that emitted them.
///
/// Handlers must return quickly; a slow handler delays the emitting task.
pub trait EventHandler: Send + Sync + 'static {
    /// Handles one event.
    fn handle(&self, event: &NodeEvent);
}

impl<F> EventHandler for F
where
    F: Fn(&NodeEvent) + Send + Sync + 'static,
{
    fn handle(&self, event: &NodeEvent) {
        self(event);
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Event counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventBusStats {
    /// Events emitted.
    pub total_events_published: u64,
    /// Handler invocations.
    pub total_handlers_invoked: u64,
}

/// Fans events out to ordered handlers and a broadcast channel.
///
/// Handlers run in subscription order, before broadcast receivers see the
/// event.
pub struct EventBus {
    handlers: RwLock<Vec<(SubscriptionId, Arc<dyn EventHandler>)>>,
    next_id: AtomicU64,
    sender: broadcast::Sender<NodeEvent>,
    stats: Mutex<EventBusStats>,
}

impl EventBus {
    /// Creates a bus whose broadcast channel buffers `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            sender,
            stats: Mutex::new(EventBusStats::default()),
        }
    }

    /// Registers a handler.
    pub fn subscribe(&self, handler: impl EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.write();
        handlers.push((id, Arc::new(handler)));
        debug!(total = handlers.len(), "event handler subscribed");
        id
    }

    /// Removes a handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        before != handlers.len()
    }

    /// Opens a new broadcast receiver. Slow receivers observe
    /// [`broadcast::error::RecvError::Lagged`] rather than blocking emitters.
    #[must_use]
    pub fn receiver(&self) -> broadcast::Receiver<NodeEvent> {
        self.sender.subscribe()
    }

    /// Delivers an event to every handler, then to broadcast receivers.
    pub fn emit(&self, event: NodeEvent) {
        trace!(event = event.name(), peer = %event.peer_id(), "emitting event");

        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let handlers: Vec<_> = self
            .handlers
            .read()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        for handler in &handlers {
            handler.handle(&event);
        }

        {
            let mut stats = self.stats.lock();
            stats.total_events_published += 1;
            stats.total_handlers_invoked += handlers.len() as u64;
        }

        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> EventBusStats {
        self.stats.lock().clone()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.read().len())
            .field("receivers", &self.sender.receiver_count())
            .finish_non_exhaustive()
    }
}
