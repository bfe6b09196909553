//! Periodic presence polling of registered contacts.

use std::collections::HashMap;
use std::sync::Arc;

use murmur_identity::{IdentityProvider, PeerId};
use murmur_pubsub::PubSub;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::event::NodeEvent;
use crate::node::{NodeContext, Registry};

/// Emits online and offline events for contacts.
///
/// The first observation of a contact always emits; after that only changes
/// do.
pub(crate) struct PresenceMonitor<P, I>
where
    P: PubSub,
    I: IdentityProvider,
{
    context: Arc<NodeContext<P, I>>,
    contacts: Registry<P, I>,
    last_seen: HashMap<PeerId, bool>,
}

impl<P, I> PresenceMonitor<P, I>
where
    P: PubSub,
    I: IdentityProvider,
{
    pub(crate) fn new(context: Arc<NodeContext<P, I>>, contacts: Registry<P, I>) -> Self {
        Self {
            context,
            contacts,
            last_seen: HashMap::new(),
        }
    }

    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        let mut poll_interval = interval(self.context.config.presence_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = poll_interval.tick() => self.poll().await,
                () = cancel.cancelled() => {
                    info!("presence monitoring stopped");
                    break;
                }
            }
        }
    }

    async fn poll(&mut self) {
        // Snapshot so the registry lock is not held across overlay queries.
        let contacts: Vec<_> = self.contacts.read().await.values().cloned().collect();

        for contact in &contacts {
            let online = contact.is_online().await;
            let previous = self.last_seen.insert(contact.peer_id().clone(), online);

            if previous == Some(online) {
                continue;
            }

            let peer_id = contact.peer_id().clone();
            debug!(peer = %peer_id, online, "contact presence changed");
            self.context.events.emit(if online {
                NodeEvent::ContactOnline { peer_id }
            } else {
                NodeEvent::ContactOffline { peer_id }
            });
        }

        self.last_seen
            .retain(|peer_id, _| contacts.iter().any(|contact| contact.peer_id() == peer_id));
    }
}
