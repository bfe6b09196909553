use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use murmur_identity::{IdentityProvider, PeerId, RsaPublicKey};
use murmur_pubsub::PubSub;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::NodeConfig;
use crate::contact::Contact;
use crate::error::{Error, Result};
use crate::event::{EventBus, EventHandler, NodeEvent, SubscriptionId};
use crate::presence::PresenceMonitor;
use crate::store::ContactStore;

/// State shared by a node, its contacts and their background tasks.
pub(crate) struct NodeContext<P, I> {
    pub(crate) config: NodeConfig,
    pub(crate) identity: I,
    pub(crate) pubsub: P,
    pub(crate) events: EventBus,
}

/// Registered contacts in insertion order.
pub(crate) type Registry<P, I> = Arc<RwLock<IndexMap<PeerId, Arc<Contact<P, I>>>>>;

/// A messaging node: the local identity, its contacts and presence tracking.
///
/// Contacts are keyed by peer identifier, at most one per correspondent.
/// Creating a node starts a presence poller that runs until
/// [`Node::shutdown`] or drop.
pub struct Node<P, I>
where
    P: PubSub,
    I: IdentityProvider,
{
    context: Arc<NodeContext<P, I>>,
    contacts: Registry<P, I>,
    pending: Arc<parking_lot::Mutex<HashSet<PeerId>>>,
    store: Option<Arc<dyn ContactStore>>,
    cancel: CancellationToken,
    presence: parking_lot::Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl<P, I> Node<P, I>
where
    P: PubSub,
    I: IdentityProvider,
{
    /// Creates a node and starts presence polling. Must be called from within
    /// a Tokio runtime.
    pub fn new(config: NodeConfig, identity: I, pubsub: P) -> Self {
        let events = EventBus::new(config.event_capacity);
        let context = Arc::new(NodeContext {
            config,
            identity,
            pubsub,
            events,
        });
        let contacts: Registry<P, I> = Arc::new(RwLock::new(IndexMap::new()));
        let cancel = CancellationToken::new();

        let monitor = PresenceMonitor::new(context.clone(), contacts.clone());
        let presence = tokio::spawn(monitor.run(cancel.clone()));

        info!(peer = %context.identity.peer_id(), "node started");

        Self {
            context,
            contacts,
            pending: Arc::default(),
            store: None,
            cancel,
            presence: parking_lot::Mutex::new(Some(presence)),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Attaches the store used by [`Node::save`] and [`Node::load`].
    #[must_use]
    pub fn with_store(mut self, store: impl ContactStore) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Identifier of the local peer.
    pub fn peer_id(&self) -> &PeerId {
        self.context.identity.peer_id()
    }

    /// Public half of the local keypair.
    pub fn public_key(&self) -> &RsaPublicKey {
        self.context.identity.public_key()
    }

    /// The node's configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.context.config
    }

    /// The overlay handle.
    pub fn pubsub(&self) -> &P {
        &self.context.pubsub
    }

    /// Opens a receiver of every event emitted from now on.
    pub fn events(&self) -> broadcast::Receiver<NodeEvent> {
        self.context.events.receiver()
    }

    /// Stream of every event emitted from now on. A consumer that falls more
    /// than `event_capacity` events behind skips the ones it missed.
    pub fn event_stream(&self) -> impl Stream<Item = NodeEvent> + Send + 'static {
        BroadcastStream::new(self.events()).filter_map(std::result::Result::ok)
    }

    /// Registers a synchronous event handler. Handlers run in subscription
    /// order on the emitting task.
    pub fn subscribe(&self, handler: impl EventHandler) -> SubscriptionId {
        self.context.events.subscribe(handler)
    }

    /// Removes a handler registered with [`Node::subscribe`].
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.context.events.unsubscribe(id)
    }

    /// Registers a contact and starts reading from it.
    ///
    /// No public key is needed up front; it is resolved on the first send.
    ///
    /// # Errors
    ///
    /// Fails if the node is shut down, the identifier is the node's own or
    /// already registered, or the overlay rejects the subscription. Nothing
    /// is registered on failure.
    pub async fn add_contact(
        &self,
        peer_id: impl Into<PeerId> + Send,
    ) -> Result<Arc<Contact<P, I>>> {
        self.ensure_running()?;

        let peer_id = peer_id.into();
        if &peer_id == self.peer_id() {
            return Err(Error::SelfContact(peer_id));
        }

        // The id is reserved while the subscription opens so a concurrent add
        // of the same peer fails without waiting on overlay I/O.
        let reservation = {
            let contacts = self.contacts.read().await;
            if contacts.contains_key(&peer_id) || !self.pending.lock().insert(peer_id.clone()) {
                return Err(Error::DuplicateContact(peer_id));
            }
            Reservation {
                pending: self.pending.clone(),
                peer_id: peer_id.clone(),
            }
        };

        let contact = Arc::new(Contact::open(self.context.clone(), peer_id.clone()).await?);

        {
            let mut contacts = self.contacts.write().await;
            // Shutdown drains the registry under this lock.
            if let Err(e) = self.ensure_running() {
                drop(contacts);
                contact.close().await;
                return Err(e);
            }
            contacts.insert(peer_id.clone(), contact.clone());
        }
        drop(reservation);

        info!(peer = %peer_id, "added contact");
        self.context
            .events
            .emit(NodeEvent::ContactAdded { peer_id });

        Ok(contact)
    }

    /// Closes and unregisters a contact.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ContactNotFound`] if no such contact exists.
    pub async fn delete_contact(&self, peer_id: &PeerId) -> Result<()> {
        self.ensure_running()?;

        let contact = self
            .contacts
            .write()
            .await
            .shift_remove(peer_id)
            .ok_or_else(|| Error::ContactNotFound(peer_id.clone()))?;

        contact.close().await;

        info!(peer = %peer_id, "deleted contact");
        self.context.events.emit(NodeEvent::ContactDeleted {
            peer_id: peer_id.clone(),
        });

        Ok(())
    }

    /// Looks up a contact.
    pub async fn contact(&self, peer_id: &PeerId) -> Option<Arc<Contact<P, I>>> {
        self.contacts.read().await.get(peer_id).cloned()
    }

    /// Snapshot of all contacts in insertion order.
    pub async fn contacts(&self) -> Vec<Arc<Contact<P, I>>> {
        self.contacts.read().await.values().cloned().collect()
    }

    /// Identifiers of all contacts in insertion order.
    pub async fn contact_ids(&self) -> Vec<PeerId> {
        self.contacts.read().await.keys().cloned().collect()
    }

    /// Persists the contact identifiers to the attached store.
    ///
    /// # Errors
    ///
    /// Fails if no store is attached or the store fails.
    pub async fn save(&self) -> Result<()> {
        let store = self.store.as_ref().ok_or(Error::StoreNotConfigured)?;
        let ids = self.contact_ids().await;

        store.save(&ids).await?;
        debug!(count = ids.len(), "saved contact list");
        Ok(())
    }

    /// Re-adds every contact from the attached store. Contacts already
    /// registered are skipped.
    ///
    /// Returns the number of contacts added.
    ///
    /// # Errors
    ///
    /// Fails if no store is attached, the store fails or a contact cannot be
    /// added. Contacts added before the failure stay registered.
    pub async fn load(&self) -> Result<usize> {
        let store = self.store.as_ref().ok_or(Error::StoreNotConfigured)?;
        let ids = store.load().await?;

        let mut added = 0;
        for peer_id in ids {
            match self.add_contact(peer_id).await {
                Ok(_) => added += 1,
                Err(Error::DuplicateContact(peer_id)) => {
                    debug!(peer = %peer_id, "contact already registered, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        info!(added, "loaded contact list");
        Ok(added)
    }

    /// Stops presence polling, closes every contact and shuts down the
    /// overlay. Idempotent; later operations fail with [`Error::Shutdown`].
    ///
    /// # Errors
    ///
    /// Fails if the overlay fails to shut down.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.cancel.cancel();
        let presence = self.presence.lock().take();
        if let Some(handle) = presence {
            if let Err(e) = handle.await {
                error!("presence task panicked: {e}");
            }
        }

        let contacts: Vec<_> = self.contacts.write().await.drain(..).collect();
        for (peer_id, contact) in contacts {
            contact.close().await;
            debug!(peer = %peer_id, "closed contact during shutdown");
        }

        self.context.pubsub.shutdown().await.map_err(|e| {
            warn!("overlay shutdown failed: {e}");
            Error::PubSub(e.to_string())
        })?;

        info!(peer = %self.peer_id(), "node shut down");
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(Error::Shutdown);
        }
        Ok(())
    }
}

/// Holds a peer id in the pending set until dropped.
struct Reservation {
    pending: Arc<parking_lot::Mutex<HashSet<PeerId>>>,
    peer_id: PeerId,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.peer_id);
    }
}

impl<P, I> Drop for Node<P, I>
where
    P: PubSub,
    I: IdentityProvider,
{
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<P, I> std::fmt::Debug for Node<P, I>
where
    P: PubSub,
    I: IdentityProvider,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("peer_id", self.peer_id())
            .field("config", &self.context.config)
            .field("pubsub", &self.context.pubsub)
            .field("events", &self.context.events)
            .finish_non_exhaustive()
    }
}
