//! A live encrypted session with one correspondent.

mod inbox;
mod reader;

pub use inbox::Inbox;

use std::sync::Arc;

use bytes::Bytes;
use murmur_identity::{IdentityProvider, PeerId};
use murmur_pubsub::PubSub;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cipher;
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::event::NodeEvent;
use crate::node::NodeContext;
use crate::topic::TopicPair;
use reader::{Reader, ReplayWindow};

/// A decrypted message from a correspondent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// The correspondent, as authenticated by the overlay.
    pub from: PeerId,
    /// The plaintext.
    pub data: Bytes,
}

/// Why a contact stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// [`Contact::close`] was called, directly or through the node.
    Requested,
    /// The inbound subscription failed.
    Transport(String),
}

/// Lifecycle of a [`Contact`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContactState {
    /// Constructed, not yet subscribed.
    Created,
    /// Subscribed to the inbound topic.
    Subscribed,
    /// The background reader is running.
    Reading,
    /// Terminal.
    Closed(CloseReason),
}

impl ContactState {
    /// Whether the state is terminal.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// Session with one correspondent over a pair of directional topics.
///
/// A background reader consumes the inbound topic for as long as the contact
/// is open, keeping only envelopes sent by the correspondent that decrypt
/// with the local key. Messages wait in a bounded queue until read.
pub struct Contact<P, I>
where
    P: PubSub,
    I: IdentityProvider,
{
    peer_id: PeerId,
    topics: TopicPair,
    context: Arc<NodeContext<P, I>>,
    inbox: Inbox,
    state: Arc<watch::Sender<ContactState>>,
    cancel: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl<P, I> Contact<P, I>
where
    P: PubSub,
    I: IdentityProvider,
{
    /// Subscribes to the inbound topic and starts the reader.
    pub(crate) async fn open(context: Arc<NodeContext<P, I>>, peer_id: PeerId) -> Result<Self> {
        let topics = TopicPair::new(context.identity.peer_id(), &peer_id);
        let state = Arc::new(watch::Sender::new(ContactState::Created));

        let subscription = context
            .pubsub
            .subscribe(&topics.inbound)
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))?;

        state.send_replace(ContactState::Subscribed);
        info!(peer = %peer_id, topic = %topics.inbound, "subscribed to contact");
        context.events.emit(NodeEvent::Subscribed {
            peer_id: peer_id.clone(),
            topic: topics.inbound.clone(),
        });

        let (sender, receiver) = mpsc::channel(context.config.inbox_capacity.max(1));
        let cancel = CancellationToken::new();

        let reader = Reader {
            peer_id: peer_id.clone(),
            context: context.clone(),
            subscription,
            sender,
            cancel: cancel.clone(),
            state: state.clone(),
            replay: ReplayWindow::new(context.config.replay_window),
        };

        state.send_replace(ContactState::Reading);
        let handle = tokio::spawn(reader.run());

        Ok(Self {
            inbox: Inbox::new(peer_id.clone(), receiver, state.subscribe()),
            peer_id,
            topics,
            context,
            state,
            cancel,
            reader: Mutex::new(Some(handle)),
        })
    }

    /// The correspondent.
    #[must_use]
    pub const fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Topic this node listens on for the correspondent's messages.
    #[must_use]
    pub fn inbound_topic(&self) -> &str {
        &self.topics.inbound
    }

    /// Topic this node publishes on for the correspondent.
    #[must_use]
    pub fn outbound_topic(&self) -> &str {
        &self.topics.outbound
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ContactState {
        self.state.borrow().clone()
    }

    /// Encrypts `plaintext` to the correspondent and publishes it.
    ///
    /// Delivery is fire-and-forget: success means the overlay accepted the
    /// envelope, not that it was read.
    ///
    /// # Errors
    ///
    /// Fails if the contact is closed, the correspondent's key is unknown,
    /// encryption fails or the overlay rejects the publish.
    pub async fn send(&self, plaintext: impl AsRef<[u8]> + Send) -> Result<()> {
        self.ensure_open()?;

        let public_key = self
            .context
            .identity
            .public_key_of(&self.peer_id)
            .await
            .map_err(|_| Error::PublicKeyUnavailable(self.peer_id.clone()))?;

        let sealed = cipher::encrypt(plaintext.as_ref(), &public_key)?;
        let envelope = Envelope::message(sealed.wrapped_key, sealed.ciphertext)?.encode();

        self.context
            .pubsub
            .publish(&self.topics.outbound, envelope.clone())
            .await
            .map_err(|e| Error::Publish(e.to_string()))?;

        debug!(peer = %self.peer_id, size = envelope.len(), "sent message");
        self.context.events.emit(NodeEvent::MessageSent {
            to: self.peer_id.clone(),
            envelope,
        });

        Ok(())
    }

    /// Whether the correspondent is currently subscribed to the outbound
    /// topic.
    pub async fn is_online(&self) -> bool {
        self.connected_peers().await.contains(&self.peer_id)
    }

    /// Peers the overlay reports on the outbound topic.
    pub async fn connected_peers(&self) -> Vec<PeerId> {
        self.context.pubsub.list_peers(&self.topics.outbound).await
    }

    /// Waits for the next message from the correspondent.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ContactClosed`] once the contact is closed and, for
    /// a transport failure, its queue has drained.
    pub async fn read(&self) -> Result<InboundMessage> {
        self.inbox.recv().await
    }

    /// A cloneable handle on the inbound queue.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ContactClosed`] if the contact was closed.
    pub fn inbox(&self) -> Result<Inbox> {
        if self.state.borrow().is_closed() {
            return Err(Error::ContactClosed(self.peer_id.clone()));
        }
        Ok(self.inbox.clone())
    }

    /// Stops the reader and unsubscribes. Idempotent.
    pub async fn close(&self) {
        let changed = self.state.send_if_modified(|state| {
            if state.is_closed() {
                false
            } else {
                *state = ContactState::Closed(CloseReason::Requested);
                true
            }
        });
        self.cancel.cancel();

        if let Some(handle) = self.reader.lock().await.take() {
            if let Err(e) = handle.await {
                error!(peer = %self.peer_id, "contact reader panicked: {e}");
            }
        }

        if changed {
            info!(peer = %self.peer_id, "closed contact");
        }
    }

    /// Resolves once the contact reaches [`ContactState::Closed`].
    pub async fn closed(&self) -> CloseReason {
        let mut receiver = self.state.subscribe();
        match receiver.wait_for(ContactState::is_closed).await {
            Ok(state) => match &*state {
                ContactState::Closed(reason) => reason.clone(),
                _ => CloseReason::Requested,
            },
            // The sender lives in `self`, so the channel cannot close first.
            Err(_) => CloseReason::Requested,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state.borrow().is_closed() {
            return Err(Error::ContactClosed(self.peer_id.clone()));
        }
        Ok(())
    }
}

impl<P, I> Drop for Contact<P, I>
where
    P: PubSub,
    I: IdentityProvider,
{
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<P, I> std::fmt::Debug for Contact<P, I>
where
    P: PubSub,
    I: IdentityProvider,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contact")
            .field("peer_id", &self.peer_id)
            .field("topics", &self.topics)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}
