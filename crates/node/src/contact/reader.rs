use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use murmur_identity::{IdentityProvider, PeerId};
use murmur_pubsub::{Message, PubSub, Subscription};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{CloseReason, ContactState, InboundMessage};
use crate::cipher;
use crate::envelope::{Envelope, EnvelopeKind};
use crate::event::NodeEvent;
use crate::node::NodeContext;

/// Digests of recently accepted envelopes.
pub(super) struct ReplayWindow {
    seen: Option<LruCache<[u8; 32], ()>>,
}

impl ReplayWindow {
    /// A window of `capacity` entries; zero disables it.
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            seen: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    fn digest(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn contains(&self, digest: &[u8; 32]) -> bool {
        self.seen
            .as_ref()
            .is_some_and(|seen| seen.contains(digest))
    }

    fn insert(&mut self, digest: [u8; 32]) {
        if let Some(seen) = self.seen.as_mut() {
            seen.put(digest, ());
        }
    }
}

enum Exit {
    Cancelled,
    Transport(String),
}

/// Background consumer of a contact's inbound subscription.
pub(super) struct Reader<P, I>
where
    P: PubSub,
    I: IdentityProvider,
{
    pub(super) peer_id: PeerId,
    pub(super) context: Arc<NodeContext<P, I>>,
    pub(super) subscription: P::Subscription,
    pub(super) sender: mpsc::Sender<InboundMessage>,
    pub(super) cancel: CancellationToken,
    pub(super) state: Arc<watch::Sender<ContactState>>,
    pub(super) replay: ReplayWindow,
}

impl<P, I> Reader<P, I>
where
    P: PubSub,
    I: IdentityProvider,
{
    pub(super) async fn run(mut self) {
        let exit = loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break Exit::Cancelled,
                next = self.subscription.next() => next,
            };

            match next {
                Ok(message) => {
                    if self.handle(message).await.is_break() {
                        break Exit::Cancelled;
                    }
                }
                Err(e) => break Exit::Transport(e.to_string()),
            }
        };

        if let Err(e) = self.subscription.unsubscribe().await {
            debug!(peer = %self.peer_id, "unsubscribe after reader exit failed: {e}");
        }

        match exit {
            Exit::Cancelled => debug!(peer = %self.peer_id, "contact reader stopped"),
            Exit::Transport(reason) => {
                warn!(peer = %self.peer_id, %reason, "contact subscription failed");

                let reason_for_state = reason.clone();
                let failed = self.state.send_if_modified(move |state| {
                    if state.is_closed() {
                        false
                    } else {
                        *state = ContactState::Closed(CloseReason::Transport(reason_for_state));
                        true
                    }
                });

                if failed {
                    self.context.events.emit(NodeEvent::ContactFailed {
                        peer_id: self.peer_id.clone(),
                        reason,
                    });
                }
            }
        }
    }

    /// Processes one overlay message. Breaks when the contact is closing.
    async fn handle(&mut self, message: Message) -> ControlFlow<()> {
        if message.from != self.peer_id {
            debug!(peer = %self.peer_id, from = %message.from, "dropping message from foreign sender");
            return ControlFlow::Continue(());
        }

        let digest = ReplayWindow::digest(&message.data);
        if self.replay.contains(&digest) {
            debug!(peer = %self.peer_id, "dropping replayed envelope");
            return ControlFlow::Continue(());
        }

        let Some(plaintext) = self.open(&message.data) else {
            return ControlFlow::Continue(());
        };
        self.replay.insert(digest);

        let inbound = InboundMessage {
            from: self.peer_id.clone(),
            data: plaintext,
        };
        debug!(peer = %self.peer_id, size = inbound.data.len(), "received message");
        self.context
            .events
            .emit(NodeEvent::MessageReceived(inbound.clone()));

        // A full queue applies backpressure to the subscription, but must not
        // keep the reader alive once the contact is closing.
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => ControlFlow::Break(()),
            sent = self.sender.send(inbound) => {
                if sent.is_err() {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        }
    }

    /// Decodes and decrypts an envelope, logging and discarding failures.
    fn open(&self, data: &[u8]) -> Option<Bytes> {
        let envelope = match Envelope::decode(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(peer = %self.peer_id, "dropping undecodable envelope: {e}");
                return None;
            }
        };

        if let EnvelopeKind::Unknown(kind) = envelope.kind() {
            debug!(peer = %self.peer_id, kind, "dropping envelope of unknown kind");
            return None;
        }

        match cipher::decrypt(
            envelope.key(),
            envelope.body(),
            self.context.identity.private_key(),
        ) {
            Ok(plaintext) => Some(Bytes::from(plaintext)),
            Err(e) => {
                debug!(peer = %self.peer_id, "dropping envelope that failed to decrypt: {e}");
                None
            }
        }
    }
}
