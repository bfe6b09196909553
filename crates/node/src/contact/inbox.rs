use std::sync::Arc;

use futures::Stream;
use murmur_identity::PeerId;
use tokio::sync::{Mutex, mpsc, watch};

use super::{CloseReason, ContactState, InboundMessage};
use crate::error::{Error, Result};

/// Consuming end of a contact's inbound queue.
///
/// Clones share one queue: each message goes to exactly one reader.
#[derive(Clone, Debug)]
pub struct Inbox {
    peer_id: PeerId,
    receiver: Arc<Mutex<mpsc::Receiver<InboundMessage>>>,
    state: watch::Receiver<ContactState>,
}

impl Inbox {
    pub(super) fn new(
        peer_id: PeerId,
        receiver: mpsc::Receiver<InboundMessage>,
        state: watch::Receiver<ContactState>,
    ) -> Self {
        Self {
            peer_id,
            receiver: Arc::new(Mutex::new(receiver)),
            state,
        }
    }

    /// Waits for the next message.
    ///
    /// After an explicit close this fails immediately. After a transport
    /// failure, messages already queued are still returned before it fails.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ContactClosed`] as described above.
    pub async fn recv(&self) -> Result<InboundMessage> {
        if self.closed_by_request() {
            return Err(Error::ContactClosed(self.peer_id.clone()));
        }

        let message = self.receiver.lock().await.recv().await;

        match message {
            Some(message) if !self.closed_by_request() => Ok(message),
            _ => Err(Error::ContactClosed(self.peer_id.clone())),
        }
    }

    /// Turns the inbox into a stream that ends when the contact closes.
    pub fn into_stream(self) -> impl Stream<Item = InboundMessage> + Send {
        futures::stream::unfold(self, |inbox| async move {
            let message = inbox.recv().await.ok()?;
            Some((message, inbox))
        })
    }

    fn closed_by_request(&self) -> bool {
        matches!(
            *self.state.borrow(),
            ContactState::Closed(CloseReason::Requested)
        )
    }
}
