use crate::Error;
use crate::interest::InterestTracker;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use murmur_pubsub::{Message, Subscription};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// A subscription to a topic of a [`crate::MemoryNetwork`].
///
/// Dropping the subscription removes its interest from the network.
pub struct MemorySubscription {
    id: Uuid,
    topic: String,
    receiver: mpsc::Receiver<Message>,
    interests: Arc<InterestTracker>,
    unsubscribed: bool,
}

impl MemorySubscription {
    pub(crate) const fn new(
        id: Uuid,
        topic: String,
        receiver: mpsc::Receiver<Message>,
        interests: Arc<InterestTracker>,
    ) -> Self {
        Self {
            id,
            topic,
            receiver,
            interests,
            unsubscribed: false,
        }
    }
}

impl Debug for MemorySubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySubscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("unsubscribed", &self.unsubscribed)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    type Error = Error;

    fn topic(&self) -> &str {
        &self.topic
    }

    async fn next(&mut self) -> Result<Message, Error> {
        if self.unsubscribed {
            return Err(Error::Unsubscribed(self.topic.clone()));
        }

        self.receiver
            .recv()
            .await
            .ok_or_else(|| Error::Closed(self.topic.clone()))
    }

    async fn unsubscribe(&mut self) -> Result<(), Error> {
        if !self.unsubscribed {
            self.unsubscribed = true;
            self.interests.remove(&self.topic, self.id);
            self.receiver.close();
            debug!(topic = %self.topic, "unsubscribed");
        }

        Ok(())
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        if !self.unsubscribed {
            self.interests.remove(&self.topic, self.id);
        }
    }
}
