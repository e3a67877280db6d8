use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Unique identifier of a subscriber (one per accepted connection).
pub type SubscriberId = Uuid;

/// One-shot capability that forcibly terminates a subscriber's connection.
pub type CloseHandle = Box<dyn FnOnce() + Send + 'static>;

/// Registry-side state of a live subscriber.
///
/// Holds the only sending half of the subscriber's outbound queue, so removing
/// a `Subscriber` from its topic closes the queue exactly once.
pub struct Subscriber {
    pub id: SubscriberId,
    pub topic: String,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<Bytes>,
    close_slow: CloseHandle,
}

/// Outcome of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// The queue is at capacity; the subscriber cannot keep up.
    Full,
    /// The draining side is gone.
    Closed,
}

impl Subscriber {
    /// Creates a subscriber for `topic` with a queue of `capacity` payloads,
    /// clamped to what a tokio channel accepts. Returns the receiving half for
    /// the drain loop.
    pub fn new(
        topic: &str,
        capacity: usize,
        close_slow: CloseHandle,
    ) -> (Self, mpsc::Receiver<Bytes>) {
        let (sender, receiver) = mpsc::channel(capacity.clamp(1, Semaphore::MAX_PERMITS));
        let subscriber = Self {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            connected_at: Utc::now(),
            sender,
            close_slow,
        };
        (subscriber, receiver)
    }

    pub fn handle(&self) -> SubscriberHandle {
        SubscriberHandle {
            id: self.id,
            topic: self.topic.clone(),
        }
    }

    /// Tries to queue `payload` without waiting.
    pub fn try_enqueue(&self, payload: Bytes) -> Enqueue {
        match self.sender.try_send(payload) {
            Ok(()) => Enqueue::Queued,
            Err(TrySendError::Full(_)) => Enqueue::Full,
            Err(TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }

    /// Consumes the subscriber and hands back its close handle, dropping the
    /// queue sender on the way out.
    pub fn into_close_handle(self) -> CloseHandle {
        self.close_slow
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("connected_at", &self.connected_at)
            .field("queued", &(self.sender.max_capacity() - self.sender.capacity()))
            .finish()
    }
}

/// What collaborators keep to refer to a registered subscriber: the topic key
/// and the id, never the registry itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberHandle {
    pub id: SubscriberId,
    pub topic: String,
}
