//! Broker engine
//!
//! The registry at the heart of the broadcaster. It is responsible for:
//! - mapping topics to the subscribers currently registered under them
//! - fanning a published payload out to every subscriber of its topic
//! - evicting subscribers whose outbound queue is full
//! - gating publishes through the process-wide [`PublishLimiter`]
//!
//! Concurrency and usage notes:
//! - All registry state sits behind a single mutex. Registration,
//!   unregistration and dispatch-time eviction are therefore mutually
//!   exclusive, and none of them ever awaits while holding the lock.
//! - Fan-out only performs a bounded `try_send` per subscriber, so a slow
//!   consumer costs one failed enqueue, never a stalled publisher.
//! - The limiter is awaited before the lock is taken.
//! - The broker is meant to be constructed once and shared as `Arc<Broker>`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::limiter::PublishLimiter;
use crate::broker::message::Message;
use crate::broker::topic::Topic;
use crate::client::{CloseHandle, Enqueue, Subscriber, SubscriberHandle};
use crate::config::BrokerSettings;

/// A freshly registered subscriber: the handle to unregister it with and the
/// receiving half of its outbound queue.
#[derive(Debug)]
pub struct Registration {
    pub handle: SubscriberHandle,
    pub queue: mpsc::Receiver<Bytes>,
}

/// What a single fan-out did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dispatch {
    pub delivered: usize,
    pub evicted: usize,
}

#[derive(Debug)]
pub struct Broker {
    topics: Mutex<HashMap<String, Topic>>,
    limiter: Option<PublishLimiter>,
    settings: BrokerSettings,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(BrokerSettings::default())
    }
}

impl Broker {
    pub fn new(settings: BrokerSettings) -> Self {
        let limiter = (settings.publish_interval_ms > 0).then(|| {
            PublishLimiter::new(
                Duration::from_millis(settings.publish_interval_ms),
                settings.publish_burst,
            )
        });

        Self {
            topics: Mutex::new(HashMap::new()),
            limiter,
            settings,
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.write_timeout_ms)
    }

    pub fn limiter(&self) -> Option<&PublishLimiter> {
        self.limiter.as_ref()
    }

    // A panic while holding the lock cannot leave a topic half-updated, so a
    // poisoned registry is still usable.
    fn topics(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        self.topics.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a new subscriber under `topic` with the configured queue
    /// capacity. Automatically creates the topic if it doesn't exist.
    ///
    /// `close` is invoked at most once, if the subscriber is evicted for being
    /// too slow.
    pub fn register<F>(&self, topic: &str, close: F) -> Registration
    where
        F: FnOnce() + Send + 'static,
    {
        self.register_with_capacity(topic, self.settings.subscriber_buffer, close)
    }

    /// Same as [`Broker::register`] with an explicit queue capacity.
    pub fn register_with_capacity<F>(&self, topic: &str, capacity: usize, close: F) -> Registration
    where
        F: FnOnce() + Send + 'static,
    {
        let (subscriber, queue) = Subscriber::new(topic, capacity, Box::new(close));
        let handle = subscriber.handle();

        let mut topics = self.topics();
        let entry = topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic));
        entry.subscribe(subscriber);
        info!(
            subscriber = %handle.id,
            topic,
            subscribers = entry.len(),
            "subscriber registered"
        );

        Registration { handle, queue }
    }

    /// Removes a subscriber from its topic. Dropping the registry entry closes
    /// its outbound queue.
    ///
    /// Returns `false` when the subscriber was not registered (already
    /// unregistered or evicted), in which case nothing happens.
    pub fn unregister(&self, handle: &SubscriberHandle) -> bool {
        let removed = {
            let mut topics = self.topics();
            let removed = topics
                .get_mut(&handle.topic)
                .and_then(|topic| topic.unsubscribe(&handle.id));
            if removed.is_some() {
                self.prune(&mut topics, &handle.topic);
            }
            removed
        };

        match removed {
            Some(subscriber) => {
                info!(
                    subscriber = %handle.id,
                    topic = %handle.topic,
                    connected_for = ?(chrono::Utc::now() - subscriber.connected_at).to_std().ok(),
                    "subscriber unregistered"
                );
                true
            }
            None => false,
        }
    }

    /// Publishes `payload` to every subscriber of `topic`.
    ///
    /// Waits for the shared publish limiter first, so a publish storm slows
    /// its callers down instead of losing messages here. Delivery itself is
    /// best effort: subscribers that cannot keep up are evicted.
    ///
    /// Dropping the returned future while it waits on the limiter drops the
    /// message. Callers that may be cancelled use [`Broker::spawn_publish`].
    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>) {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
        self.dispatch(topic, payload.into());
    }

    /// Publishes an already assembled [`Message`].
    pub async fn publish_message(&self, msg: Message) {
        self.publish(&msg.topic, msg.payload).await;
    }

    /// Publishes on a detached task. The message goes out even if the caller
    /// stops waiting on the returned handle; awaiting it still applies the
    /// limiter's backpressure to the caller.
    pub fn spawn_publish(
        self: &Arc<Self>,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> JoinHandle<()> {
        let broker = Arc::clone(self);
        let msg = Message::new(topic, payload);
        tokio::spawn(async move { broker.publish_message(msg).await })
    }

    /// Fans `payload` out to the current subscribers of `topic` without
    /// waiting on the limiter or on any subscriber.
    pub fn dispatch(&self, topic: &str, payload: Bytes) -> Dispatch {
        let mut report = Dispatch::default();
        let mut evicted = Vec::new();

        {
            let mut topics = self.topics();
            let Some(entry) = topics.get_mut(topic) else {
                debug!(topic, "publish to topic without subscribers");
                return report;
            };

            let mut stale = Vec::new();
            for (id, subscriber) in &entry.subscribers {
                match subscriber.try_enqueue(payload.clone()) {
                    Enqueue::Queued => report.delivered += 1,
                    Enqueue::Full => stale.push((*id, true)),
                    Enqueue::Closed => stale.push((*id, false)),
                }
            }

            for (id, too_slow) in stale {
                let Some(subscriber) = entry.unsubscribe(&id) else {
                    continue;
                };
                if too_slow {
                    warn!(subscriber = %id, topic, "evicting slow subscriber");
                    report.evicted += 1;
                    evicted.push(subscriber.into_close_handle());
                } else {
                    debug!(subscriber = %id, topic, "dropping subscriber with closed queue");
                }
            }

            self.prune(&mut topics, topic);
        }

        for close in evicted {
            spawn_close(close);
        }

        debug!(
            topic,
            delivered = report.delivered,
            evicted = report.evicted,
            "published"
        );
        report
    }

    /// Drops the topic entry once its last subscriber is gone, unless pruning
    /// is disabled.
    fn prune(&self, topics: &mut HashMap<String, Topic>, topic: &str) {
        if self.settings.prune_empty_topics && topics.get(topic).is_some_and(Topic::is_empty) {
            topics.remove(topic);
            debug!(topic, "pruned empty topic");
        }
    }

    pub fn is_registered(&self, handle: &SubscriberHandle) -> bool {
        self.topics()
            .get(&handle.topic)
            .is_some_and(|topic| topic.contains(&handle.id))
    }

    /// Number of topic entries currently held, including empty ones when
    /// pruning is disabled.
    pub fn topic_count(&self) -> usize {
        self.topics().len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics().get(topic).map_or(0, Topic::len)
    }

    pub fn total_subscribers(&self) -> usize {
        self.topics().values().map(Topic::len).sum()
    }
}

/// Runs a close handle off the publish path. Outside a runtime it is run
/// inline, which only happens in synchronous callers such as unit tests.
fn spawn_close(close: CloseHandle) {
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { close() });
        }
        Err(_) => close(),
    }
}
