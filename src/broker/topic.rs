//! Topic management
//!
//! A `Topic` holds the live subscribers registered under one topic name.
//! Subscribers are keyed by id, so registering the same id twice is a no-op
//! and removal hands the entry back to the caller exactly once.
//!
//! Concurrency note: callers must synchronize access to `Topic` (the broker
//! keeps every topic behind its registry lock).

use std::collections::HashMap;

use crate::client::{Subscriber, SubscriberId};

#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub subscribers: HashMap<SubscriberId, Subscriber>,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashMap::new(),
        }
    }

    /// Add a subscriber to the topic. Duplicate adds are ignored.
    pub fn subscribe(&mut self, subscriber: Subscriber) {
        self.subscribers.entry(subscriber.id).or_insert(subscriber);
    }

    /// Remove a subscriber from the topic, returning it if it was present.
    pub fn unsubscribe(&mut self, id: &SubscriberId) -> Option<Subscriber> {
        self.subscribers.remove(id)
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
