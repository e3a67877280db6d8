//! The `client` module defines the subscriber side of the broadcaster.
//!
//! - `pubsub_client`: the registry-side [`Subscriber`] (bounded outbound
//!   queue plus close handle) and the [`SubscriberHandle`] handed back to
//!   collaborators.
//! - `session`: the per-connection [`Session`] that drains the queue onto a
//!   [`Connection`] and unregisters itself when it stops.

pub mod pubsub_client;
pub mod session;

pub use pubsub_client::{CloseHandle, Enqueue, Subscriber, SubscriberHandle, SubscriberId};
pub use session::{CloseReason, Connection, Session, SessionState};

#[cfg(test)]
mod tests;
