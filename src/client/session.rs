//! Subscriber session
//!
//! A [`Session`] owns the outbound side of one live connection: it registers a
//! subscriber with the [`Broker`], drains the subscriber's queue onto the
//! connection, and tears everything down exactly once when it stops.
//!
//! The session never reads from the connection. Whoever owns the read side
//! must keep consuming control frames and cancel the `closed` token passed to
//! [`Session::run`] when the peer goes away.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::broker::{Broker, Registration};
use crate::client::SubscriberHandle;
use crate::utils::error::{BoxError, SessionError};

/// Why the core is closing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Normal,
    /// Evicted for not keeping up with published messages.
    TooSlow,
    Error,
}

impl CloseReason {
    fn for_result(result: &Result<(), SessionError>) -> Self {
        match result {
            Ok(()) => CloseReason::Normal,
            Err(SessionError::Evicted) => CloseReason::TooSlow,
            Err(SessionError::Cancelled | SessionError::Unregistered) => CloseReason::Normal,
            Err(_) => CloseReason::Error,
        }
    }
}

/// The outbound half of a duplex connection, as seen by the core.
pub trait Connection: Send + 'static {
    /// Writes one payload. The session applies the deadline.
    fn write(&mut self, payload: Bytes) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Starts the close handshake. Errors are ignored by the caller.
    fn close(&mut self, reason: CloseReason) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Registered,
    Draining,
    Terminating,
    Unregistered,
}

pub struct Session<C> {
    broker: Arc<Broker>,
    handle: SubscriberHandle,
    queue: mpsc::Receiver<Bytes>,
    evicted: CancellationToken,
    conn: C,
    write_timeout: Duration,
    state: SessionState,
}

impl<C: Connection> Session<C> {
    /// Registers `conn` under `topic` with the broker's default queue size.
    pub fn register(broker: Arc<Broker>, topic: &str, conn: C) -> Self {
        let capacity = broker.settings().subscriber_buffer;
        Self::register_with_capacity(broker, topic, capacity, conn)
    }

    pub fn register_with_capacity(
        broker: Arc<Broker>,
        topic: &str,
        capacity: usize,
        conn: C,
    ) -> Self {
        let evicted = CancellationToken::new();
        let close_slow = evicted.clone();
        let Registration { handle, queue } =
            broker.register_with_capacity(topic, capacity, move || close_slow.cancel());
        let write_timeout = broker.write_timeout();

        Self {
            broker,
            handle,
            queue,
            evicted,
            conn,
            write_timeout,
            state: SessionState::Registered,
        }
    }

    pub fn handle(&self) -> &SubscriberHandle {
        &self.handle
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// Drains queued payloads onto the connection until the session ends,
    /// then unregisters and closes the connection.
    ///
    /// Always returns an error describing why draining stopped; callers decide
    /// which ones are worth logging (see [`SessionError::is_expected`]).
    pub async fn run(&mut self, closed: CancellationToken) -> Result<(), SessionError> {
        if self.state == SessionState::Unregistered {
            return Err(SessionError::Terminated);
        }

        self.state = SessionState::Draining;
        let result = self.drain(&closed).await;

        self.state = SessionState::Terminating;
        self.broker.unregister(&self.handle);
        let reason = CloseReason::for_result(&result);
        self.conn.close(reason).await;
        self.state = SessionState::Unregistered;

        match &result {
            Err(e) if e.is_expected() => {
                debug!(subscriber = %self.handle.id, topic = %self.handle.topic, "session ended: {e}")
            }
            Err(e) => {
                warn!(subscriber = %self.handle.id, topic = %self.handle.topic, "session ended: {e}")
            }
            Ok(()) => {}
        }
        result
    }

    async fn drain(&mut self, closed: &CancellationToken) -> Result<(), SessionError> {
        loop {
            tokio::select! {
                biased;

                _ = closed.cancelled() => return Err(SessionError::Cancelled),

                _ = self.evicted.cancelled() => return Err(SessionError::Evicted),

                msg = self.queue.recv() => match msg {
                    Some(payload) => self.write(payload, closed).await?,
                    None => return Err(SessionError::Unregistered),
                },
            }
        }
    }

    /// One write under the deadline. Cancellation and eviction abort it.
    async fn write(
        &mut self,
        payload: Bytes,
        closed: &CancellationToken,
    ) -> Result<(), SessionError> {
        let deadline = self.write_timeout;
        tokio::select! {
            biased;

            _ = closed.cancelled() => Err(SessionError::Cancelled),

            _ = self.evicted.cancelled() => Err(SessionError::Evicted),

            res = timeout(deadline, self.conn.write(payload)) => match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(SessionError::Write(e)),
                Err(_) => Err(SessionError::WriteTimeout(deadline)),
            },
        }
    }
}
