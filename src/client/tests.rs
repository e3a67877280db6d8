use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::pubsub_client::{Enqueue, Subscriber};
use super::session::{CloseReason, Connection, Session, SessionState};
use crate::broker::Broker;
use crate::config::BrokerSettings;
use crate::utils::error::{BoxError, SessionError};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Accept,
    Stall,
    Fail,
}

/// In-memory connection recording what the session writes.
#[derive(Clone)]
struct TestConnection {
    mode: Mode,
    written: Arc<Mutex<Vec<Bytes>>>,
    closed_with: Arc<Mutex<Vec<CloseReason>>>,
    wrote: Arc<Notify>,
}

impl TestConnection {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            written: Arc::default(),
            closed_with: Arc::default(),
            wrote: Arc::new(Notify::new()),
        }
    }

    fn written(&self) -> Vec<Bytes> {
        self.written.lock().unwrap().clone()
    }

    fn closed_with(&self) -> Vec<CloseReason> {
        self.closed_with.lock().unwrap().clone()
    }
}

impl Connection for TestConnection {
    async fn write(&mut self, payload: Bytes) -> Result<(), BoxError> {
        match self.mode {
            Mode::Accept => {
                self.written.lock().unwrap().push(payload);
                self.wrote.notify_one();
                Ok(())
            }
            Mode::Stall => std::future::pending().await,
            Mode::Fail => Err("broken pipe".into()),
        }
    }

    async fn close(&mut self, reason: CloseReason) {
        self.closed_with.lock().unwrap().push(reason);
    }
}

fn broker() -> Arc<Broker> {
    Arc::new(Broker::new(BrokerSettings {
        publish_interval_ms: 0,
        ..BrokerSettings::default()
    }))
}

#[test]
fn test_subscriber_new() {
    let (subscriber, _queue) = Subscriber::new("42", 2, Box::new(|| {}));
    assert_eq!(subscriber.topic, "42");
    assert_eq!(subscriber.handle().id, subscriber.id);
    assert_eq!(subscriber.handle().topic, "42");
}

#[test]
fn test_subscriber_enqueue_outcomes() {
    let (subscriber, queue) = Subscriber::new("42", 1, Box::new(|| {}));
    assert_eq!(subscriber.try_enqueue(Bytes::from_static(b"a")), Enqueue::Queued);
    assert_eq!(subscriber.try_enqueue(Bytes::from_static(b"b")), Enqueue::Full);
    drop(queue);
    assert_eq!(subscriber.try_enqueue(Bytes::from_static(b"c")), Enqueue::Closed);
}

#[test]
fn test_subscriber_zero_capacity_is_bumped_to_one() {
    let (subscriber, _queue) = Subscriber::new("42", 0, Box::new(|| {}));
    assert_eq!(subscriber.try_enqueue(Bytes::from_static(b"a")), Enqueue::Queued);
}

#[test]
fn test_subscriber_oversized_capacity_is_clamped() {
    let (subscriber, _queue) = Subscriber::new("42", usize::MAX, Box::new(|| {}));
    assert_eq!(subscriber.try_enqueue(Bytes::from_static(b"a")), Enqueue::Queued);
}

#[test]
fn test_session_starts_registered() {
    let broker = broker();
    let session = Session::register(broker.clone(), "42", TestConnection::new(Mode::Accept));

    assert_eq!(session.state(), SessionState::Registered);
    assert!(broker.is_registered(session.handle()));
}

#[tokio::test]
async fn test_session_delivers_in_publish_order() {
    let broker = broker();
    let conn = TestConnection::new(Mode::Accept);
    let mut session = Session::register(broker.clone(), "42", conn.clone());
    let handle = session.handle().clone();
    let closed = CancellationToken::new();

    let task = tokio::spawn({
        let closed = closed.clone();
        async move {
            let result = session.run(closed).await;
            (session, result)
        }
    });

    broker.publish("42", "m1").await;
    broker.publish("42", "m2").await;
    broker.publish("7", "elsewhere").await;

    timeout(Duration::from_secs(1), async {
        while conn.written().len() < 2 {
            conn.wrote.notified().await;
        }
    })
    .await
    .expect("payloads never written");

    closed.cancel();
    let (session, result) = task.await.unwrap();

    assert!(matches!(result, Err(SessionError::Cancelled)));
    assert_eq!(
        conn.written(),
        vec![Bytes::from_static(b"m1"), Bytes::from_static(b"m2")]
    );
    assert_eq!(session.state(), SessionState::Unregistered);
    assert!(!broker.is_registered(&handle));
    assert_eq!(conn.closed_with(), vec![CloseReason::Normal]);
}

#[tokio::test]
async fn test_cancelled_session_unregisters() {
    let broker = broker();
    let conn = TestConnection::new(Mode::Accept);
    let mut session = Session::register(broker.clone(), "42", conn.clone());
    let closed = CancellationToken::new();
    closed.cancel();

    let result = session.run(closed).await;

    assert!(matches!(result, Err(SessionError::Cancelled)));
    assert!(result.unwrap_err().is_expected());
    assert_eq!(broker.total_subscribers(), 0);
    assert_eq!(conn.closed_with(), vec![CloseReason::Normal]);
}

#[tokio::test]
async fn test_run_after_termination_is_rejected() {
    let broker = broker();
    let conn = TestConnection::new(Mode::Accept);
    let mut session = Session::register(broker.clone(), "42", conn.clone());
    let closed = CancellationToken::new();
    closed.cancel();

    let _ = session.run(closed.clone()).await;
    let again = session.run(closed).await;

    assert!(matches!(again, Err(SessionError::Terminated)));
    assert_eq!(conn.closed_with().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_write_times_out() {
    let broker = broker();
    let conn = TestConnection::new(Mode::Stall);
    let mut session = Session::register(broker.clone(), "42", conn.clone());

    broker.publish("42", "stuck").await;
    let result = session.run(CancellationToken::new()).await;

    match result {
        Err(SessionError::WriteTimeout(after)) => assert_eq!(after, Duration::from_secs(5)),
        other => panic!("expected write timeout, got {other:?}"),
    }
    assert_eq!(broker.total_subscribers(), 0);
    assert_eq!(conn.closed_with(), vec![CloseReason::Error]);
}

#[tokio::test]
async fn test_failed_write_terminates_session() {
    let broker = broker();
    let conn = TestConnection::new(Mode::Fail);
    let mut session = Session::register(broker.clone(), "42", conn.clone());

    broker.publish("42", "hello").await;
    let result = session.run(CancellationToken::new()).await;

    match result {
        Err(SessionError::Write(e)) => assert_eq!(e.to_string(), "broken pipe"),
        other => panic!("expected write failure, got {other:?}"),
    }
    assert!(!broker.is_registered(session.handle()));
    assert_eq!(conn.closed_with(), vec![CloseReason::Error]);
}

#[tokio::test]
async fn test_evicted_session_closes_as_too_slow() {
    let broker = broker();
    let conn = TestConnection::new(Mode::Accept);
    let mut session = Session::register_with_capacity(broker.clone(), "42", 1, conn.clone());

    // Nothing drains yet, so the second publish overflows the queue.
    broker.publish("42", "one").await;
    broker.publish("42", "two").await;
    assert!(!broker.is_registered(session.handle()));
    // Let the spawned close handle run.
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    let result = timeout(Duration::from_secs(1), session.run(CancellationToken::new()))
        .await
        .expect("evicted session kept running");

    assert!(matches!(result, Err(SessionError::Evicted)));
    assert!(conn.written().is_empty());
    assert_eq!(conn.closed_with(), vec![CloseReason::TooSlow]);
    assert_eq!(session.state(), SessionState::Unregistered);
}

#[tokio::test]
async fn test_external_unregister_ends_session() {
    let broker = broker();
    let conn = TestConnection::new(Mode::Accept);
    let mut session = Session::register(broker.clone(), "42", conn.clone());

    broker.publish("42", "last").await;
    assert!(broker.unregister(session.handle()));

    let result = session.run(CancellationToken::new()).await;

    assert!(matches!(result, Err(SessionError::Unregistered)));
    // Already queued payloads are still flushed.
    assert_eq!(conn.written(), vec![Bytes::from_static(b"last")]);
    assert_eq!(conn.closed_with(), vec![CloseReason::Normal]);
}
