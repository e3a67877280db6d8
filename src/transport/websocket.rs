//! WebSocket connection adapter.
//!
//! Upgrades the request, wraps the outbound half of the socket as a
//! [`Connection`] for the subscriber [`Session`], and runs the read side that
//! keeps consuming control frames so a disconnect cancels the session.
//! Subscribers never send application messages; anything they do send is
//! ignored.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::client::{CloseReason, Connection, Session};
use crate::transport::http::AppState;
use crate::utils::error::{ApiError, BoxError};

/// Outbound half of an upgraded WebSocket.
pub struct WsConnection {
    sink: SplitSink<WebSocket, Message>,
}

impl WsConnection {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }
}

/// Valid UTF-8 goes out as a text frame, anything else as binary.
fn frame(payload: Bytes) -> Message {
    match Utf8Bytes::try_from(payload.clone()) {
        Ok(text) => Message::Text(text),
        Err(_) => Message::Binary(payload),
    }
}

impl Connection for WsConnection {
    async fn write(&mut self, payload: Bytes) -> Result<(), BoxError> {
        self.sink.send(frame(payload)).await.map_err(Into::into)
    }

    async fn close(&mut self, reason: CloseReason) {
        let (code, text) = match reason {
            CloseReason::Normal => (close_code::NORMAL, ""),
            CloseReason::TooSlow => (
                close_code::POLICY,
                "connection too slow to keep up with messages",
            ),
            CloseReason::Error => (close_code::ERROR, ""),
        };
        let close = Message::Close(Some(CloseFrame {
            code,
            reason: Utf8Bytes::from_static(text),
        }));
        if let Err(e) = self.sink.send(close).await {
            debug!("close frame not sent: {e}");
        }
    }
}

/// `GET /subscribe/{topic}`
pub async fn subscribe_topic(
    ws: WebSocketUpgrade,
    Path(topic): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if topic.is_empty() {
        return ApiError::EmptyTopic.into_response();
    }
    upgrade(ws, state.broker.clone(), topic)
}

/// `GET /subscribe` and `GET /ws`: the default account's topic.
pub async fn subscribe_default(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    upgrade(ws, state.broker.clone(), state.default_account.clone())
}

fn upgrade(ws: WebSocketUpgrade, broker: Arc<Broker>, topic: String) -> Response {
    ws.on_failed_upgrade(|e| warn!("websocket upgrade failed: {e}"))
        .on_upgrade(move |socket| serve_subscriber(socket, broker, topic))
}

/// Runs one subscriber connection to completion.
pub async fn serve_subscriber(socket: WebSocket, broker: Arc<Broker>, topic: String) {
    let (sink, stream) = socket.split();
    let closed = CancellationToken::new();
    let reader = spawn_reader(stream, closed.clone());

    let mut session = Session::register(broker, &topic, WsConnection::new(sink));
    let id = session.handle().id;
    info!(subscriber = %id, topic, "websocket subscriber connected");

    // The session logs its own termination cause.
    let _ = session.run(closed.clone()).await;

    closed.cancel();
    if let Err(e) = reader.await {
        warn!(subscriber = %id, "read task failed: {e}");
    }
    info!(subscriber = %id, topic, "websocket subscriber disconnected");
}

/// Consumes incoming frames until the peer closes, the connection errors, or
/// the session finishes, then cancels `closed`.
fn spawn_reader(mut stream: SplitStream<WebSocket>, closed: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = closed.cancelled() => break,

                msg = stream.next() => match msg {
                    Some(Ok(Message::Close(close))) => {
                        debug!(?close, "peer closed connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("read failed: {e}");
                        break;
                    }
                    None => break,
                },
            }
        }
        closed.cancel();
    })
}
