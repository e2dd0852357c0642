//! WebSocket route handler.
//!
//! Handles WebSocket upgrade, the per-connection read loop, the writer task
//! that drains the client's outbound queue, and cleanup.
//!
//! A connection goes `Connecting -> Open -> Closed`. It is registered when it
//! becomes `Open` and unregistered exactly once when it reaches `Closed`,
//! whatever the cause: remote close, read or write failure, idle timeout,
//! being dropped from a fan-out, an explicit [`ConnectionHandle::close`], or a
//! panic while handling a frame.

use std::any::Any;
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, Utf8Bytes, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, warn};

use super::messages::decode;
use super::registry::{ClientHandle, ClientId};
use super::router::MessageRouter;
use crate::server::metrics;
use crate::server::state::GuardedMessageRouter;
use crate::server::ServerConfig;

/// Per-connection limits and timers.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Frames that may wait in a client's outbound queue before a fan-out
    /// send to it counts as failed.
    pub outbound_queue_size: usize,
    /// Close the connection if nothing is read for this long.
    pub idle_timeout: Option<Duration>,
    /// Interval between server pings. Browsers answer with a pong, which
    /// keeps the idle timer of a silent viewer from expiring.
    pub ping_interval: Option<Duration>,
    /// Maximum time a single socket write may take.
    pub write_timeout: Duration,
    /// Largest inbound message accepted by the upgrade.
    pub max_message_bytes: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            outbound_queue_size: 64,
            idle_timeout: Some(Duration::from_secs(90)),
            ping_interval: Some(Duration::from_secs(30)),
            write_timeout: Duration::from_secs(10),
            max_message_bytes: 16 * 1024,
        }
    }
}

/// Lifecycle of one connection. `Connecting` covers the HTTP upgrade, before
/// [`accept_connection`] registers the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Failures that end a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Read failed: {0}")]
    Read(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("No frames received for {0:?}")]
    IdleTimeout(Duration),

    #[error("Unexpected failure while handling the connection: {0}")]
    Panicked(String),
}

/// Why a connection reached `Closed`.
#[derive(Debug)]
enum Disconnect {
    /// Close frame or end of stream from the peer.
    RemoteClose,
    /// Closed from our side: unregistered by a fan-out or closed via the handle.
    ClosedLocally,
    Failed(ConnectionError),
}

impl Disconnect {
    fn label(&self) -> &'static str {
        match self {
            Disconnect::RemoteClose => "remote_close",
            Disconnect::ClosedLocally => "closed_locally",
            Disconnect::Failed(ConnectionError::Read(_)) => "read_error",
            Disconnect::Failed(ConnectionError::Write(_)) => "write_error",
            Disconnect::Failed(ConnectionError::WriteTimeout(_)) => "write_timeout",
            Disconnect::Failed(ConnectionError::IdleTimeout(_)) => "idle_timeout",
            Disconnect::Failed(ConnectionError::Panicked(_)) => "panic",
        }
    }
}

/// Handle to an accepted connection, returned by [`accept_connection`].
pub struct ConnectionHandle {
    client: ClientHandle,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ClientId {
        self.client.id()
    }

    /// Current state. A handle only exists once the connection is registered,
    /// so this is never `Connecting`.
    pub fn state(&self) -> ConnectionState {
        if self.client.is_closed() || self.task.is_finished() {
            ConnectionState::Closed
        } else {
            ConnectionState::Open
        }
    }

    /// Close the connection. Cleanup runs on the connection task.
    pub fn close(&self) {
        self.client.close();
    }

    /// Wait until the connection has been torn down and unregistered.
    pub async fn closed(self) {
        if let Err(e) = self.task.await {
            error!("Connection task for {} failed: {}", self.client.id(), e);
        }
    }
}

/// WebSocket upgrade handler.
///
/// This is the route handler for `GET /ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(router): State<GuardedMessageRouter>,
    State(config): State<ServerConfig>,
) -> Response {
    let settings = config.connection;
    ws.max_message_size(settings.max_message_bytes)
        .max_frame_size(settings.max_message_bytes)
        .on_upgrade(move |socket| async move {
            accept_connection(socket, router, settings);
        })
}

/// Take ownership of an upgraded socket.
///
/// The client is registered before this returns; reading and writing happen
/// on spawned tasks.
pub fn accept_connection<S, E>(
    socket: S,
    router: Arc<MessageRouter>,
    settings: ConnectionSettings,
) -> ConnectionHandle
where
    S: Stream<Item = Result<Message, E>> + Sink<Message, Error = E> + Send + 'static,
    E: Display + Send + 'static,
{
    let (client, outgoing_rx) = ClientHandle::new(settings.outbound_queue_size);
    let registry = router.registry();

    registry.register(client.clone());
    metrics::record_ws_connected(registry.len());
    debug!(
        "{}: {:?} -> {:?}",
        client.id(),
        ConnectionState::Connecting,
        ConnectionState::Open
    );

    let task = tokio::spawn(run_connection(
        socket,
        client.clone(),
        outgoing_rx,
        router,
        settings,
    ));

    ConnectionHandle { client, task }
}

async fn run_connection<S, E>(
    socket: S,
    client: ClientHandle,
    outgoing_rx: mpsc::Receiver<Utf8Bytes>,
    router: Arc<MessageRouter>,
    settings: ConnectionSettings,
) where
    S: Stream<Item = Result<Message, E>> + Sink<Message, Error = E> + Send + 'static,
    E: Display + Send + 'static,
{
    let client_id = client.id();
    let (ws_sink, ws_stream) = socket.split();

    let mut writer = tokio::spawn(forward_outgoing(
        ws_sink,
        outgoing_rx,
        client.clone(),
        settings.ping_interval,
        settings.write_timeout,
    ));

    let reader = contained(process_incoming(
        ws_stream,
        client_id,
        &router,
        settings.idle_timeout,
    ));

    let (disconnect, writer_done) = tokio::select! {
        result = reader => (result.unwrap_or_else(Disconnect::Failed), false),
        result = &mut writer => {
            let disconnect = result.unwrap_or_else(|e| {
                Disconnect::Failed(ConnectionError::Panicked(e.to_string()))
            });
            (disconnect, true)
        }
    };

    // Stop the writer (it sends a close frame on its way out)
    client.close();
    if !writer_done && tokio::time::timeout(settings.write_timeout, &mut writer).await.is_err() {
        writer.abort();
    }

    let registry = router.registry();
    registry.unregister(client_id);
    metrics::record_ws_disconnected(disconnect.label(), registry.len());

    match &disconnect {
        Disconnect::Failed(e @ ConnectionError::Panicked(_)) => {
            error!("{} closed: {}", client_id, e)
        }
        Disconnect::Failed(e) => warn!("{} closed: {}", client_id, e),
        other => debug!("{} closed: {:?}", client_id, other),
    }
    debug!(
        "{}: {:?} -> {:?}",
        client_id,
        ConnectionState::Open,
        ConnectionState::Closed
    );
}

/// Run a future, turning a panic into [`ConnectionError::Panicked`].
async fn contained<F>(fut: F) -> Result<F::Output, ConnectionError>
where
    F: std::future::Future,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|panic| ConnectionError::Panicked(panic_message(panic.as_ref())))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Forward messages from the outgoing queue to the WebSocket.
async fn forward_outgoing<Si, E>(
    mut ws_sink: Si,
    mut outgoing_rx: mpsc::Receiver<Utf8Bytes>,
    client: ClientHandle,
    ping_interval: Option<Duration>,
    write_timeout: Duration,
) -> Disconnect
where
    Si: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    let mut pinger = ping_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        let frame = tokio::select! {
            _ = client.closed() => {
                let _ = tokio::time::timeout(write_timeout, ws_sink.send(Message::Close(None))).await;
                return Disconnect::ClosedLocally;
            }
            next = outgoing_rx.recv() => match next {
                Some(text) => Message::Text(text),
                None => return Disconnect::ClosedLocally,
            },
            _ = tick(&mut pinger) => Message::Ping(Bytes::new()),
        };

        match tokio::time::timeout(write_timeout, ws_sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Disconnect::Failed(ConnectionError::Write(e.to_string())),
            Err(_) => return Disconnect::Failed(ConnectionError::WriteTimeout(write_timeout)),
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Process incoming messages from the WebSocket.
async fn process_incoming<St, E>(
    mut ws_stream: St,
    client_id: ClientId,
    router: &MessageRouter,
    idle_timeout: Option<Duration>,
) -> Disconnect
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, ws_stream.next()).await {
                Ok(next) => next,
                Err(_) => return Disconnect::Failed(ConnectionError::IdleTimeout(limit)),
            },
            None => ws_stream.next().await,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                handle_frame(client_id, text.as_str().as_bytes(), router)
            }
            Some(Ok(Message::Binary(bytes))) => handle_frame(client_id, &bytes, router),
            Some(Ok(Message::Ping(_))) => {
                // Axum/tungstenite handles pong automatically
                debug!("Received ping from {}", client_id);
            }
            Some(Ok(Message::Pong(_))) => {
                debug!("Received pong from {}", client_id);
            }
            Some(Ok(Message::Close(_))) => {
                debug!("Received close frame from {}", client_id);
                return Disconnect::RemoteClose;
            }
            Some(Err(e)) => return Disconnect::Failed(ConnectionError::Read(e.to_string())),
            None => return Disconnect::RemoteClose,
        }
    }
}

/// Decode one frame and hand it to the router. Never ends the connection.
fn handle_frame(client_id: ClientId, payload: &[u8], router: &MessageRouter) {
    match decode(payload) {
        Ok(message) => {
            let label = if message.kind.is_actionable() {
                message.kind.as_str()
            } else {
                "other"
            };
            metrics::record_message_received(label);
            router.route(client_id, &message);
        }
        Err(e) => {
            debug!("Dropping frame from {}: {}", client_id, e);
            metrics::record_decode_error(e.code());
        }
    }
}
