//! Registry of live viewer connections.
//!
//! Every accepted WebSocket gets a [`ClientHandle`]: an identity, a bounded
//! outbound queue drained by the connection's writer task, and a close token.
//! The registry keeps one clone of each handle. All membership changes and
//! snapshots go through a single mutex that is never held across an await.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Identity of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    /// Allocate a fresh, process-unique id.
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ClientId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Error type for enqueue operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SendError {
    /// The outbound queue is full (client is not draining it).
    Full,
    /// The client was closed or its writer task is gone.
    Closed,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Full => write!(f, "outbound queue full"),
            SendError::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for SendError {}

/// Handle to one live connection.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    sender: mpsc::Sender<Utf8Bytes>,
    closed: CancellationToken,
}

impl ClientHandle {
    /// Create a handle with a fresh id and an outbound queue of `capacity` frames.
    ///
    /// The returned receiver belongs to the connection's writer task.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Utf8Bytes>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: ClientId::next(),
            sender,
            closed: CancellationToken::new(),
        };
        (handle, receiver)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Queue a frame without waiting.
    pub fn try_send(&self, frame: Utf8Bytes) -> Result<(), SendError> {
        if self.closed.is_cancelled() {
            return Err(SendError::Closed);
        }
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Ask the connection to shut down. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once [`close`](Self::close) has been called on any clone.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

/// The set of currently connected clients.
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, ClientHandle>>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    // Critical sections are single map operations; a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<ClientId, ClientHandle>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a client. Returns `false` if it was already registered.
    pub fn register(&self, client: ClientHandle) -> bool {
        let mut clients = self.lock();
        if clients.contains_key(&client.id) {
            return false;
        }
        clients.insert(client.id, client);
        true
    }

    /// Remove a client and close it. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ClientId) -> bool {
        let removed = self.lock().remove(&id);
        match removed {
            Some(client) => {
                client.close();
                true
            }
            None => false,
        }
    }

    /// Clone of every registered handle, taken under the lock.
    pub fn snapshot(&self) -> Vec<ClientHandle> {
        self.lock().values().cloned().collect()
    }

    /// Lazily iterate a fresh snapshot, skipping clients closed after it was taken.
    pub fn live_clients(&self) -> impl Iterator<Item = ClientHandle> {
        self.snapshot()
            .into_iter()
            .filter(|client| !client.is_closed())
    }

    /// Call `f` for every live client. The lock is released before the first call.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&ClientHandle),
    {
        for client in self.live_clients() {
            f(&client);
        }
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn ids(&self) -> Vec<ClientId> {
        self.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
