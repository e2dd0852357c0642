//! WebSocket infrastructure for playback sync.
//!
//! Viewers connect on `/ws`; every decoded control message is relayed to the
//! other connected viewers.

pub mod handler;
pub mod messages;
pub mod registry;
pub mod router;

pub use handler::{
    accept_connection, ws_handler, ConnectionError, ConnectionHandle, ConnectionSettings,
    ConnectionState,
};
pub use messages::{decode, encode, msg_types, DecodeError, Message, MessageKind, WireFormat};
pub use registry::{ClientHandle, ClientId, ClientRegistry, SendError};
pub use router::{BroadcastPolicy, MessageRouter, RouteOutcome};
