//! Watchsync Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod server;

// Re-export commonly used types for convenience
pub use server::websocket::{accept_connection, ClientRegistry, MessageRouter};
pub use server::{run_server, RequestsLoggingLevel, ServerConfig};
