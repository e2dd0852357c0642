//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, WsClient};
//!
//! #[tokio::test]
//! async fn test_relay() {
//!     let server = TestServer::spawn().await;
//!     let mut a = WsClient::connect(&server).await;
//!     let mut b = WsClient::connect(&server).await;
//!     server.wait_for_clients(2).await;
//!
//!     a.send_text(r#"{"type":"pause"}"#).await;
//!     assert_eq!(b.recv_text().await.as_deref(), Some(r#"{"type":"pause"}"#));
//! }
//! ```

mod client;
mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use client::{TestClient, WsClient};
#[allow(unused_imports)]
pub use constants::*;
pub use server::TestServer;
