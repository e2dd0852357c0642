//! Shared constants for end-to-end tests

#![allow(dead_code)]

// ============================================================================
// Timing
// ============================================================================

/// Maximum time to wait for server to become ready
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Poll interval when waiting for server readiness or registry changes
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

/// How long to wait for a frame that should arrive
pub const RECV_TIMEOUT_MS: u64 = 2000;

/// How long to listen to confirm that nothing arrives
pub const SILENCE_WINDOW_MS: u64 = 300;

// ============================================================================
// Static content
// ============================================================================

/// Body of the index.html placed in the test templates directory
pub const INDEX_HTML: &str = "<!doctype html><title>Watch Party</title>";

/// Name of the script placed in the test public directory
pub const APP_JS_NAME: &str = "app.js";

/// Body of the script placed in the test public directory
pub const APP_JS: &str = "const socket = new WebSocket('ws://' + location.host + '/ws');";
