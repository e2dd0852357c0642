//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own registry and static dirs.

use super::constants::*;
use super::fixtures::create_static_dirs;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use watchsync_server::server::server::serve;
use watchsync_server::server::state::{GuardedClientRegistry, ServerState};
use watchsync_server::server::{RequestsLoggingLevel, ServerConfig};

/// Test server instance with isolated state
///
/// When dropped, the server shuts down and temp resources are cleaned up.
#[allow(dead_code)]
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// WebSocket URL of the sync endpoint
    pub ws_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Registry for direct inspection in tests
    pub registry: GuardedClientRegistry,

    // Private fields - keep resources alive until drop
    _static_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

#[allow(dead_code)]
impl TestServer {
    /// Spawns a new test server on a random port with default settings
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawns a new test server, letting the caller adjust the config first
    ///
    /// This function:
    /// 1. Creates temporary templates and public directories
    /// 2. Binds to a random port (127.0.0.1:0)
    /// 3. Spawns the server in a background task
    /// 4. Waits for the server to be ready
    ///
    /// # Panics
    ///
    /// Panics if fixture creation or port binding fails, or if the server
    /// doesn't become ready within timeout.
    pub async fn spawn_with<F>(configure: F) -> Self
    where
        F: FnOnce(&mut ServerConfig),
    {
        let (static_dir, templates_dir, public_dir) =
            create_static_dirs().expect("Failed to create static dirs");

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);
        let ws_url = format!("ws://127.0.0.1:{}/ws", port);

        let mut config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            host: "127.0.0.1".to_string(),
            port,
            metrics_port: 0,
            public_dir,
            templates_dir,
            ..Default::default()
        };
        // Keepalive pings would interleave with the frames tests wait for,
        // and without them a silent test client would hit the idle deadline
        config.connection.ping_interval = None;
        config.connection.idle_timeout = None;
        configure(&mut config);

        let state = ServerState::new(config);
        let registry = state.registry.clone();

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            serve(listener, state, async {
                shutdown_rx.await.ok();
            })
            .await
            .expect("Server failed");
        });

        let server = Self {
            base_url,
            ws_url,
            port,
            registry,
            _static_dir: static_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the /status endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/status", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }

    /// Waits until exactly `count` clients are registered.
    ///
    /// Registration happens on the server's upgrade task, so it can lag
    /// behind the client's handshake completing.
    pub async fn wait_for_clients(&self, count: usize) {
        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        while self.registry.len() != count {
            if start.elapsed() > timeout {
                panic!(
                    "Expected {} registered clients, found {}",
                    count,
                    self.registry.len()
                );
            }
            tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Send shutdown signal
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
