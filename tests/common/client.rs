//! HTTP and WebSocket clients for end-to-end tests

#![allow(dead_code)]

use super::constants::*;
use super::server::TestServer;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

/// Thin wrapper over reqwest for the plain HTTP routes
pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
}

impl TestClient {
    pub fn new(server: &TestServer) -> Self {
        Self {
            base_url: server.base_url.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn get_json(&self, path: &str) -> serde_json::Value {
        let response = self.get(path).await;
        assert!(
            response.status().is_success(),
            "GET {} returned {}",
            path,
            response.status()
        );
        response.json().await.expect("Response is not JSON")
    }

    pub async fn pause(&self) -> serde_json::Value {
        self.get_json("/pause").await
    }

    pub async fn unpause(&self) -> serde_json::Value {
        self.get_json("/unpause").await
    }

    pub async fn status(&self) -> serde_json::Value {
        self.get_json("/status").await
    }
}

/// A viewer connected to `/ws`
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn connect(server: &TestServer) -> Self {
        let (stream, _) = connect_async(server.ws_url.as_str())
            .await
            .expect("Failed to connect to WebSocket");
        Self { stream }
    }

    pub async fn send_text(&mut self, text: &str) {
        self.stream
            .send(Message::Text(text.to_string().into()))
            .await
            .expect("Failed to send frame");
    }

    pub async fn send_binary(&mut self, bytes: &'static [u8]) {
        self.stream
            .send(Message::Binary(bytes.into()))
            .await
            .expect("Failed to send frame");
    }

    /// Next text frame, skipping control frames. None on timeout or close.
    pub async fn recv_text_within(&mut self, window: Duration) -> Option<String> {
        let result = timeout(window, async {
            while let Some(Ok(msg)) = self.stream.next().await {
                match msg {
                    Message::Text(text) => return Some(text.as_str().to_string()),
                    Message::Close(_) => return None,
                    _ => continue,
                }
            }
            None
        })
        .await;

        result.ok().flatten()
    }

    pub async fn recv_text(&mut self) -> Option<String> {
        self.recv_text_within(Duration::from_millis(RECV_TIMEOUT_MS))
            .await
    }

    /// Asserts that no text frame arrives within the silence window.
    pub async fn expect_silence(&mut self) {
        let received = self
            .recv_text_within(Duration::from_millis(SILENCE_WINDOW_MS))
            .await;
        assert!(received.is_none(), "Unexpected frame: {:?}", received);
    }

    /// Whether the server closed the connection within the receive timeout.
    pub async fn is_closed_by_server(&mut self) -> bool {
        let result = timeout(Duration::from_millis(RECV_TIMEOUT_MS), async {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        result.unwrap_or(false)
    }

    /// Performs a clean close handshake.
    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
