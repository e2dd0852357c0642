use axum::extract::FromRef;
use chrono::{DateTime, Utc};

use std::sync::Arc;
use std::time::Instant;

use super::websocket::{ClientRegistry, MessageRouter};
use super::ServerConfig;

pub type GuardedClientRegistry = Arc<ClientRegistry>;
pub type GuardedMessageRouter = Arc<MessageRouter>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
    pub hash: String,
    pub registry: GuardedClientRegistry,
    pub router: GuardedMessageRouter,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> ServerState {
        let registry = Arc::new(ClientRegistry::new());
        let router = MessageRouter::new(registry.clone(), config.broadcast_policy)
            .with_control_format(config.control_wire_format);
        ServerState {
            config,
            start_time: Instant::now(),
            started_at: Utc::now(),
            hash: env!("GIT_HASH").to_owned(),
            registry,
            router: Arc::new(router),
        }
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedClientRegistry {
    fn from_ref(input: &ServerState) -> Self {
        input.registry.clone()
    }
}

impl FromRef<ServerState> for GuardedMessageRouter {
    fn from_ref(input: &ServerState) -> Self {
        input.router.clone()
    }
}
