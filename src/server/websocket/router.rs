//! Fan-out of control messages to registered viewers.
//!
//! The router never touches a socket. Each target gets a non-blocking enqueue
//! on its outbound queue; the per-connection writer task does the network
//! write. A target whose enqueue fails is unregistered (which also closes its
//! connection) and the fan-out moves on.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use tracing::{debug, error, warn};

use super::messages::{encode, Message, MessageKind, WireFormat};
use super::registry::{ClientId, ClientRegistry};
use crate::server::metrics;

/// Whether the sender of a message receives its own rebroadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BroadcastPolicy {
    /// Everyone except the sender (echo suppression).
    #[default]
    ExcludeSender,
    /// Everyone, including the sender.
    IncludeSender,
}

impl std::fmt::Display for BroadcastPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BroadcastPolicy::ExcludeSender => f.write_str("exclude-sender"),
            BroadcastPolicy::IncludeSender => f.write_str("include-sender"),
        }
    }
}

/// Result of routing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Not an actionable kind; nothing was sent.
    Ignored,
    /// Fan-out happened. `dropped` lists the clients unregistered during the pass.
    Broadcast {
        delivered: usize,
        dropped: Vec<ClientId>,
    },
}

impl RouteOutcome {
    pub fn delivered(&self) -> usize {
        match self {
            RouteOutcome::Ignored => 0,
            RouteOutcome::Broadcast { delivered, .. } => *delivered,
        }
    }
}

/// Decides who receives a message and queues it for them.
pub struct MessageRouter {
    registry: Arc<ClientRegistry>,
    policy: BroadcastPolicy,
    /// Wire shape used for messages injected by the control endpoints.
    control_format: WireFormat,
}

impl MessageRouter {
    pub fn new(registry: Arc<ClientRegistry>, policy: BroadcastPolicy) -> Self {
        Self {
            registry,
            policy,
            control_format: WireFormat::Json,
        }
    }

    pub fn with_control_format(mut self, format: WireFormat) -> Self {
        self.control_format = format;
        self
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> BroadcastPolicy {
        self.policy
    }

    /// Rebroadcast a message received from `origin`.
    pub fn route(&self, origin: ClientId, message: &Message) -> RouteOutcome {
        if !message.kind.is_actionable() {
            debug!("Ignoring message of type {} from {}", message.kind, origin);
            return RouteOutcome::Ignored;
        }

        let excluded = match self.policy {
            BroadcastPolicy::ExcludeSender => Some(origin),
            BroadcastPolicy::IncludeSender => None,
        };
        self.fan_out(message, excluded, "client")
    }

    /// Broadcast a synthetic message that did not come from any client.
    pub fn inject(&self, kind: MessageKind) -> RouteOutcome {
        let message = Message::new(kind).with_format(self.control_format);
        if !message.kind.is_actionable() {
            debug!("Ignoring injected message of type {}", message.kind);
            return RouteOutcome::Ignored;
        }
        self.fan_out(&message, None, "control")
    }

    fn fan_out(&self, message: &Message, excluded: Option<ClientId>, source: &str) -> RouteOutcome {
        let frame = match encode(message) {
            Ok(text) => Utf8Bytes::from(text),
            Err(e) => {
                error!("Failed to encode {} message: {}", message.kind, e);
                return RouteOutcome::Ignored;
            }
        };

        let mut delivered = 0;
        let mut dropped = Vec::new();

        self.registry.for_each(|client| {
            if Some(client.id()) == excluded {
                return;
            }
            match client.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Send to {} failed ({}), unregistering", client.id(), e);
                    metrics::record_send_failure(&e);
                    self.registry.unregister(client.id());
                    dropped.push(client.id());
                }
            }
        });

        debug!(
            "Relayed {} ({}) to {} clients, dropped {}",
            message.kind,
            source,
            delivered,
            dropped.len()
        );
        metrics::record_broadcast(message.kind.as_str(), source, delivered);

        RouteOutcome::Broadcast { delivered, dropped }
    }
}
