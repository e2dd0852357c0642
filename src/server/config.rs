use std::path::PathBuf;

use super::websocket::{BroadcastPolicy, ConnectionSettings, WireFormat};
use super::RequestsLoggingLevel;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub host: String,
    pub port: u16,
    /// Port of the Prometheus listener. 0 disables it.
    pub metrics_port: u16,
    /// Directory served under `/public`.
    pub public_dir: PathBuf,
    /// Directory holding `index.html`, served on `/`.
    pub templates_dir: PathBuf,
    pub broadcast_policy: BroadcastPolicy,
    /// Wire shape of messages injected by `/pause` and `/unpause`.
    pub control_wire_format: WireFormat,
    pub connection: ConnectionSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            host: "0.0.0.0".to_string(),
            port: 8080,
            metrics_port: 9091,
            public_dir: PathBuf::from("public"),
            templates_dir: PathBuf::from("templates"),
            broadcast_policy: BroadcastPolicy::ExcludeSender,
            control_wire_format: WireFormat::Json,
            connection: ConnectionSettings::default(),
        }
    }
}
