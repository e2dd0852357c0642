mod file_config;

pub use file_config::FileConfig;

use crate::server::websocket::{BroadcastPolicy, ConnectionSettings, WireFormat};
use crate::server::{RequestsLoggingLevel, ServerConfig};
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub host: String,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub public_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub broadcast_policy: BroadcastPolicy,
    pub control_wire_format: WireFormat,
    pub idle_timeout_sec: u64,
    pub ping_interval_sec: u64,
    pub write_timeout_sec: u64,
    pub outbound_queue_size: usize,
    pub max_message_bytes: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Path,
            public_dir: PathBuf::from("public"),
            templates_dir: PathBuf::from("templates"),
            broadcast_policy: BroadcastPolicy::ExcludeSender,
            control_wire_format: WireFormat::Json,
            idle_timeout_sec: 90,
            ping_interval_sec: 30,
            write_timeout_sec: 10,
            outbound_queue_size: 64,
            max_message_bytes: 16 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub public_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub broadcast_policy: BroadcastPolicy,
    pub control_wire_format: WireFormat,
    pub connection: ConnectionSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let host = file.host.unwrap_or_else(|| cli.host.clone());
        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        if metrics_port != 0 && metrics_port == port {
            bail!("metrics_port must differ from port ({})", port);
        }

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let public_dir = file
            .public_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.public_dir.clone());
        let templates_dir = file
            .templates_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.templates_dir.clone());

        let broadcast_policy = match file.broadcast_policy {
            Some(s) => match parse_broadcast_policy(&s) {
                Some(policy) => policy,
                None => bail!("Unknown broadcast_policy: {:?}", s),
            },
            None => cli.broadcast_policy,
        };
        let control_wire_format = match file.control_wire_format {
            Some(s) => match parse_wire_format(&s) {
                Some(format) => format,
                None => bail!("Unknown control_wire_format: {:?}", s),
            },
            None => cli.control_wire_format,
        };

        let idle_timeout_sec = file.idle_timeout_sec.unwrap_or(cli.idle_timeout_sec);
        let ping_interval_sec = file.ping_interval_sec.unwrap_or(cli.ping_interval_sec);
        let write_timeout_sec = file.write_timeout_sec.unwrap_or(cli.write_timeout_sec);
        let outbound_queue_size = file
            .outbound_queue_size
            .unwrap_or(cli.outbound_queue_size);
        let max_message_bytes = file.max_message_bytes.unwrap_or(cli.max_message_bytes);

        if write_timeout_sec == 0 {
            bail!("write_timeout_sec must be greater than 0");
        }
        if outbound_queue_size == 0 {
            bail!("outbound_queue_size must be greater than 0");
        }
        if max_message_bytes == 0 {
            bail!("max_message_bytes must be greater than 0");
        }
        // Pongs are all a passive viewer sends, so they must beat the idle deadline
        if idle_timeout_sec > 0 && (ping_interval_sec == 0 || ping_interval_sec >= idle_timeout_sec) {
            bail!(
                "ping_interval_sec ({}) must be non-zero and shorter than idle_timeout_sec ({})",
                ping_interval_sec,
                idle_timeout_sec
            );
        }

        let connection = ConnectionSettings {
            outbound_queue_size,
            idle_timeout: seconds_or_disabled(idle_timeout_sec),
            ping_interval: seconds_or_disabled(ping_interval_sec),
            write_timeout: Duration::from_secs(write_timeout_sec),
            max_message_bytes,
        };

        Ok(Self {
            host,
            port,
            metrics_port,
            logging_level,
            public_dir,
            templates_dir,
            broadcast_policy,
            control_wire_format,
            connection,
        })
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            requests_logging_level: self.logging_level.clone(),
            host: self.host.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
            public_dir: self.public_dir.clone(),
            templates_dir: self.templates_dir.clone(),
            broadcast_policy: self.broadcast_policy,
            control_wire_format: self.control_wire_format,
            connection: self.connection.clone(),
        }
    }
}

/// 0 means the timer is off.
fn seconds_or_disabled(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

fn parse_broadcast_policy(s: &str) -> Option<BroadcastPolicy> {
    BroadcastPolicy::from_str(s, true).ok()
}

fn parse_wire_format(s: &str) -> Option<WireFormat> {
    WireFormat::from_str(s, true).ok()
}
