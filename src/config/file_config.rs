use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Listener settings (can override CLI)
    pub host: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub public_dir: Option<String>,
    pub templates_dir: Option<String>,

    // Relay behaviour
    pub broadcast_policy: Option<String>,
    pub control_wire_format: Option<String>,

    // Per-connection limits
    pub idle_timeout_sec: Option<u64>,
    pub ping_interval_sec: Option<u64>,
    pub write_timeout_sec: Option<u64>,
    pub outbound_queue_size: Option<usize>,
    pub max_message_bytes: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
