use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use watchsync_server::config;
use watchsync_server::server::websocket::{BroadcastPolicy, WireFormat};
use watchsync_server::server::{metrics, run_server, RequestsLoggingLevel};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[clap(version, about = "Relays playback sync messages between connected viewers")]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The address to bind to.
    #[clap(long, default_value = "0.0.0.0")]
    pub host: String,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8080)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping). 0 disables it.
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Directory served under /public.
    #[clap(long, value_parser = parse_path, default_value = "public")]
    pub public_dir: PathBuf,

    /// Directory containing index.html, served on /.
    #[clap(long, value_parser = parse_path, default_value = "templates")]
    pub templates_dir: PathBuf,

    /// Whether a viewer receives its own messages back.
    #[clap(long, default_value = "exclude-sender")]
    pub broadcast_policy: BroadcastPolicy,

    /// Wire shape of the messages sent by /pause and /unpause.
    #[clap(long, default_value = "json")]
    pub control_wire_format: WireFormat,

    /// Close connections that send nothing for this many seconds. 0 disables it.
    #[clap(long, default_value_t = 90)]
    pub idle_timeout_sec: u64,

    /// Seconds between keepalive pings. 0 disables them.
    #[clap(long, default_value_t = 30)]
    pub ping_interval_sec: u64,

    /// Maximum seconds a single socket write may take.
    #[clap(long, default_value_t = 10)]
    pub write_timeout_sec: u64,

    /// Frames buffered per viewer before it is considered too slow and dropped.
    #[clap(long, default_value_t = 64)]
    pub outbound_queue_size: usize,

    /// Largest inbound WebSocket message accepted, in bytes.
    #[clap(long, default_value_t = 16 * 1024)]
    pub max_message_bytes: usize,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            host: args.host.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            public_dir: args.public_dir.clone(),
            templates_dir: args.templates_dir.clone(),
            broadcast_policy: args.broadcast_policy,
            control_wire_format: args.control_wire_format,
            idle_timeout_sec: args.idle_timeout_sec,
            ping_interval_sec: args.ping_interval_sec,
            write_timeout_sec: args.write_timeout_sec,
            outbound_queue_size: args.outbound_queue_size,
            max_message_bytes: args.max_message_bytes,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  public_dir: {:?}", app_config.public_dir);
    info!("  templates_dir: {:?}", app_config.templates_dir);
    info!("  broadcast_policy: {}", app_config.broadcast_policy);
    info!("  control_wire_format: {}", app_config.control_wire_format);

    if !app_config.templates_dir.join("index.html").exists() {
        tracing::warn!(
            "No index.html in {:?}, / will respond 404",
            app_config.templates_dir
        );
    }

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!("Ready to serve at {}:{}!", app_config.host, app_config.port);
    if app_config.metrics_port != 0 {
        info!("Metrics available at port {}!", app_config.metrics_port);
    }

    let result = run_server(app_config.server_config()).await;
    info!("HTTP server stopped: {:?}", result);
    result
}
