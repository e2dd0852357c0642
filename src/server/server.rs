use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;

use tokio::net::TcpListener;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{error, info};

use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use super::metrics::metrics_handler;
use super::state::*;
use super::websocket::{ws_handler, MessageKind, RouteOutcome};
use super::{log_requests, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub started_at: String,
    pub version: String,
    pub hash: String,
    pub connected_clients: usize,
}

#[derive(Serialize, Debug, PartialEq)]
struct ControlResponse {
    pub delivered: usize,
    pub dropped: usize,
}

impl From<RouteOutcome> for ControlResponse {
    fn from(outcome: RouteOutcome) -> Self {
        match outcome {
            RouteOutcome::Ignored => ControlResponse {
                delivered: 0,
                dropped: 0,
            },
            RouteOutcome::Broadcast { delivered, dropped } => ControlResponse {
                delivered,
                dropped: dropped.len(),
            },
        }
    }
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn status(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        started_at: state.started_at.to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        hash: state.hash.clone(),
        connected_clients: state.registry.len(),
    };
    Json(stats)
}

async fn pause(State(router): State<GuardedMessageRouter>) -> impl IntoResponse {
    info!("Pausing all viewers");
    Json(ControlResponse::from(router.inject(MessageKind::Pause)))
}

async fn unpause(State(router): State<GuardedMessageRouter>) -> impl IntoResponse {
    info!("Resuming all viewers");
    Json(ControlResponse::from(router.inject(MessageKind::Play)))
}

pub fn make_app(state: ServerState) -> Router {
    let config = state.config.clone();

    let sync_routes: Router = Router::new()
        .route("/ws", get(ws_handler))
        .route("/pause", get(pause))
        .route("/unpause", get(unpause))
        .route("/status", get(status))
        .with_state(state.clone());

    let index = ServeFile::new(config.templates_dir.join("index.html"));
    let public = ServeDir::new(&config.public_dir);

    let mut app: Router = Router::new()
        .route_service("/", index)
        .nest_service("/public", public)
        .merge(sync_routes);

    app = app.layer(middleware::from_fn_with_state(state, log_requests));

    app
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve the app on `listener` until `shutdown` resolves.
///
/// On shutdown every viewer is unregistered, which closes its socket.
pub async fn serve<F>(listener: TcpListener, state: ServerState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = state.registry.clone();
    let app = make_app(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            for id in registry.ids() {
                registry.unregister(id);
            }
        })
        .await?;
    Ok(())
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let state = ServerState::new(config.clone());

    if config.metrics_port != 0 {
        let metrics_listener = TcpListener::bind((config.host.as_str(), config.metrics_port))
            .await
            .with_context(|| format!("Failed to bind metrics port {}", config.metrics_port))?;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(metrics_listener, make_metrics_app()).await {
                error!("Metrics server failed: {}", e);
            }
        });
    }

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;

    serve(listener, state, shutdown_signal()).await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
