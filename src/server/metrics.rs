use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::time::Duration;

use super::websocket::SendError;

/// Metric name prefix for all watchsync metrics
const PREFIX: &str = "watchsync";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // WebSocket Metrics
    pub static ref WS_CONNECTED_CLIENTS: IntGauge = IntGauge::new(
        format!("{PREFIX}_ws_connected_clients"),
        "Number of registered WebSocket clients"
    ).expect("Failed to create ws_connected_clients metric");

    pub static ref WS_CONNECTIONS_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_ws_connections_total"),
        "Total accepted WebSocket connections"
    ).expect("Failed to create ws_connections_total metric");

    pub static ref WS_DISCONNECTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_ws_disconnections_total"), "WebSocket disconnections by reason"),
        &["reason"]
    ).expect("Failed to create ws_disconnections_total metric");

    pub static ref WS_MESSAGES_RECEIVED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_ws_messages_received_total"), "Decoded inbound messages by type"),
        &["type"]
    ).expect("Failed to create ws_messages_received_total metric");

    pub static ref WS_DECODE_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_ws_decode_errors_total"), "Inbound frames that failed to decode"),
        &["error"]
    ).expect("Failed to create ws_decode_errors_total metric");

    pub static ref WS_BROADCASTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_ws_broadcasts_total"), "Fan-out passes by type and source"),
        &["type", "source"]
    ).expect("Failed to create ws_broadcasts_total metric");

    pub static ref WS_FRAMES_DELIVERED_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_ws_frames_delivered_total"),
        "Frames queued for delivery by fan-out"
    ).expect("Failed to create ws_frames_delivered_total metric");

    pub static ref WS_SEND_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_ws_send_failures_total"), "Fan-out sends that failed"),
        &["reason"]
    ).expect("Failed to create ws_send_failures_total metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(WS_CONNECTED_CLIENTS.clone()));
    let _ = REGISTRY.register(Box::new(WS_CONNECTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WS_DISCONNECTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WS_MESSAGES_RECEIVED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WS_DECODE_ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WS_BROADCASTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WS_FRAMES_DELIVERED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WS_SEND_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record an accepted WebSocket connection
pub fn record_ws_connected(connected_clients: usize) {
    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTED_CLIENTS.set(connected_clients as i64);
}

/// Record a closed WebSocket connection
pub fn record_ws_disconnected(reason: &str, connected_clients: usize) {
    WS_DISCONNECTIONS_TOTAL.with_label_values(&[reason]).inc();
    WS_CONNECTED_CLIENTS.set(connected_clients as i64);
}

/// Record a decoded inbound message
pub fn record_message_received(msg_type: &str) {
    WS_MESSAGES_RECEIVED_TOTAL
        .with_label_values(&[msg_type])
        .inc();
}

/// Record an inbound frame that failed to decode
pub fn record_decode_error(code: &str) {
    WS_DECODE_ERRORS_TOTAL.with_label_values(&[code]).inc();
}

/// Record one fan-out pass
pub fn record_broadcast(msg_type: &str, source: &str, delivered: usize) {
    WS_BROADCASTS_TOTAL
        .with_label_values(&[msg_type, source])
        .inc();
    WS_FRAMES_DELIVERED_TOTAL.inc_by(delivered as u64);
}

/// Record a failed fan-out send
pub fn record_send_failure(error: &SendError) {
    let reason = match error {
        SendError::Full => "queue_full",
        SendError::Closed => "closed",
    };
    WS_SEND_FAILURES_TOTAL.with_label_values(&[reason]).inc();
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<f64>().ok());
            if let Some(kb) = rss_kb {
                PROCESS_MEMORY_BYTES.set(kb * 1024.0);
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
