use axum::{http::StatusCode, response::Json, routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Readiness check response.
#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    ready: bool,
}

/// Shared readiness state.
#[derive(Clone, Default)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a new health state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mark the service as ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Check if the service is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

/// # Errors
///
/// Returns an error if binding the metrics HTTP server fails.
pub async fn start_metrics_server(
    addr: SocketAddr,
    health_state: HealthState,
) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let app = Router::new()
        .route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
        .route("/health", get(health_handler))
        .route("/ready", get(move || ready_handler(health_state.clone())));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Health check handler - returns 200 if server is running.
async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Readiness check handler - returns 200 if ready, 503 if not.
async fn ready_handler(state: HealthState) -> (StatusCode, Json<ReadyResponse>) {
    if state.is_ready() {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready",
                ready: true,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "not ready",
                ready: false,
            }),
        )
    }
}

/// Broker gauges.
pub mod gauges {
    /// Increment the active connections gauge.
    pub fn inc_connections_active() {
        metrics::gauge!("aux_connections_active").increment(1.0);
    }

    /// Decrement the active connections gauge.
    pub fn dec_connections_active() {
        metrics::gauge!("aux_connections_active").decrement(1.0);
    }

    /// Record the current number of live rooms.
    pub fn set_rooms_active(count: usize) {
        metrics::gauge!("aux_rooms_active").set(count as f64);
    }

    /// Record the current number of pending invites.
    pub fn set_invites_pending(count: usize) {
        metrics::gauge!("aux_invites_pending").set(count as f64);
    }
}

/// Event counters.
pub mod counters {
    /// Count a protocol frame in the given direction.
    pub fn frames_total(direction: &'static str) {
        metrics::counter!("aux_frames_total", "direction" => direction).increment(1);
    }

    /// Count a dropped frame with the given reason label.
    pub fn frames_dropped_total(reason: &'static str) {
        metrics::counter!("aux_frames_dropped_total", "reason" => reason).increment(1);
    }

    /// Count a successful registration.
    pub fn registrations_total() {
        metrics::counter!("aux_registrations_total").increment(1);
    }

    /// Count an invite reaching the given terminal outcome.
    pub fn invites_total(outcome: &'static str) {
        metrics::counter!("aux_invites_total", "outcome" => outcome).increment(1);
    }

    /// Count a relayed signal payload.
    pub fn signals_relayed_total() {
        metrics::counter!("aux_signals_relayed_total").increment(1);
    }

    /// Count a playback command fan-out.
    pub fn play_commands_total() {
        metrics::counter!("aux_play_commands_total").increment(1);
    }

    /// Count an `error` frame sent to a client.
    pub fn errors_sent_total() {
        metrics::counter!("aux_errors_sent_total").increment(1);
    }
}
