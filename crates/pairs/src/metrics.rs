//! Prometheus exporter plus liveness and readiness endpoints.

use crate::server::ServerState;
use axum::extract::State;
use axum::{http::StatusCode, response::Json, routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    peers: usize,
    connections: usize,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    ready: bool,
}

/// Readiness flag shared between the relay and the health endpoint.
///
/// Starts ready; flipped off when the relay begins draining.
#[derive(Clone)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mark the service as ready or not.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Check if the service is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
struct Observed {
    health: HealthState,
    relay: Arc<ServerState>,
}

/// Serve `/metrics`, `/health` and `/ready` on `addr`.
///
/// # Errors
///
/// Returns an error if the Prometheus recorder cannot be installed or
/// binding the HTTP listener fails.
pub async fn start_metrics_server(
    addr: SocketAddr,
    health: HealthState,
    relay: Arc<ServerState>,
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
        .route("/ready", get(|State(observed): State<Observed>| ready_handler(observed.health)))
        .with_state(Observed { health, relay });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Liveness: always 200 while the process serves, with registry counts.
async fn health_handler(State(observed): State<Observed>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            peers: observed.relay.registry.len(),
            connections: observed.relay.active_connections(),
        }),
    )
}

/// Readiness: 200 while accepting connections, 503 while draining.
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
                status: "draining",
                ready: false,
            }),
        )
    }
}

/// Connection and registry gauges.
pub mod gauges {
    /// Increment the active connections gauge.
    pub fn inc_connections_active() {
        metrics::gauge!("pair_connections_active").increment(1.0);
    }

    /// Decrement the active connections gauge.
    pub fn dec_connections_active() {
        metrics::gauge!("pair_connections_active").decrement(1.0);
    }

    /// Increment the registered peers gauge.
    pub fn inc_peers_registered() {
        metrics::gauge!("pair_peers_registered").increment(1.0);
    }

    /// Decrement the registered peers gauge.
    pub fn dec_peers_registered() {
        metrics::gauge!("pair_peers_registered").decrement(1.0);
    }
}

/// Event counters.
pub mod counters {
    /// Record a registration attempt with the given status label.
    pub fn registrations_total(status: &'static str) {
        metrics::counter!("pair_registrations_total", "status" => status).increment(1);
    }

    /// Increment the relayed-messages counter for an envelope type.
    pub fn messages_relayed_total(kind: &str) {
        metrics::counter!("pair_messages_relayed_total", "type" => kind.to_owned()).increment(1);
    }

    /// Increment the dropped-messages counter with the given reason label.
    pub fn messages_dropped_total(reason: &'static str) {
        metrics::counter!("pair_messages_dropped_total", "reason" => reason).increment(1);
    }

    /// Record a binary frame that was received and discarded.
    pub fn binary_frames_total(bytes: u64) {
        metrics::counter!("pair_binary_frames_total").increment(1);
        metrics::counter!("pair_binary_bytes_total").increment(bytes);
    }
}

/// Latency histograms.
pub mod histograms {
    /// Record how long handling one inbound text message took, in seconds.
    pub fn relay_latency_seconds(value: f64) {
        metrics::histogram!("pair_relay_latency_seconds").record(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_state_defaults_to_ready() {
        let state = HealthState::new();
        assert!(state.is_ready());
        state.set_ready(false);
        assert!(!state.is_ready());
    }

    #[test]
    fn clones_share_readiness() {
        let state = HealthState::new();
        let clone = state.clone();
        clone.set_ready(false);
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn ready_handler_reports_unavailable_when_not_ready() {
        let state = HealthState::new();
        state.set_ready(false);
        let (status, body) = ready_handler(state).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.0.ready);
    }
}
