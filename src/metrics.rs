//! Prometheus gauges and the optional `/health` `/metrics` HTTP server

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::{MarketDataError, Result};
use crate::latency::LatencyStats;

/// Per-host latency gauges, in microseconds
#[derive(Clone)]
pub struct ConnectionMetrics {
    latency_avg: IntGaugeVec,
    latency_min: IntGaugeVec,
    latency_max: IntGaugeVec,
    updates: IntGaugeVec,
    up: IntGaugeVec,
}

fn host_gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGaugeVec> {
    let gauge = IntGaugeVec::new(Opts::new(name, help), &["host"])?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn micros(d: std::time::Duration) -> i64 {
    i64::try_from(d.as_micros()).unwrap_or(i64::MAX)
}

impl ConnectionMetrics {
    pub fn register(registry: &Registry) -> Result<Self> {
        Ok(Self {
            latency_avg: host_gauge(
                registry,
                "depth_latency_avg_us",
                "Average depth event latency since the last failure",
            )?,
            latency_min: host_gauge(registry, "depth_latency_min_us", "Minimum depth event latency")?,
            latency_max: host_gauge(registry, "depth_latency_max_us", "Maximum depth event latency")?,
            updates: host_gauge(registry, "depth_updates", "Depth events measured")?,
            up: host_gauge(registry, "depth_connection_up", "1 while the connection is running")?,
        })
    }

    /// Publish one connection's current state
    pub fn observe(&self, host: &str, running: bool, stats: &LatencyStats) {
        self.up.with_label_values(&[host]).set(i64::from(running));
        self.updates
            .with_label_values(&[host])
            .set(i64::try_from(stats.count()).unwrap_or(i64::MAX));
        self.latency_avg
            .with_label_values(&[host])
            .set(micros(stats.average()));
        self.latency_min
            .with_label_values(&[host])
            .set(stats.min().map(micros).unwrap_or(0));
        self.latency_max
            .with_label_values(&[host])
            .set(stats.max().map(micros).unwrap_or(0));
    }
}

/// Text exposition of everything in `registry`
pub fn render_metrics(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| MarketDataError::MetricsError(e.to_string()))
}

fn router(registry: Registry) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

/// Serve `/health` and `/metrics` on `0.0.0.0:port` until cancelled
pub async fn serve_http(port: u16, registry: Registry, cancel: CancellationToken) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, registry, cancel).await
}

pub async fn serve_on(
    listener: TcpListener,
    registry: Registry,
    cancel: CancellationToken,
) -> Result<()> {
    info!(addr = ?listener.local_addr().ok(), "Starting metrics server");
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    info!("Metrics server stopped");
    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "depth-latency",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(registry): State<Registry>) -> (StatusCode, String) {
    match render_metrics(&registry) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            warn!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
