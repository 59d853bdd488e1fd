//! Tracing setup and the Prometheus metrics endpoint each binary serves.
use anyhow::Context;
use autometrics::prometheus_exporter::{self, PrometheusResponse};
use tracing_subscriber::EnvFilter;

/// Serves `/metrics` on the given port until the process exits. Binaries
/// spawn this as a background task; a bind failure (several workers sharing a
/// host will race for the port) is reported, not fatal.
pub async fn run_metrics_server(port: u16) -> anyhow::Result<()> {
    prometheus_exporter::init();

    async fn metrics() -> PrometheusResponse {
        prometheus_exporter::encode_http_response()
    }

    let app = axum::Router::new().route("/metrics", axum::routing::get(metrics));
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{port}"))
        .await
        .with_context(|| format!("Failed to bind metrics port {port}"))?;
    axum::serve(listener, app)
        .await
        .context("Metrics server stopped")?;
    Ok(())
}

/// Spawns the metrics server, downgrading failures to a warning.
pub fn spawn_metrics_server(port: u16) {
    tokio::task::spawn(async move {
        if let Err(e) = run_metrics_server(port).await {
            tracing::warn!("Metrics endpoint unavailable: {}", e);
        }
    });
}

/// Installs a subscriber that prints formatted traces to stdout, filtered by
/// `RUST_LOG`.
pub fn setup_tracing() {
    let filter = EnvFilter::from_default_env();
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        tracing::info!("Tracing initialized");
    }
}
