//! Prometheus metrics exporter
//!
//! Exposes run metrics over HTTP for Prometheus scraping.

use crate::metrics::recorder::init_metrics;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;

/// Global prometheus handle
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics server configuration
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics listener
    pub listen_addr: SocketAddr,
}

impl MetricsConfig {
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self { listen_addr: addr }
    }
}

/// Install the Prometheus recorder and start its HTTP listener.
///
/// Must be called from inside a tokio runtime. Only the first call installs
/// anything; later calls return the existing handle.
pub fn start_metrics_server(
    config: MetricsConfig,
) -> Result<&'static PrometheusHandle, MetricsError> {
    init_metrics();

    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }

    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .build()
        .map_err(|e| MetricsError::SetupFailed(e.to_string()))?;

    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|_| MetricsError::AlreadyInitialized)?;

    tokio::spawn(async move {
        if exporter.await.is_err() {
            tracing::warn!("Metrics exporter stopped");
        }
    });

    tracing::info!(addr = %config.listen_addr, "Metrics listener started");

    let _ = PROMETHEUS_HANDLE.set(handle);
    PROMETHEUS_HANDLE
        .get()
        .ok_or(MetricsError::AlreadyInitialized)
}

/// Errors that can occur during metrics setup
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to setup metrics: {0}")]
    SetupFailed(String),

    #[error("Metrics already initialized")]
    AlreadyInitialized,
}
