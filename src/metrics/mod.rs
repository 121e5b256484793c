//! Metrics and observability module
//!
//! Prometheus-compatible metrics for synchronization runs:
//! - Round outcomes (evaluated, timed out, violations, stale replies)
//! - Round-trip time, uncertainty bound and offset distributions
//! - Link drops and delays per leg

pub mod exporter;
pub mod recorder;

pub use exporter::{start_metrics_server, MetricsConfig, MetricsError};
pub use recorder::{
    init_metrics, record_frame_delivered, record_frame_dropped, record_round, RunMetrics,
};
