//! Metrics recorder for synchronization runs
//!
//! Records round outcomes, link behaviour and run lifecycle.

use crate::client::SyncRoundResult;
use crate::network::Leg;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    describe_metrics();
}

fn describe_metrics() {
    // Round counters
    describe_counter!(
        "clocksync_rounds_evaluated_total",
        "Rounds that received a matching reply"
    );
    describe_counter!(
        "clocksync_rounds_timed_out_total",
        "Rounds whose deadline expired without a matching reply"
    );
    describe_counter!(
        "clocksync_tolerance_violations_total",
        "Evaluated rounds outside epsilon_max"
    );
    describe_counter!(
        "clocksync_stale_replies_total",
        "Replies discarded for a sequence mismatch"
    );

    // Link counters
    describe_counter!("clocksync_frames_dropped_total", "Frames dropped by the link");
    describe_counter!(
        "clocksync_frames_delivered_total",
        "Frames delivered by the link"
    );

    // Run lifecycle
    describe_counter!("clocksync_runs_started_total", "Synchronization runs started");
    describe_counter!(
        "clocksync_runs_completed_total",
        "Synchronization runs that finished every round"
    );
    describe_gauge!("clocksync_active_runs", "Runs currently in progress");
    describe_histogram!("clocksync_run_rounds", "Rounds requested per run");

    // Histograms
    describe_histogram!("clocksync_round_trip_seconds", "Measured round-trip time");
    describe_histogram!(
        "clocksync_uncertainty_bound_seconds",
        "Uncertainty bound per evaluated round"
    );
    describe_histogram!(
        "clocksync_offset_seconds",
        "Absolute estimated offset per evaluated round"
    );
    describe_histogram!(
        "clocksync_measured_error_seconds",
        "Distance between estimated and true offset"
    );
    describe_histogram!("clocksync_link_delay_seconds", "One-way link delay");
    describe_histogram!("clocksync_run_duration_seconds", "Wall time of a full run");
}

// ============== Rounds ==============

/// Record a finished round of either status
pub fn record_round(result: &SyncRoundResult) {
    if result.stale_replies > 0 {
        counter!("clocksync_stale_replies_total").increment(u64::from(result.stale_replies));
    }

    if !result.is_evaluated() {
        counter!("clocksync_rounds_timed_out_total").increment(1);
        return;
    }

    counter!("clocksync_rounds_evaluated_total").increment(1);
    if result.is_violation() {
        counter!("clocksync_tolerance_violations_total").increment(1);
    }

    if let Some(rtt) = result.round_trip_time {
        histogram!("clocksync_round_trip_seconds").record(rtt);
    }
    if let Some(bound) = result.uncertainty_bound {
        histogram!("clocksync_uncertainty_bound_seconds").record(bound);
    }
    if let Some(offset) = result.estimated_offset {
        histogram!("clocksync_offset_seconds").record(offset.abs());
    }
    if let Some(error) = result.measured_error {
        histogram!("clocksync_measured_error_seconds").record(error);
    }
}

// ============== Link ==============

pub fn record_frame_dropped(leg: Leg) {
    counter!("clocksync_frames_dropped_total", "leg" => leg.as_str()).increment(1);
}

pub fn record_frame_delivered(leg: Leg, delay: Duration) {
    counter!("clocksync_frames_delivered_total", "leg" => leg.as_str()).increment(1);
    histogram!("clocksync_link_delay_seconds", "leg" => leg.as_str()).record(delay.as_secs_f64());
}

// ============== Runs ==============

fn record_run_started(run_id: &str, rounds: u32) {
    counter!("clocksync_runs_started_total", "run_id" => run_id.to_string()).increment(1);
    gauge!("clocksync_active_runs").increment(1.0);
    histogram!("clocksync_run_rounds").record(f64::from(rounds));
}

fn record_run_complete(run_id: &str, duration: Duration, evaluated: usize, timed_out: usize) {
    counter!("clocksync_runs_completed_total", "run_id" => run_id.to_string()).increment(1);
    histogram!("clocksync_run_duration_seconds").record(duration.as_secs_f64());
    tracing::trace!(run_id, evaluated, timed_out, "Run metrics recorded");
}

/// Tracks one run; the active-runs gauge drops when this is dropped, so
/// cancelled and failed runs are accounted for too.
pub struct RunMetrics {
    run_id: String,
    start_time: Instant,
}

impl RunMetrics {
    pub fn start(run_id: impl Into<String>, rounds: u32) -> Self {
        let run_id = run_id.into();
        record_run_started(&run_id, rounds);

        Self {
            run_id,
            start_time: Instant::now(),
        }
    }

    /// Mark the run as having finished every round
    pub fn complete(self, evaluated: usize, timed_out: usize) {
        record_run_complete(&self.run_id, self.start_time.elapsed(), evaluated, timed_out);
    }
}

impl Drop for RunMetrics {
    fn drop(&mut self) {
        gauge!("clocksync_active_runs").decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RoundStatus;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn test_init_metrics() {
        // Should not panic when called multiple times
        init_metrics();
        init_metrics();
    }

    fn evaluated_round() -> SyncRoundResult {
        SyncRoundResult {
            sequence_number: 1,
            sent_at: 0.0,
            round_trip_time: Some(0.02),
            estimated_offset: Some(-0.001),
            uncertainty_bound: Some(0.011),
            epsilon_max: 0.09,
            within_tolerance: Some(true),
            status: RoundStatus::Evaluated,
            timestamp: chrono::Utc::now(),
            true_offset: None,
            measured_error: None,
            drift_interval: Some(0.0),
            stale_replies: 2,
        }
    }

    #[test]
    fn test_record_without_recorder() {
        record_round(&evaluated_round());
        record_frame_dropped(Leg::Request);
        record_frame_delivered(Leg::Reply, Duration::from_millis(10));
    }

    #[test]
    fn test_run_metrics() {
        let metrics = RunMetrics::start("test-run", 10);
        metrics.complete(9, 1);
    }

    #[test]
    fn test_every_recorded_metric_is_described() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_metrics();
            RunMetrics::start("described", 4).complete(3, 1);
            record_round(&evaluated_round());
            record_frame_dropped(Leg::Request);
            record_frame_delivered(Leg::Reply, Duration::from_millis(10));
        });

        let rendered = handle.render();
        for name in [
            "clocksync_run_rounds",
            "clocksync_runs_started_total",
            "clocksync_runs_completed_total",
            "clocksync_run_duration_seconds",
            "clocksync_rounds_evaluated_total",
            "clocksync_stale_replies_total",
            "clocksync_round_trip_seconds",
            "clocksync_frames_dropped_total",
            "clocksync_link_delay_seconds",
        ] {
            assert!(rendered.contains(&format!("# HELP {name} ")), "{name} undescribed");
        }
    }
}
