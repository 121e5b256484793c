//! Cristian offset estimate and uncertainty bound
//!
//! The reply is assumed to have been stamped at the midpoint of the round, so
//! the estimate is off by at most half the round-trip time. Drift since the
//! last successful sync widens the bound by `rho` per elapsed second.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundMeasurement {
    pub round_trip_time: f64,
    pub estimated_offset: f64,
    pub measurement_uncertainty: f64,
    pub drift_uncertainty: f64,
    pub uncertainty_bound: f64,
}

/// `server_timestamp + rtt/2 - t1`
pub fn estimate_offset(server_timestamp: f64, t1: f64, round_trip_time: f64) -> f64 {
    server_timestamp + round_trip_time / 2.0 - t1
}

/// `rho * since_last_sync`, never negative
pub fn drift_uncertainty(rho: f64, since_last_sync: Duration) -> f64 {
    rho.abs() * since_last_sync.as_secs_f64()
}

/// `round_trip` is elapsed runtime between send and receipt; `t1` is the
/// local clock at receipt and only enters the offset.
pub fn measure(
    round_trip: Duration,
    t1: f64,
    server_timestamp: f64,
    rho: f64,
    since_last_sync: Duration,
) -> RoundMeasurement {
    let round_trip_time = round_trip.as_secs_f64();
    let measurement_uncertainty = round_trip_time / 2.0;
    let drift_uncertainty = drift_uncertainty(rho, since_last_sync);

    RoundMeasurement {
        round_trip_time,
        estimated_offset: estimate_offset(server_timestamp, t1, round_trip_time),
        measurement_uncertainty,
        drift_uncertainty,
        uncertainty_bound: measurement_uncertainty + drift_uncertainty,
    }
}
