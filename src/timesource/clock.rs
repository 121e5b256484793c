//! Drifting logical clock
//!
//! Readings are seconds as `f64`, anchored at an origin [`Instant`] taken from
//! the tokio clock so a paused runtime drives them deterministically.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Clock running at a fixed fractional rate error against the runtime clock.
///
/// `current_time() = base_time + elapsed * (1 + drift_rate)`
#[derive(Debug, Clone)]
pub struct LogicalClock {
    base_time: f64,
    drift_rate: f64,
    origin: Instant,
}

impl LogicalClock {
    /// Create a clock reading `base_time` now
    pub fn new(base_time: f64, drift_rate: f64) -> Self {
        Self::starting_at(Instant::now(), base_time, drift_rate)
    }

    /// Create a clock reading `base_time` at `origin`
    pub fn starting_at(origin: Instant, base_time: f64, drift_rate: f64) -> Self {
        Self {
            base_time,
            drift_rate,
            origin,
        }
    }

    pub fn base_time(&self) -> f64 {
        self.base_time
    }

    pub fn drift_rate(&self) -> f64 {
        self.drift_rate
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }

    /// Read the clock now
    pub fn current_time(&self) -> f64 {
        self.time_at(Instant::now())
    }

    /// Evaluate the clock at an arbitrary instant.
    ///
    /// Instants before the origin read as `base_time`.
    pub fn time_at(&self, instant: Instant) -> f64 {
        let elapsed = self.elapsed_at(instant).as_secs_f64();
        self.base_time + elapsed * (1.0 + self.drift_rate)
    }

    /// Runtime time elapsed since the origin
    pub fn elapsed_at(&self, instant: Instant) -> Duration {
        instant.saturating_duration_since(self.origin)
    }

    /// Re-anchor the clock so that it reads `value` at `at`.
    ///
    /// The drift rate is a property of the oscillator and survives the step.
    pub fn rebase(&mut self, at: Instant, value: f64) {
        self.origin = at;
        self.base_time = value;
    }
}

/// Read-only view of a shared clock, used to observe ground truth
#[derive(Debug, Clone)]
pub struct ClockProbe {
    clock: Arc<LogicalClock>,
}

impl ClockProbe {
    pub fn new(clock: Arc<LogicalClock>) -> Self {
        Self { clock }
    }

    pub fn current_time(&self) -> f64 {
        self.clock.current_time()
    }

    pub fn time_at(&self, instant: Instant) -> f64 {
        self.clock.time_at(instant)
    }

    pub fn drift_rate(&self) -> f64 {
        self.clock.drift_rate()
    }
}
