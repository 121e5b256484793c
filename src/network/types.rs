use crate::network::error::{NetworkError, NetworkResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Direction of a frame through the link
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Leg {
    Request,
    Reply,
}

impl Leg {
    pub fn as_str(&self) -> &'static str {
        match self {
            Leg::Request => "request",
            Leg::Reply => "reply",
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-frame impairment draw. Never reused across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImpairmentDecision {
    pub delivered: bool,
    pub applied_delay: Duration,
}

impl ImpairmentDecision {
    pub fn dropped() -> Self {
        Self {
            delivered: false,
            applied_delay: Duration::ZERO,
        }
    }

    pub fn deliver_after(delay: Duration) -> Self {
        Self {
            delivered: true,
            applied_delay: delay,
        }
    }
}

/// What the link did with a transmitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Dropped,
    Scheduled { delay: Duration },
    Duplicated { first: Duration, second: Duration },
}

impl DeliveryOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, DeliveryOutcome::Dropped)
    }
}

/// Impairment configuration for both legs of the link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Upper bound on any delivered frame's one-way delay (at most d/2)
    pub max_one_way_delay: Duration,
    /// Nominal one-way delay before jitter
    pub base_delay: Duration,
    /// Symmetric perturbation around `base_delay`
    pub jitter: Duration,
    /// Probability that a frame is lost (0.0 - 1.0)
    pub loss_probability: f64,
    /// Probability that a delivered frame arrives twice (0.0 - 1.0)
    pub duplicate_probability: f64,
    /// RNG seed; entropy when absent
    pub seed: Option<u64>,
}

impl LinkConfig {
    /// Fixed d/2 delay per leg, no jitter, no loss
    pub fn for_round_trip_bound(round_trip_bound: Duration) -> Self {
        let half = round_trip_bound / 2;
        Self {
            max_one_way_delay: half,
            base_delay: half,
            jitter: Duration::ZERO,
            loss_probability: 0.0,
            duplicate_probability: 0.0,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_loss(mut self, loss_probability: f64) -> Self {
        self.loss_probability = loss_probability;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Check the config against the round-trip bound `d`
    pub fn validate(&self, round_trip_bound: Duration) -> NetworkResult<()> {
        let half = round_trip_bound / 2;
        if self.max_one_way_delay > half {
            return Err(NetworkError::InvalidConfig(format!(
                "max one-way delay {:?} exceeds d/2 = {:?}",
                self.max_one_way_delay, half
            )));
        }
        if self.base_delay > self.max_one_way_delay {
            return Err(NetworkError::InvalidConfig(format!(
                "base delay {:?} exceeds max one-way delay {:?}",
                self.base_delay, self.max_one_way_delay
            )));
        }
        if self.jitter > self.max_one_way_delay {
            return Err(NetworkError::InvalidConfig(format!(
                "jitter {:?} exceeds max one-way delay {:?}",
                self.jitter, self.max_one_way_delay
            )));
        }
        if !(0.0..=1.0).contains(&self.loss_probability) {
            return Err(NetworkError::InvalidConfig(format!(
                "loss probability {} outside [0, 1]",
                self.loss_probability
            )));
        }
        if !(0.0..=1.0).contains(&self.duplicate_probability) {
            return Err(NetworkError::InvalidConfig(format!(
                "duplicate probability {} outside [0, 1]",
                self.duplicate_probability
            )));
        }
        Ok(())
    }
}

/// Counters collected by the link
#[derive(Debug, Default)]
pub struct LinkStats {
    pub frames_sent: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub frames_duplicated: AtomicU64,
    pub frames_delivered: AtomicU64,
    pub total_delay_us: AtomicU64,
}

impl LinkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actual_loss_rate(&self) -> f64 {
        let sent = self.frames_sent.load(Ordering::Relaxed);
        let dropped = self.frames_dropped.load(Ordering::Relaxed);
        if sent > 0 {
            dropped as f64 / sent as f64
        } else {
            0.0
        }
    }

    pub fn average_delay(&self) -> Duration {
        let delivered = self.frames_delivered.load(Ordering::Relaxed);
        let total = self.total_delay_us.load(Ordering::Relaxed);
        if delivered > 0 {
            Duration::from_micros(total / delivered)
        } else {
            Duration::ZERO
        }
    }

    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_duplicated: self.frames_duplicated.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            loss_rate: self.actual_loss_rate(),
            average_delay_secs: self.average_delay().as_secs_f64(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Sent: {}, Dropped: {} ({:.1}%), Duplicated: {}, Delivered: {}, Avg Delay: {:.3}ms",
            self.frames_sent.load(Ordering::Relaxed),
            self.frames_dropped.load(Ordering::Relaxed),
            self.actual_loss_rate() * 100.0,
            self.frames_duplicated.load(Ordering::Relaxed),
            self.frames_delivered.load(Ordering::Relaxed),
            self.average_delay().as_secs_f64() * 1000.0
        )
    }
}

/// Plain copy of [`LinkStats`] for reports
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LinkStatsSnapshot {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub frames_duplicated: u64,
    pub frames_delivered: u64,
    pub loss_rate: f64,
    pub average_delay_secs: f64,
}
