use crate::config::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Evaluated,
    TimedOut,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::Evaluated => "evaluated",
            RoundStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one synchronization round. All times are seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncRoundResult {
    pub sequence_number: u64,
    /// Client clock reading when the request left
    pub sent_at: f64,
    pub round_trip_time: Option<f64>,
    pub estimated_offset: Option<f64>,
    pub uncertainty_bound: Option<f64>,
    pub epsilon_max: f64,
    pub within_tolerance: Option<bool>,
    pub status: RoundStatus,
    /// Wall-clock time the result was recorded
    pub timestamp: DateTime<Utc>,
    /// Reference clock minus client clock at receipt, when observable
    pub true_offset: Option<f64>,
    /// |estimated_offset - true_offset|
    pub measured_error: Option<f64>,
    /// Time since the previous successful sync (or client start)
    pub drift_interval: Option<f64>,
    /// Replies discarded while this round was waiting
    pub stale_replies: u32,
}

impl SyncRoundResult {
    pub fn is_evaluated(&self) -> bool {
        self.status == RoundStatus::Evaluated
    }

    pub fn is_violation(&self) -> bool {
        self.within_tolerance == Some(false)
    }
}

/// How a round's pass/fail decision is made
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TolerancePolicy {
    /// The protocol's guaranteed bound must fit within epsilon_max
    #[default]
    Bound,
    /// The observed error against the reference clock must fit
    MeasuredError,
    /// Both must fit
    Both,
}

impl TolerancePolicy {
    pub fn requires_reference(&self) -> bool {
        !matches!(self, TolerancePolicy::Bound)
    }

    pub fn decide(
        &self,
        uncertainty_bound: f64,
        measured_error: Option<f64>,
        epsilon_max: f64,
    ) -> bool {
        let bound_ok = uncertainty_bound <= epsilon_max;
        let measured_ok = measured_error.map_or(bound_ok, |error| error <= epsilon_max);
        match self {
            TolerancePolicy::Bound => bound_ok,
            TolerancePolicy::MeasuredError => measured_ok,
            TolerancePolicy::Both => bound_ok && measured_ok,
        }
    }
}

/// When the next round starts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundSchedule {
    /// Pause `interval` seconds between rounds
    Fixed { interval: f64 },
    /// Start once `rho * since_last_sync` reaches `fraction * epsilon_max`,
    /// never waiting longer than `max_interval` seconds
    DriftTriggered { fraction: f64, max_interval: f64 },
}

impl Default for RoundSchedule {
    fn default() -> Self {
        RoundSchedule::Fixed { interval: 0.1 }
    }
}

/// Validated run parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncParams {
    pub rounds: u32,
    pub d: f64,
    pub round_trip_bound: Duration,
    pub epsilon_max: f64,
    pub rho: f64,
}

impl SyncParams {
    pub fn new(rounds: u32, d: f64, epsilon_max: f64, rho: f64) -> Result<Self, ConfigError> {
        if rounds == 0 {
            return Err(ConfigError::NoRounds);
        }
        if !d.is_finite() || d <= 0.0 {
            return Err(ConfigError::InvalidRoundTripBound(d));
        }
        let round_trip_bound =
            Duration::try_from_secs_f64(d).map_err(|_| ConfigError::InvalidRoundTripBound(d))?;
        if !epsilon_max.is_finite() || epsilon_max <= 0.0 {
            return Err(ConfigError::InvalidTolerance(epsilon_max));
        }
        if !(0.0..1.0).contains(&rho) {
            return Err(ConfigError::InvalidDriftBound(rho));
        }

        Ok(Self {
            rounds,
            d,
            round_trip_bound,
            epsilon_max,
            rho,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Sent,
    Matched,
    Evaluated,
    TimedOut,
}

impl RoundState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundState::Evaluated | RoundState::TimedOut)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    ReplyMatched,
    Evaluated,
    DeadlineExpired,
    /// The run was cancelled before a reply matched
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_validation() {
        assert!(SyncParams::new(10, 0.02, 0.09, 0.01).is_ok());
        assert!(matches!(
            SyncParams::new(0, 0.02, 0.09, 0.01),
            Err(ConfigError::NoRounds)
        ));
        assert!(matches!(
            SyncParams::new(1, -0.02, 0.09, 0.01),
            Err(ConfigError::InvalidRoundTripBound(_))
        ));
        assert!(matches!(
            SyncParams::new(1, f64::INFINITY, 0.09, 0.01),
            Err(ConfigError::InvalidRoundTripBound(_))
        ));
        assert!(matches!(
            SyncParams::new(1, 0.02, 0.0, 0.01),
            Err(ConfigError::InvalidTolerance(_))
        ));
        assert!(matches!(
            SyncParams::new(1, 0.02, 0.09, 1.0),
            Err(ConfigError::InvalidDriftBound(_))
        ));
        assert!(matches!(
            SyncParams::new(1, 0.02, 0.09, -0.01),
            Err(ConfigError::InvalidDriftBound(_))
        ));
    }

    #[test]
    fn test_params_bound_duration() {
        let params = SyncParams::new(3, 0.02, 0.09, 0.01).unwrap();
        assert_eq!(params.round_trip_bound, Duration::from_millis(20));
    }

    #[test]
    fn test_policy_decisions() {
        assert!(TolerancePolicy::Bound.decide(0.05, Some(0.2), 0.09));
        assert!(!TolerancePolicy::MeasuredError.decide(0.05, Some(0.2), 0.09));
        assert!(TolerancePolicy::MeasuredError.decide(0.2, Some(0.01), 0.09));
        assert!(!TolerancePolicy::Both.decide(0.2, Some(0.01), 0.09));
        assert!(TolerancePolicy::Both.decide(0.05, Some(0.01), 0.09));
        // No ground truth: fall back to the bound
        assert!(!TolerancePolicy::MeasuredError.decide(0.2, None, 0.09));
    }

    #[test]
    fn test_schedule_serde() {
        let schedule: RoundSchedule =
            serde_json::from_str(r#"{"kind":"drift_triggered","fraction":0.8,"max_interval":2.0}"#)
                .unwrap();
        assert_eq!(
            schedule,
            RoundSchedule::DriftTriggered {
                fraction: 0.8,
                max_interval: 2.0
            }
        );
        assert_eq!(
            serde_json::to_string(&RoundStatus::TimedOut).unwrap(),
            "\"timed_out\""
        );
    }
}
