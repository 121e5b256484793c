use crate::client::TolerancePolicy;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Round count must be at least 1")]
    NoRounds,

    #[error("Round-trip bound d must be positive and finite, got {0}")]
    InvalidRoundTripBound(f64),

    #[error("epsilon_max must be positive and finite, got {0}")]
    InvalidTolerance(f64),

    #[error("Drift bound rho must be in [0, 1), got {0}")]
    InvalidDriftBound(f64),

    #[error("{which} drift rate {rate} exceeds rho = {rho}")]
    DriftExceedsBound {
        which: &'static str,
        rate: f64,
        rho: f64,
    },

    #[error("Invalid link setting: {0}")]
    InvalidLink(String),

    #[error("Invalid client setting: {0}")]
    InvalidClient(String),

    #[error("Unknown link profile: {0}")]
    UnknownProfile(String),

    #[error("Tolerance policy {0:?} needs an observable reference clock")]
    MissingReference(TolerancePolicy),

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
