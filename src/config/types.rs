use crate::client::{RoundSchedule, SyncParams, TolerancePolicy};
use crate::config::error::{ConfigError, ConfigResult};
use crate::network::{LinkConfig, LinkProfile};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Full harness configuration. Times are seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub rounds: u32,
    /// Round-trip delay bound
    pub d: f64,
    pub epsilon_max: f64,
    /// Drift rate bound
    pub rho: f64,
    /// CSV output path
    pub output: PathBuf,
    /// Optional JSON summary path
    pub summary: Option<PathBuf>,
    /// Common starting reading for both clocks; wall clock when absent
    pub epoch: Option<f64>,
    /// Prometheus listener address
    pub metrics_addr: Option<SocketAddr>,
    pub link: LinkSettings,
    pub client: ClientSettings,
    pub server: ServerSettings,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            rounds: 10,
            d: 0.02,
            epsilon_max: 0.09,
            rho: 0.01,
            output: PathBuf::from("output.csv"),
            summary: None,
            epoch: None,
            metrics_addr: None,
            link: LinkSettings::default(),
            client: ClientSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl HarnessConfig {
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Validated run parameters
    pub fn params(&self) -> ConfigResult<SyncParams> {
        SyncParams::new(self.rounds, self.d, self.epsilon_max, self.rho)
    }

    /// Check everything that would otherwise fail mid-run
    pub fn validate(&self) -> ConfigResult<()> {
        let params = self.params()?;
        self.link_config(params.round_trip_bound)?;
        self.client.validate()?;

        let client_drift = self.client_drift_rate();
        if client_drift.abs() > self.rho {
            return Err(ConfigError::DriftExceedsBound {
                which: "client",
                rate: client_drift,
                rho: self.rho,
            });
        }
        if !self.server.drift_rate.is_finite() || self.server.drift_rate.abs() > self.rho {
            return Err(ConfigError::DriftExceedsBound {
                which: "server",
                rate: self.server.drift_rate,
                rho: self.rho,
            });
        }
        if !self.server.initial_offset.is_finite() {
            return Err(ConfigError::InvalidClient(format!(
                "initial offset {} is not finite",
                self.server.initial_offset
            )));
        }
        Ok(())
    }

    /// Client oscillator drift; defaults to the full bound
    pub fn client_drift_rate(&self) -> f64 {
        self.client.drift_rate.unwrap_or(self.rho)
    }

    /// Build the link config: profile first, explicit settings on top
    pub fn link_config(&self, round_trip_bound: Duration) -> ConfigResult<LinkConfig> {
        let mut config = match &self.link.profile {
            Some(name) => {
                LinkProfile::by_name(name, round_trip_bound)
                    .ok_or_else(|| ConfigError::UnknownProfile(name.clone()))?
                    .config
            }
            None => LinkConfig::for_round_trip_bound(round_trip_bound),
        };

        let link = &self.link;
        if let Some(max) = link.max_one_way_delay {
            config.max_one_way_delay = seconds("max_one_way_delay", max)?;
            if link.base_delay.is_none() {
                config.base_delay = config.base_delay.min(config.max_one_way_delay);
            }
        }
        if let Some(base) = link.base_delay {
            config.base_delay = seconds("base_delay", base)?;
        }
        if let Some(jitter) = link.jitter {
            config.jitter = seconds("jitter", jitter)?;
        }
        if let Some(loss) = link.loss_probability {
            config.loss_probability = loss;
        }
        if let Some(duplicate) = link.duplicate_probability {
            config.duplicate_probability = duplicate;
        }
        if link.seed.is_some() {
            config.seed = link.seed;
        }

        config
            .validate(round_trip_bound)
            .map_err(|e| ConfigError::InvalidLink(e.to_string()))?;
        Ok(config)
    }
}

fn seconds(name: &str, value: f64) -> ConfigResult<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        ConfigError::InvalidLink(format!("{name} must be a non-negative duration, got {value}"))
    })
}

/// Link impairment overrides. Unset fields come from the profile (or the
/// fixed d/2 link when no profile is named).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    pub profile: Option<String>,
    pub max_one_way_delay: Option<f64>,
    pub base_delay: Option<f64>,
    pub jitter: Option<f64>,
    pub loss_probability: Option<f64>,
    pub duplicate_probability: Option<f64>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Added to d to form the round deadline
    pub timeout_margin: f64,
    pub schedule: RoundSchedule,
    pub policy: TolerancePolicy,
    /// Client oscillator drift; the harness uses rho when unset
    pub drift_rate: Option<f64>,
    /// Step the client clock onto the estimate after each successful round
    pub apply_correction: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout_margin: 0.01,
            schedule: RoundSchedule::default(),
            policy: TolerancePolicy::default(),
            drift_rate: None,
            apply_correction: true,
        }
    }
}

impl ClientSettings {
    pub fn timeout_margin(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_margin).unwrap_or(Duration::ZERO)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !self.timeout_margin.is_finite() || self.timeout_margin < 0.0 {
            return Err(ConfigError::InvalidClient(format!(
                "timeout margin must be non-negative, got {}",
                self.timeout_margin
            )));
        }
        match self.schedule {
            RoundSchedule::Fixed { interval } => {
                if !interval.is_finite() || interval < 0.0 {
                    return Err(ConfigError::InvalidClient(format!(
                        "round interval must be non-negative, got {interval}"
                    )));
                }
            }
            RoundSchedule::DriftTriggered {
                fraction,
                max_interval,
            } => {
                if !(fraction > 0.0 && fraction <= 1.0) {
                    return Err(ConfigError::InvalidClient(format!(
                        "drift trigger fraction must be in (0, 1], got {fraction}"
                    )));
                }
                if !max_interval.is_finite() || max_interval < 0.0 {
                    return Err(ConfigError::InvalidClient(format!(
                        "max interval must be non-negative, got {max_interval}"
                    )));
                }
            }
        }
        if let Some(rate) = self.drift_rate {
            if !rate.is_finite() || rate <= -1.0 {
                return Err(ConfigError::InvalidClient(format!(
                    "client drift rate {rate} is not a valid rate"
                )));
            }
        }
        Ok(())
    }
}

/// Reference clock setup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub drift_rate: f64,
    /// Reference clock lead over the client at start
    pub initial_offset: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const D: Duration = Duration::from_millis(20);

    #[test]
    fn test_default_config_is_valid() {
        let config = HarnessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.client_drift_rate(), config.rho);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = HarnessConfig::from_json_str(
            r#"{
                "rounds": 25,
                "epsilon_max": 0.05,
                "link": { "jitter": 0.002, "loss_probability": 0.1, "seed": 9 },
                "client": { "policy": "both", "schedule": { "kind": "fixed", "interval": 0.5 } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.rounds, 25);
        assert_eq!(config.d, 0.02);
        assert_eq!(config.client.policy, TolerancePolicy::Both);
        assert_eq!(config.client.schedule, RoundSchedule::Fixed { interval: 0.5 });
        assert!(config.client.apply_correction);

        let link = config.link_config(D).unwrap();
        assert_eq!(link.jitter, Duration::from_millis(2));
        assert_eq!(link.seed, Some(9));
        assert_eq!(link.base_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_profile_with_override() {
        let config = HarnessConfig {
            link: LinkSettings {
                profile: Some("wifi".to_string()),
                loss_probability: Some(0.0),
                ..Default::default()
            },
            ..Default::default()
        };

        let link = config.link_config(D).unwrap();
        assert_eq!(link.loss_probability, 0.0);
        assert_eq!(link.duplicate_probability, 0.01);
    }

    #[test]
    fn test_unknown_profile_rejected() {
        let config = HarnessConfig {
            link: LinkSettings {
                profile: Some("carrier-pigeon".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let negative_delay = HarnessConfig {
            d: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            negative_delay.validate(),
            Err(ConfigError::InvalidRoundTripBound(_))
        ));

        let bad_loss = HarnessConfig {
            link: LinkSettings {
                loss_probability: Some(1.2),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(bad_loss.validate(), Err(ConfigError::InvalidLink(_))));

        let slow_link = HarnessConfig {
            link: LinkSettings {
                max_one_way_delay: Some(0.5),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(slow_link.validate(), Err(ConfigError::InvalidLink(_))));

        let drifting_server = HarnessConfig {
            server: ServerSettings {
                drift_rate: 0.5,
                initial_offset: 0.0,
            },
            ..Default::default()
        };
        assert!(matches!(
            drifting_server.validate(),
            Err(ConfigError::DriftExceedsBound { which: "server", .. })
        ));

        let negative_margin = HarnessConfig {
            client: ClientSettings {
                timeout_margin: -0.1,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            negative_margin.validate(),
            Err(ConfigError::InvalidClient(_))
        ));
    }

    #[test]
    fn test_smaller_max_delay_pulls_base_down() {
        let config = HarnessConfig {
            link: LinkSettings {
                max_one_way_delay: Some(0.004),
                ..Default::default()
            },
            ..Default::default()
        };
        let link = config.link_config(D).unwrap();
        assert_eq!(link.max_one_way_delay, Duration::from_millis(4));
        assert_eq!(link.base_delay, Duration::from_millis(4));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = HarnessConfig::from_json_file("/nonexistent/harness.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/harness.json"));
    }
}
