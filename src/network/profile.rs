//! Predefined link profiles
//!
//! Delays are expressed as fractions of the one-way budget d/2 so every
//! profile stays valid for any round-trip bound.

use crate::network::types::LinkConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Named link profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkProfile {
    pub name: String,
    pub description: String,
    pub config: LinkConfig,
}

impl LinkProfile {
    pub const NAMES: [&'static str; 6] = ["perfect", "lan", "wifi", "wan", "lossy_wan", "blackout"];

    /// Get all predefined profiles for a round-trip bound
    pub fn all_profiles(round_trip_bound: Duration) -> Vec<LinkProfile> {
        Self::NAMES
            .iter()
            .filter_map(|name| Self::by_name(name, round_trip_bound))
            .collect()
    }

    /// Look up a profile by name
    pub fn by_name(name: &str, round_trip_bound: Duration) -> Option<LinkProfile> {
        let profile = match name {
            "perfect" => Self::perfect(round_trip_bound),
            "lan" => Self::lan(round_trip_bound),
            "wifi" => Self::wifi(round_trip_bound),
            "wan" => Self::wan(round_trip_bound),
            "lossy_wan" => Self::lossy_wan(round_trip_bound),
            "blackout" => Self::blackout(round_trip_bound),
            _ => return None,
        };
        Some(profile)
    }

    /// Fixed d/2 per leg, nothing lost
    pub fn perfect(round_trip_bound: Duration) -> Self {
        Self {
            name: "perfect".to_string(),
            description: "Fixed d/2 delay per leg, no jitter or loss".to_string(),
            config: LinkConfig::for_round_trip_bound(round_trip_bound),
        }
    }

    pub fn lan(round_trip_bound: Duration) -> Self {
        let half = round_trip_bound / 2;
        Self {
            name: "lan".to_string(),
            description: "Short delays, light jitter, 0.1% loss".to_string(),
            config: LinkConfig {
                base_delay: half / 10,
                jitter: half / 20,
                loss_probability: 0.001,
                ..LinkConfig::for_round_trip_bound(round_trip_bound)
            },
        }
    }

    pub fn wifi(round_trip_bound: Duration) -> Self {
        let half = round_trip_bound / 2;
        Self {
            name: "wifi".to_string(),
            description: "Moderate jitter, 2% loss, occasional duplicates".to_string(),
            config: LinkConfig {
                base_delay: half / 4,
                jitter: half / 4,
                loss_probability: 0.02,
                duplicate_probability: 0.01,
                ..LinkConfig::for_round_trip_bound(round_trip_bound)
            },
        }
    }

    pub fn wan(round_trip_bound: Duration) -> Self {
        let half = round_trip_bound / 2;
        Self {
            name: "wan".to_string(),
            description: "Delays near the bound, heavy jitter, 5% loss".to_string(),
            config: LinkConfig {
                base_delay: half * 3 / 4,
                jitter: half / 2,
                loss_probability: 0.05,
                ..LinkConfig::for_round_trip_bound(round_trip_bound)
            },
        }
    }

    pub fn lossy_wan(round_trip_bound: Duration) -> Self {
        let half = round_trip_bound / 2;
        Self {
            name: "lossy_wan".to_string(),
            description: "WAN delays with 20% loss and 2% duplicates".to_string(),
            config: LinkConfig {
                base_delay: half * 3 / 4,
                jitter: half / 2,
                loss_probability: 0.20,
                duplicate_probability: 0.02,
                ..LinkConfig::for_round_trip_bound(round_trip_bound)
            },
        }
    }

    /// Every frame lost
    pub fn blackout(round_trip_bound: Duration) -> Self {
        Self {
            name: "blackout".to_string(),
            description: "Link down, every frame lost".to_string(),
            config: LinkConfig::for_round_trip_bound(round_trip_bound).with_loss(1.0),
        }
    }
}
