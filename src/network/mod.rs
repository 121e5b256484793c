pub mod codec;
pub mod error;
pub mod link;
pub mod profile;
pub mod types;

pub use codec::WireMessage;
pub use error::{NetworkError, NetworkResult};
pub use link::NetworkLink;
pub use profile::LinkProfile;
pub use types::{
    DeliveryOutcome, ImpairmentDecision, Leg, LinkConfig, LinkStats, LinkStatsSnapshot,
};
