//! Round-trip clock synchronization harness.
//!
//! A reference [`timesource::TimeSource`] answers timestamp requests through an
//! impairing [`network::NetworkLink`]; a [`client::SyncClient`] runs sequential
//! Cristian-style rounds against it and checks every round's uncertainty bound
//! against a configured tolerance.

pub mod client;
pub mod config;
pub mod harness;
pub mod metrics;
pub mod network;
pub mod report;
pub mod timesource;

pub use client::{RoundStatus, SyncClient, SyncError, SyncRoundResult, TolerancePolicy};
pub use config::{ConfigError, HarnessConfig};
pub use harness::{Harness, RunReport};
pub use network::{LinkConfig, NetworkLink};
pub use timesource::{LogicalClock, TimeSource};
