pub mod bound;
mod client;
mod error;
mod state_machine;
mod types;

pub use bound::RoundMeasurement;
pub use client::SyncClient;
pub use error::{SyncError, SyncResult};
pub use state_machine::RoundStateMachine;
pub use types::{
    RoundEvent, RoundSchedule, RoundState, RoundStatus, SyncParams, SyncRoundResult,
    TolerancePolicy,
};
