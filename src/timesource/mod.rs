pub mod clock;
pub mod service;
pub mod types;

pub use clock::{ClockProbe, LogicalClock};
pub use service::TimeSource;
pub use types::{SyncReply, SyncRequest};
