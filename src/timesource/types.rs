use serde::{Deserialize, Serialize};

/// Client request; timestamps are client clock seconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SyncRequest {
    pub sequence_number: u64,
    pub send_timestamp: f64,
}

/// Server reply; timestamps are reference clock seconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SyncReply {
    pub echo_sequence_number: u64,
    /// Reading taken on receipt of the request
    pub server_timestamp: f64,
    /// Reading taken immediately before the reply leaves
    pub server_send_timestamp: f64,
}
