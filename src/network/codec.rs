//! Wire encoding for frames crossing the link
//!
//! Timestamps travel as `f64` seconds, sequence numbers as `u64`.

use crate::network::error::NetworkResult;
use crate::timesource::{SyncReply, SyncRequest};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum WireMessage {
    Request(SyncRequest),
    Reply(SyncReply),
}

impl WireMessage {
    pub fn sequence_number(&self) -> u64 {
        match self {
            WireMessage::Request(request) => request.sequence_number,
            WireMessage::Reply(reply) => reply.echo_sequence_number,
        }
    }
}

pub fn encode(message: &WireMessage) -> NetworkResult<Bytes> {
    Ok(Bytes::from(bincode::serialize(message)?))
}

pub fn decode(frame: &[u8]) -> NetworkResult<WireMessage> {
    Ok(bincode::deserialize(frame)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkError;

    #[test]
    fn test_reply_survives_encoding() {
        let reply = WireMessage::Reply(SyncReply {
            echo_sequence_number: 42,
            server_timestamp: 1_760_000_000.123_456,
            server_send_timestamp: 1_760_000_000.123_457,
        });

        let frame = encode(&reply).unwrap();
        assert_eq!(decode(&frame).unwrap(), reply);
        assert_eq!(reply.sequence_number(), 42);
    }

    #[test]
    fn test_truncated_frame_is_rejected() {
        let frame = encode(&WireMessage::Request(SyncRequest {
            sequence_number: 1,
            send_timestamp: 0.5,
        }))
        .unwrap();

        let result = decode(&frame[..frame.len() - 3]);
        assert!(matches!(result, Err(NetworkError::SerializationError(_))));
    }
}
