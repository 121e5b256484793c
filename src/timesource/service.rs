use crate::network::codec::{self, WireMessage};
use crate::network::{Leg, NetworkLink};
use crate::timesource::clock::{ClockProbe, LogicalClock};
use crate::timesource::types::{SyncReply, SyncRequest};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Authoritative time source.
///
/// Only ever reads its clock, so any number of concurrent requests can be
/// answered through a shared reference.
pub struct TimeSource {
    clock: Arc<LogicalClock>,
    requests_served: AtomicU64,
}

impl TimeSource {
    pub fn new(clock: LogicalClock) -> Self {
        Self {
            clock: Arc::new(clock),
            requests_served: AtomicU64::new(0),
        }
    }

    /// Stamp a request on receipt and again right before replying
    pub fn handle_request(&self, request: &SyncRequest) -> SyncReply {
        let server_timestamp = self.clock.current_time();
        self.requests_served.fetch_add(1, Ordering::Relaxed);
        let server_send_timestamp = self.clock.current_time();

        SyncReply {
            echo_sequence_number: request.sequence_number,
            server_timestamp,
            server_send_timestamp,
        }
    }

    /// Read-only access to the reference clock
    pub fn probe(&self) -> ClockProbe {
        ClockProbe::new(self.clock.clone())
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served.load(Ordering::Relaxed)
    }

    /// Run as a service: decode request frames from `inbox`, answer them and
    /// send replies back through the link's reply leg to `reply_to`.
    ///
    /// Stops when the inbox closes or `shutdown` flips to `true`.
    pub fn spawn(
        self: Arc<Self>,
        link: Arc<NetworkLink>,
        mut inbox: mpsc::UnboundedReceiver<Bytes>,
        reply_to: mpsc::UnboundedSender<Bytes>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = inbox.recv() => {
                        let Some(frame) = frame else {
                            break;
                        };
                        self.serve_frame(&frame, &link, &reply_to);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(served = self.requests_served(), "time source stopped");
        })
    }

    fn serve_frame(
        &self,
        frame: &[u8],
        link: &NetworkLink,
        reply_to: &mpsc::UnboundedSender<Bytes>,
    ) {
        let request = match codec::decode(frame) {
            Ok(WireMessage::Request(request)) => request,
            Ok(WireMessage::Reply(reply)) => {
                tracing::warn!(
                    "Time source ignoring reply frame for sequence {}",
                    reply.echo_sequence_number
                );
                return;
            }
            Err(e) => {
                tracing::warn!("Time source dropping malformed frame: {}", e);
                return;
            }
        };

        let reply = self.handle_request(&request);
        match codec::encode(&WireMessage::Reply(reply)) {
            Ok(bytes) => {
                link.transmit(bytes, Leg::Reply, reply_to);
            }
            Err(e) => tracing::warn!("Failed to encode reply {}: {}", request.sequence_number, e),
        }
    }
}
