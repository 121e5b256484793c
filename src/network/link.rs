//! Simulated impairing link between client and time source
//!
//! Every frame gets a fresh loss and delay draw. Delivered frames are handed
//! to the destination channel by a spawned task after their delay, so frames
//! with different delays overtake each other.

use crate::network::error::NetworkResult;
use crate::network::types::{DeliveryOutcome, ImpairmentDecision, Leg, LinkConfig, LinkStats};
use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

pub struct NetworkLink {
    config: LinkConfig,
    rng: Mutex<StdRng>,
    forced_drops: AtomicU32,
    stats: Arc<LinkStats>,
}

impl NetworkLink {
    /// Create a link, validating `config` against the round-trip bound
    pub fn new(config: LinkConfig, round_trip_bound: Duration) -> NetworkResult<Self> {
        config.validate(round_trip_bound)?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            rng: Mutex::new(rng),
            forced_drops: AtomicU32::new(0),
            stats: Arc::new(LinkStats::new()),
        })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        self.stats.clone()
    }

    /// Drop the next `frames` frames regardless of the loss probability
    pub fn force_drop(&self, frames: u32) {
        self.forced_drops.fetch_add(frames, Ordering::SeqCst);
    }

    /// Draw the impairment for one frame
    pub fn decide(&self) -> ImpairmentDecision {
        let forced = self
            .forced_drops
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced {
            return ImpairmentDecision::dropped();
        }

        let mut rng = self.rng.lock();
        if rng.gen_bool(self.config.loss_probability) {
            return ImpairmentDecision::dropped();
        }
        ImpairmentDecision::deliver_after(self.draw_delay(&mut rng))
    }

    /// Delay in `[0, max_one_way_delay]`, jittered around `base_delay`.
    ///
    /// Rounded down to whole milliseconds: tokio timers round up to the
    /// next millisecond, so a finer delay would arrive past the bound.
    fn draw_delay(&self, rng: &mut StdRng) -> Duration {
        let max = self.config.max_one_way_delay;
        if self.config.jitter.is_zero() {
            return whole_millis(self.config.base_delay.min(max));
        }

        let jitter = self.config.jitter.as_secs_f64();
        let perturbation = rng.gen_range(-jitter..=jitter);
        let secs = (self.config.base_delay.as_secs_f64() + perturbation)
            .clamp(0.0, max.as_secs_f64());
        whole_millis(Duration::from_secs_f64(secs).min(max))
    }

    /// Push a frame through the link towards `destination`.
    ///
    /// Returns immediately; a lost frame simply never arrives.
    pub fn transmit(
        &self,
        frame: Bytes,
        leg: Leg,
        destination: &mpsc::UnboundedSender<Bytes>,
    ) -> DeliveryOutcome {
        self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);

        let decision = self.decide();
        if !decision.delivered {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_frame_dropped(leg);
            tracing::debug!(%leg, "frame dropped");
            return DeliveryOutcome::Dropped;
        }

        let first = decision.applied_delay;
        let duplicate = self.config.duplicate_probability > 0.0
            && self.rng.lock().gen_bool(self.config.duplicate_probability);

        if duplicate {
            // The copy gets its own delay draw; it is never lost
            let second = self.draw_delay(&mut self.rng.lock());
            self.stats.frames_duplicated.fetch_add(1, Ordering::Relaxed);
            self.schedule(frame.clone(), first, leg, destination.clone());
            self.schedule(frame, second, leg, destination.clone());
            tracing::debug!(%leg, ?first, ?second, "frame duplicated");
            return DeliveryOutcome::Duplicated { first, second };
        }

        self.schedule(frame, first, leg, destination.clone());
        DeliveryOutcome::Scheduled { delay: first }
    }

    fn schedule(
        &self,
        frame: Bytes,
        delay: Duration,
        leg: Leg,
        destination: mpsc::UnboundedSender<Bytes>,
    ) {
        let stats = self.stats.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            // A closed destination means the receiver is gone; the frame is lost
            if destination.send(frame).is_ok() {
                stats.frames_delivered.fetch_add(1, Ordering::Relaxed);
                stats
                    .total_delay_us
                    .fetch_add(delay.as_micros() as u64, Ordering::Relaxed);
                crate::metrics::record_frame_delivered(leg, delay);
            }
        });
    }
}

fn whole_millis(delay: Duration) -> Duration {
    Duration::from_millis(delay.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    const D: Duration = Duration::from_millis(20);

    fn link(config: LinkConfig) -> NetworkLink {
        NetworkLink::new(config, D).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_perfect_link_delivers_after_fixed_delay() {
        let link = link(LinkConfig::for_round_trip_bound(D));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();

        let outcome = link.transmit(Bytes::from_static(b"ping"), Leg::Request, &tx);
        assert_eq!(
            outcome,
            DeliveryOutcome::Scheduled {
                delay: Duration::from_millis(10)
            }
        );

        let frame = rx.recv().await.unwrap();
        assert_eq!(&frame[..], b"ping");
        assert_eq!(start.elapsed(), Duration::from_millis(10));

        let stats = link.stats();
        assert_eq!(stats.frames_sent.load(Ordering::Relaxed), 1);
        assert_eq!(stats.frames_delivered.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_millisecond_half_bound_rounds_down() {
        let d = Duration::from_millis(5);
        let link = NetworkLink::new(LinkConfig::for_round_trip_bound(d), d).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();

        let outcome = link.transmit(Bytes::from_static(b"ping"), Leg::Request, &tx);
        assert_eq!(
            outcome,
            DeliveryOutcome::Scheduled {
                delay: Duration::from_millis(2)
            }
        );

        rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(2));
        assert!(start.elapsed() <= d / 2);
    }

    #[tokio::test]
    async fn test_total_loss_link() {
        let link = link(LinkConfig::for_round_trip_bound(D).with_loss(1.0));
        let (tx, _rx) = mpsc::unbounded_channel();

        for _ in 0..10 {
            let outcome = link.transmit(Bytes::from_static(b"x"), Leg::Reply, &tx);
            assert!(outcome.is_dropped());
        }

        let stats = link.stats();
        assert_eq!(stats.frames_dropped.load(Ordering::Relaxed), 10);
        assert!((stats.actual_loss_rate() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_loss() {
        let link = link(LinkConfig::for_round_trip_bound(D).with_loss(0.5).with_seed(7));

        let total = 1000;
        let delivered = (0..total).filter(|_| link.decide().delivered).count();

        let success_rate = delivered as f64 / total as f64;
        assert!(success_rate > 0.4 && success_rate < 0.6);
    }

    #[test]
    fn test_jittered_delay_stays_within_bound() {
        let config = LinkConfig {
            jitter: Duration::from_millis(10),
            base_delay: Duration::from_millis(6),
            ..LinkConfig::for_round_trip_bound(D)
        }
        .with_seed(42);
        let link = link(config);

        for _ in 0..1000 {
            let decision = link.decide();
            assert!(decision.delivered);
            assert!(decision.applied_delay <= Duration::from_millis(10));
            assert_eq!(decision.applied_delay.subsec_nanos() % 1_000_000, 0);
        }
    }

    #[test]
    fn test_seeded_links_are_reproducible() {
        let config = LinkConfig::for_round_trip_bound(D)
            .with_jitter(Duration::from_millis(5))
            .with_loss(0.3)
            .with_seed(1234);
        let a = link(config.clone());
        let b = link(config);

        for _ in 0..200 {
            assert_eq!(a.decide(), b.decide());
        }
    }

    #[test]
    fn test_forced_drops_are_consumed_in_order() {
        let link = link(LinkConfig::for_round_trip_bound(D));
        link.force_drop(2);

        assert!(!link.decide().delivered);
        assert!(!link.decide().delivered);
        assert!(link.decide().delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_delays_reorder_frames() {
        let link = link(
            LinkConfig {
                base_delay: Duration::from_millis(5),
                jitter: Duration::from_millis(5),
                ..LinkConfig::for_round_trip_bound(D)
            }
            .with_seed(99),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut delays = Vec::new();
        for i in 0u8..32 {
            match link.transmit(Bytes::from(vec![i]), Leg::Reply, &tx) {
                DeliveryOutcome::Scheduled { delay } => delays.push((delay, i)),
                other => panic!("Unexpected outcome {other:?}"),
            }
        }
        drop(tx);

        let mut arrivals = Vec::new();
        while let Some(frame) = rx.recv().await {
            arrivals.push(frame[0]);
        }

        assert_eq!(arrivals.len(), 32);
        // Arrival order follows delay, not send order; frames sharing a
        // millisecond may arrive in either order
        let sent_order: Vec<u8> = (0..32).collect();
        assert_ne!(arrivals, sent_order);
        assert!(delays.iter().any(|(a, i)| delays.iter().any(|(b, j)| i != j && a == b)));
        for pair in arrivals.windows(2) {
            let a = delays.iter().find(|(_, i)| *i == pair[0]).unwrap().0;
            let b = delays.iter().find(|(_, i)| *i == pair[1]).unwrap().0;
            assert!(a <= b, "{a:?} arrived before {b:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_arrive_twice() {
        let config = LinkConfig {
            duplicate_probability: 1.0,
            ..LinkConfig::for_round_trip_bound(D)
        };
        let link = link(config);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = link.transmit(Bytes::from_static(b"dup"), Leg::Reply, &tx);
        assert!(matches!(outcome, DeliveryOutcome::Duplicated { .. }));
        drop(tx);

        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
        assert_eq!(link.stats().frames_duplicated.load(Ordering::Relaxed), 1);
    }
}
