use crate::client::bound;
use crate::client::error::{SyncError, SyncResult};
use crate::client::state_machine::RoundStateMachine;
use crate::client::types::{RoundEvent, RoundSchedule, RoundStatus, SyncParams, SyncRoundResult};
use crate::config::{ClientSettings, ConfigError};
use crate::metrics::RunMetrics;
use crate::network::codec::{self, WireMessage};
use crate::network::{Leg, NetworkLink};
use crate::report::CsvRoundLog;
use crate::timesource::{ClockProbe, LogicalClock, SyncReply, SyncRequest};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, sleep_until, Instant};

/// How the wait for a round's reply ended
enum ReplyWait {
    Matched { reply: SyncReply, received: Instant },
    Deadline,
    Cancelled,
}

enum RoundOutcome {
    Finished(SyncRoundResult),
    /// Cancelled mid-wait; the run stops after recording it
    Interrupted(SyncRoundResult),
}

/// Timing of a matched reply
struct RoundSample {
    sequence_number: u64,
    sent_at: f64,
    round_trip: Duration,
    received: Instant,
    stale_replies: u32,
}

/// Drives sequential synchronization rounds against the time source.
///
/// One request is outstanding at a time. Replies are matched strictly by
/// sequence number; anything else arriving in the inbox is discarded.
pub struct SyncClient {
    run_id: String,
    link: Arc<NetworkLink>,
    server_tx: mpsc::UnboundedSender<Bytes>,
    inbox: mpsc::UnboundedReceiver<Bytes>,
    clock: LogicalClock,
    settings: ClientSettings,
    reference: Option<ClockProbe>,
    log: Option<CsvRoundLog>,
    cancel: Option<watch::Receiver<bool>>,
    next_sequence: u64,
    last_sync: Instant,
    results: Vec<SyncRoundResult>,
}

impl SyncClient {
    /// `server_tx` is the time source's inbox, `inbox` receives its replies.
    pub fn new(
        link: Arc<NetworkLink>,
        server_tx: mpsc::UnboundedSender<Bytes>,
        inbox: mpsc::UnboundedReceiver<Bytes>,
        clock: LogicalClock,
        settings: ClientSettings,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            link,
            server_tx,
            inbox,
            clock,
            settings,
            reference: None,
            log: None,
            cancel: None,
            next_sequence: 1,
            last_sync: Instant::now(),
            results: Vec::new(),
        }
    }

    /// Observe the reference clock to report true offsets
    pub fn with_reference(mut self, probe: ClockProbe) -> Self {
        self.reference = Some(probe);
        self
    }

    pub fn with_csv_log(mut self, log: CsvRoundLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Stop the run once `signal` reads `true`
    pub fn with_cancellation(mut self, signal: watch::Receiver<bool>) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn clock(&self) -> &LogicalClock {
        &self.clock
    }

    /// Every result emitted so far, in round order
    pub fn results(&self) -> &[SyncRoundResult] {
        &self.results
    }

    /// Run `num_rounds` sequential rounds and return their results in order.
    ///
    /// Parameters are validated before anything is sent. Timeouts and bound
    /// violations are recorded in the results; only configuration, transport
    /// and log errors end the run early.
    pub async fn run_synchronization(
        &mut self,
        num_rounds: u32,
        d: f64,
        epsilon_max: f64,
        rho: f64,
    ) -> SyncResult<Vec<SyncRoundResult>> {
        let params = SyncParams::new(num_rounds, d, epsilon_max, rho)?;
        self.check_params(&params)?;

        tracing::info!(
            run_id = %self.run_id,
            rounds = num_rounds,
            d,
            epsilon_max,
            rho,
            "Starting synchronization run"
        );

        let first = self.results.len();
        let metrics = RunMetrics::start(self.run_id.clone(), num_rounds);

        for _ in 0..params.rounds {
            if is_cancelled(&self.cancel) {
                return self.abort(first);
            }
            if self.next_sequence > 1 && !self.pause_between_rounds(&params).await {
                return self.abort(first);
            }

            match self.run_round(&params).await? {
                RoundOutcome::Finished(result) => self.emit(result)?,
                RoundOutcome::Interrupted(result) => {
                    self.emit(result)?;
                    return self.abort(first);
                }
            }
        }

        if let Some(log) = self.log.as_mut() {
            log.flush()?;
        }

        let run = self.results[first..].to_vec();
        let evaluated = run.iter().filter(|r| r.is_evaluated()).count();
        let violations = run.iter().filter(|r| r.is_violation()).count();
        metrics.complete(evaluated, run.len() - evaluated);

        tracing::info!(
            run_id = %self.run_id,
            evaluated,
            timed_out = run.len() - evaluated,
            violations,
            "Synchronization run finished"
        );

        Ok(run)
    }

    fn check_params(&self, params: &SyncParams) -> SyncResult<()> {
        self.settings.validate()?;

        let client_drift = self.clock.drift_rate();
        if client_drift.abs() > params.rho {
            return Err(ConfigError::DriftExceedsBound {
                which: "client",
                rate: client_drift,
                rho: params.rho,
            }
            .into());
        }

        match &self.reference {
            Some(probe) if probe.drift_rate().abs() > params.rho => {
                return Err(ConfigError::DriftExceedsBound {
                    which: "server",
                    rate: probe.drift_rate(),
                    rho: params.rho,
                }
                .into());
            }
            None if self.settings.policy.requires_reference() => {
                return Err(ConfigError::MissingReference(self.settings.policy).into());
            }
            _ => {}
        }

        self.link
            .config()
            .validate(params.round_trip_bound)
            .map_err(|e| ConfigError::InvalidLink(e.to_string()))?;

        Ok(())
    }

    /// Run one round. A cancelled wait still yields the round, recorded as
    /// unanswered, so sequence numbers stay gap-free.
    async fn run_round(&mut self, params: &SyncParams) -> SyncResult<RoundOutcome> {
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;
        let mut round = RoundStateMachine::new(sequence_number);

        let sent_instant = Instant::now();
        let sent_at = self.clock.time_at(sent_instant);
        let frame = codec::encode(&WireMessage::Request(SyncRequest {
            sequence_number,
            send_timestamp: sent_at,
        }))?;

        if self.server_tx.is_closed() {
            return Err(SyncError::TransportClosed(
                "time source inbox closed".to_string(),
            ));
        }
        self.link.transmit(frame, Leg::Request, &self.server_tx);

        let deadline = sent_instant + params.round_trip_bound + self.settings.timeout_margin();
        let (wait, stale_replies) = self.await_reply(sequence_number, deadline).await?;

        let outcome = match wait {
            ReplyWait::Cancelled => {
                round.transition(RoundEvent::Cancelled)?;
                tracing::debug!(sequence_number, "Round cancelled while waiting");
                let result = unanswered(sequence_number, sent_at, params, stale_replies);
                RoundOutcome::Interrupted(result)
            }
            ReplyWait::Deadline => {
                round.transition(RoundEvent::DeadlineExpired)?;
                tracing::debug!(sequence_number, "Round timed out");
                let result = unanswered(sequence_number, sent_at, params, stale_replies);
                RoundOutcome::Finished(result)
            }
            ReplyWait::Matched { reply, received } => {
                round.transition(RoundEvent::ReplyMatched)?;
                let sample = RoundSample {
                    sequence_number,
                    sent_at,
                    round_trip: received.saturating_duration_since(sent_instant),
                    received,
                    stale_replies,
                };
                let result = self.evaluate(sample, reply, params);
                round.transition(RoundEvent::Evaluated)?;
                RoundOutcome::Finished(result)
            }
        };

        Ok(outcome)
    }

    async fn await_reply(
        &mut self,
        sequence_number: u64,
        deadline: Instant,
    ) -> SyncResult<(ReplyWait, u32)> {
        let mut stale = 0u32;
        let expiry = sleep_until(deadline);
        tokio::pin!(expiry);

        loop {
            tokio::select! {
                biased;
                _ = cancellation(&mut self.cancel) => return Ok((ReplyWait::Cancelled, stale)),
                frame = self.inbox.recv() => {
                    let Some(frame) = frame else {
                        return Err(SyncError::TransportClosed("reply channel closed".to_string()));
                    };
                    match codec::decode(&frame) {
                        Ok(WireMessage::Reply(reply))
                            if reply.echo_sequence_number == sequence_number =>
                        {
                            let wait = ReplyWait::Matched { reply, received: Instant::now() };
                            return Ok((wait, stale));
                        }
                        Ok(message) => {
                            stale += 1;
                            tracing::debug!(
                                expected = sequence_number,
                                got = message.sequence_number(),
                                "Discarding stale reply"
                            );
                        }
                        Err(e) => {
                            stale += 1;
                            tracing::debug!("Discarding undecodable frame: {}", e);
                        }
                    }
                }
                _ = &mut expiry => return Ok((ReplyWait::Deadline, stale)),
            }
        }
    }

    fn evaluate(
        &mut self,
        sample: RoundSample,
        reply: SyncReply,
        params: &SyncParams,
    ) -> SyncRoundResult {
        let RoundSample {
            sequence_number,
            sent_at,
            round_trip,
            received,
            stale_replies,
        } = sample;

        let t1 = self.clock.time_at(received);
        let since_last_sync = received.saturating_duration_since(self.last_sync);
        let m = bound::measure(
            round_trip,
            t1,
            reply.server_timestamp,
            params.rho,
            since_last_sync,
        );

        let true_offset = self
            .reference
            .as_ref()
            .map(|probe| probe.time_at(received) - t1);
        let measured_error = true_offset.map(|truth| (m.estimated_offset - truth).abs());
        let within_tolerance =
            self.settings
                .policy
                .decide(m.uncertainty_bound, measured_error, params.epsilon_max);

        if self.settings.apply_correction {
            self.clock.rebase(received, t1 + m.estimated_offset);
        }
        self.last_sync = received;

        SyncRoundResult {
            sequence_number,
            sent_at,
            round_trip_time: Some(m.round_trip_time),
            estimated_offset: Some(m.estimated_offset),
            uncertainty_bound: Some(m.uncertainty_bound),
            epsilon_max: params.epsilon_max,
            within_tolerance: Some(within_tolerance),
            status: RoundStatus::Evaluated,
            timestamp: chrono::Utc::now(),
            true_offset,
            measured_error,
            drift_interval: Some(since_last_sync.as_secs_f64()),
            stale_replies,
        }
    }

    fn emit(&mut self, result: SyncRoundResult) -> SyncResult<()> {
        crate::metrics::record_round(&result);

        match (result.round_trip_time, result.uncertainty_bound) {
            (Some(rtt), Some(bound)) => tracing::debug!(
                sequence_number = result.sequence_number,
                rtt,
                bound,
                offset = ?result.estimated_offset,
                within = ?result.within_tolerance,
                "Round evaluated"
            ),
            _ => tracing::debug!(
                sequence_number = result.sequence_number,
                "Round recorded as timed out"
            ),
        }

        if let Some(log) = self.log.as_mut() {
            log.write_round(&result)?;
        }
        self.results.push(result);
        Ok(())
    }

    /// Wait before the next round. Returns `false` if cancelled meanwhile.
    async fn pause_between_rounds(&mut self, params: &SyncParams) -> bool {
        let wait = match self.settings.schedule {
            RoundSchedule::Fixed { interval } => secs(interval),
            RoundSchedule::DriftTriggered {
                fraction,
                max_interval,
            } => {
                let max = secs(max_interval);
                if params.rho == 0.0 {
                    max
                } else {
                    let budget = fraction * params.epsilon_max / params.rho;
                    let target = Duration::try_from_secs_f64(budget).unwrap_or(max);
                    target.saturating_sub(self.last_sync.elapsed()).min(max)
                }
            }
        };

        if wait.is_zero() {
            return true;
        }

        tokio::select! {
            _ = sleep(wait) => true,
            _ = cancellation(&mut self.cancel) => false,
        }
    }

    fn abort(&mut self, first: usize) -> SyncResult<Vec<SyncRoundResult>> {
        if let Some(log) = self.log.as_mut() {
            log.flush()?;
        }
        let completed = self.results.len() - first;
        tracing::info!(run_id = %self.run_id, completed, "Synchronization run cancelled");
        Err(SyncError::Cancelled { completed })
    }
}

/// Result for a round that got no matching reply
fn unanswered(
    sequence_number: u64,
    sent_at: f64,
    params: &SyncParams,
    stale_replies: u32,
) -> SyncRoundResult {
    SyncRoundResult {
        sequence_number,
        sent_at,
        round_trip_time: None,
        estimated_offset: None,
        uncertainty_bound: None,
        epsilon_max: params.epsilon_max,
        within_tolerance: None,
        status: RoundStatus::TimedOut,
        timestamp: chrono::Utc::now(),
        true_offset: None,
        measured_error: None,
        drift_interval: None,
        stale_replies,
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn is_cancelled(signal: &Option<watch::Receiver<bool>>) -> bool {
    signal.as_ref().is_some_and(|rx| *rx.borrow())
}

/// Resolves once the signal reads `true`; never resolves without a signal
async fn cancellation(signal: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = signal else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}
