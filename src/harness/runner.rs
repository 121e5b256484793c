use crate::client::{SyncClient, SyncParams, SyncRoundResult};
use crate::config::HarnessConfig;
use crate::harness::error::HarnessResult;
use crate::network::NetworkLink;
use crate::report::{CsvRoundLog, RunSummary};
use crate::timesource::{LogicalClock, TimeSource};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Results of a finished run plus their summary
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub results: Vec<SyncRoundResult>,
    pub summary: RunSummary,
}

/// Requests cancellation of a running harness from another task
#[derive(Debug, Clone)]
pub struct CancelHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.signal.borrow()
    }
}

pub struct Harness {
    config: HarnessConfig,
    params: SyncParams,
    link: Arc<NetworkLink>,
    time_source: Arc<TimeSource>,
    server_task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
    cancel: Arc<watch::Sender<bool>>,
    client: SyncClient,
}

impl Harness {
    /// Validate `config` and start the time source service.
    ///
    /// Must be called inside a tokio runtime. Nothing is created on a
    /// configuration error, including the CSV file.
    pub fn build(config: HarnessConfig) -> HarnessResult<Self> {
        config.validate()?;
        let params = config.params()?;

        let link_config = config.link_config(params.round_trip_bound)?;
        let link = Arc::new(NetworkLink::new(link_config, params.round_trip_bound)?);

        let epoch = config.epoch.unwrap_or_else(wall_clock_seconds);
        let origin = Instant::now();
        let server_clock = LogicalClock::starting_at(
            origin,
            epoch + config.server.initial_offset,
            config.server.drift_rate,
        );
        let client_clock = LogicalClock::starting_at(origin, epoch, config.client_drift_rate());

        let time_source = Arc::new(TimeSource::new(server_clock));
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let server_task = time_source
            .clone()
            .spawn(link.clone(), server_rx, client_tx, shutdown_rx);

        let (cancel, cancel_rx) = watch::channel(false);
        let log = CsvRoundLog::create(&config.output)?;

        let client = SyncClient::new(
            link.clone(),
            server_tx,
            client_rx,
            client_clock,
            config.client.clone(),
        )
        .with_reference(time_source.probe())
        .with_csv_log(log)
        .with_cancellation(cancel_rx);

        tracing::info!(
            run_id = %client.run_id(),
            output = %config.output.display(),
            profile = config.link.profile.as_deref().unwrap_or("fixed"),
            "Harness ready"
        );

        Ok(Self {
            config,
            params,
            link,
            time_source,
            server_task,
            shutdown,
            cancel: Arc::new(cancel),
            client,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn link(&self) -> &Arc<NetworkLink> {
        &self.link
    }

    pub fn time_source(&self) -> &Arc<TimeSource> {
        &self.time_source
    }

    pub fn client(&self) -> &SyncClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut SyncClient {
        &mut self.client
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            signal: self.cancel.clone(),
        }
    }

    /// Run `rounds` more rounds with the configured d, epsilon_max and rho.
    ///
    /// Sequence numbers and drift accounting continue across calls.
    pub async fn run_rounds(&mut self, rounds: u32) -> HarnessResult<Vec<SyncRoundResult>> {
        let results = self
            .client
            .run_synchronization(rounds, self.config.d, self.config.epsilon_max, self.config.rho)
            .await?;
        Ok(results)
    }

    /// Run the configured number of rounds, write the summary and stop the
    /// time source.
    pub async fn run(mut self) -> HarnessResult<RunReport> {
        let outcome = self.run_rounds(self.params.rounds).await;
        let results = match outcome {
            Ok(results) => results,
            Err(e) => {
                self.shutdown().await;
                return Err(e);
            }
        };

        let run_id = self.client.run_id().to_string();
        let summary = RunSummary::from_results(run_id.clone(), &results, self.params.epsilon_max)
            .with_link_stats(self.link.stats().snapshot());

        if let Some(path) = &self.config.summary {
            summary.write_json(path)?;
            tracing::info!(path = %path.display(), "Wrote run summary");
        }

        self.shutdown().await;

        Ok(RunReport {
            run_id,
            results,
            summary,
        })
    }

    /// Stop the time source service and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.server_task.await {
            tracing::warn!("Time source task failed: {}", e);
        }
        tracing::debug!(link = %self.link.stats().summary(), "Harness stopped");
    }
}

fn wall_clock_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigError, LinkSettings};
    use crate::harness::HarnessError;
    use crate::RoundStatus;

    fn config(dir: &tempfile::TempDir) -> HarnessConfig {
        HarnessConfig {
            rounds: 4,
            epoch: Some(0.0),
            output: dir.path().join("rounds.csv"),
            summary: Some(dir.path().join("summary.json")),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::build(config(&dir)).unwrap();
        let source = harness.time_source().clone();

        let report = harness.run().await.unwrap();

        assert_eq!(report.results.len(), 4);
        assert_eq!(report.summary.evaluated, 4);
        assert_eq!(source.requests_served(), 4);
        assert_eq!(report.summary.link.unwrap().frames_sent, 8);

        let csv = std::fs::read_to_string(dir.path().join("rounds.csv")).unwrap();
        assert_eq!(csv.lines().count(), 5);
        assert!(dir.path().join("summary.json").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = HarnessConfig {
            rho: 2.0,
            ..config(&dir)
        };

        let result = Harness::build(cfg);

        assert!(matches!(
            result,
            Err(HarnessError::Config(ConfigError::InvalidDriftBound(_)))
        ));
        assert!(!dir.path().join("rounds.csv").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_rounds_continues_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = Harness::build(config(&dir)).unwrap();

        let first = harness.run_rounds(2).await.unwrap();
        let second = harness.run_rounds(2).await.unwrap();

        assert_eq!(first[1].sequence_number, 2);
        assert_eq!(second[0].sequence_number, 3);
        assert_eq!(harness.client().results().len(), 4);
        harness.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_handle_stops_run() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::build(config(&dir)).unwrap();
        let cancel = harness.cancel_handle();
        cancel.cancel();
        assert!(cancel.is_cancelled());

        let result = harness.run().await;
        assert!(matches!(
            result,
            Err(HarnessError::Sync(crate::SyncError::Cancelled { completed: 0 }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blackout_profile_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = HarnessConfig {
            link: LinkSettings {
                profile: Some("blackout".to_string()),
                ..Default::default()
            },
            ..config(&dir)
        };

        let report = Harness::build(cfg).unwrap().run().await.unwrap();

        assert!(report
            .results
            .iter()
            .all(|r| r.status == RoundStatus::TimedOut));
        assert_eq!(report.summary.pass_rate, 0.0);
    }
}
