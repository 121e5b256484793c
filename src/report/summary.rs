use crate::client::SyncRoundResult;
use crate::network::LinkStatsSnapshot;
use crate::report::error::ReportResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Aggregate view of one synchronization run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub generated_at: String,
    pub epsilon_max: f64,
    pub rounds: usize,
    pub evaluated: usize,
    pub timed_out: usize,
    pub within_tolerance: usize,
    pub violations: usize,
    /// Share of all rounds that were evaluated and within tolerance, in percent
    pub pass_rate: f64,
    pub mean_round_trip_time: Option<f64>,
    pub max_round_trip_time: Option<f64>,
    pub max_uncertainty_bound: Option<f64>,
    pub max_measured_error: Option<f64>,
    pub stale_replies: u64,
    pub link: Option<LinkStatsSnapshot>,
}

impl RunSummary {
    pub fn from_results(
        run_id: impl Into<String>,
        results: &[SyncRoundResult],
        epsilon_max: f64,
    ) -> Self {
        let rounds = results.len();
        let evaluated = results.iter().filter(|r| r.is_evaluated()).count();
        let within_tolerance = results
            .iter()
            .filter(|r| r.within_tolerance == Some(true))
            .count();
        let violations = results.iter().filter(|r| r.is_violation()).count();

        let pass_rate = if rounds > 0 {
            within_tolerance as f64 / rounds as f64 * 100.0
        } else {
            0.0
        };

        let rtts: Vec<f64> = results.iter().filter_map(|r| r.round_trip_time).collect();
        let mean_round_trip_time = if rtts.is_empty() {
            None
        } else {
            Some(rtts.iter().sum::<f64>() / rtts.len() as f64)
        };

        Self {
            run_id: run_id.into(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            epsilon_max,
            rounds,
            evaluated,
            timed_out: rounds - evaluated,
            within_tolerance,
            violations,
            pass_rate,
            mean_round_trip_time,
            max_round_trip_time: max_of(rtts.iter().copied()),
            max_uncertainty_bound: max_of(results.iter().filter_map(|r| r.uncertainty_bound)),
            max_measured_error: max_of(results.iter().filter_map(|r| r.measured_error)),
            stale_replies: results.iter().map(|r| u64::from(r.stale_replies)).sum(),
            link: None,
        }
    }

    pub fn with_link_stats(mut self, stats: LinkStatsSnapshot) -> Self {
        self.link = Some(stats);
        self
    }

    pub fn to_json(&self) -> ReportResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> ReportResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Short human-readable report for terminals
    pub fn render_text(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("Run {} ({})\n", self.run_id, self.generated_at));
        out.push_str(&format!(
            "  Rounds:     {} ({} evaluated, {} timed out)\n",
            self.rounds, self.evaluated, self.timed_out
        ));
        out.push_str(&format!(
            "  Tolerance:  {} within, {} violations of epsilon_max = {:.6} ({:.1}% pass)\n",
            self.within_tolerance, self.violations, self.epsilon_max, self.pass_rate
        ));
        if let (Some(mean), Some(max)) = (self.mean_round_trip_time, self.max_round_trip_time) {
            out.push_str(&format!("  RTT:        mean {mean:.6}s, max {max:.6}s\n"));
        }
        if let Some(bound) = self.max_uncertainty_bound {
            out.push_str(&format!("  Max bound:  {bound:.6}s\n"));
        }
        if let Some(error) = self.max_measured_error {
            out.push_str(&format!("  Max error:  {error:.6}s\n"));
        }
        if self.stale_replies > 0 {
            out.push_str(&format!("  Stale:      {} replies discarded\n", self.stale_replies));
        }
        if let Some(link) = &self.link {
            out.push_str(&format!(
                "  Link:       {} sent, {} dropped, {} duplicated ({:.1}% loss)\n",
                link.frames_sent,
                link.frames_dropped,
                link.frames_duplicated,
                link.loss_rate * 100.0
            ));
        }

        out
    }
}

fn max_of(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.max(v))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RoundStatus;

    fn round(sequence_number: u64, rtt: Option<f64>, within: Option<bool>) -> SyncRoundResult {
        let status = if rtt.is_some() {
            RoundStatus::Evaluated
        } else {
            RoundStatus::TimedOut
        };
        SyncRoundResult {
            sequence_number,
            sent_at: sequence_number as f64,
            round_trip_time: rtt,
            estimated_offset: rtt.map(|_| 0.001),
            uncertainty_bound: rtt.map(|r| r / 2.0 + 0.001),
            epsilon_max: 0.09,
            within_tolerance: within,
            status,
            timestamp: chrono::Utc::now(),
            true_offset: rtt.map(|_| 0.0),
            measured_error: rtt.map(|_| 0.001),
            drift_interval: rtt.map(|_| 0.1),
            stale_replies: 1,
        }
    }

    #[test]
    fn test_summary_counts() {
        let results = vec![
            round(1, Some(0.02), Some(true)),
            round(2, None, None),
            round(3, Some(0.01), Some(false)),
            round(4, Some(0.03), Some(true)),
        ];

        let summary = RunSummary::from_results("run-1", &results, 0.09);

        assert_eq!(summary.rounds, 4);
        assert_eq!(summary.evaluated, 3);
        assert_eq!(summary.timed_out, 1);
        assert_eq!(summary.within_tolerance, 2);
        assert_eq!(summary.violations, 1);
        assert_eq!(summary.pass_rate, 50.0);
        assert!((summary.mean_round_trip_time.unwrap() - 0.02).abs() < 1e-12);
        assert_eq!(summary.max_round_trip_time, Some(0.03));
        assert_eq!(summary.stale_replies, 4);
        assert!(summary.link.is_none());
    }

    #[test]
    fn test_all_timed_out_has_no_measurements() {
        let results = vec![round(1, None, None), round(2, None, None)];
        let summary = RunSummary::from_results("run-2", &results, 0.09);

        assert_eq!(summary.pass_rate, 0.0);
        assert!(summary.mean_round_trip_time.is_none());
        assert!(summary.max_uncertainty_bound.is_none());
        assert!(!summary.render_text().contains("RTT"));
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");

        let summary = RunSummary::from_results("run-3", &[round(1, Some(0.02), Some(true))], 0.09)
            .with_link_stats(LinkStatsSnapshot {
                frames_sent: 2,
                frames_delivered: 2,
                ..Default::default()
            });
        summary.write_json(&path).unwrap();

        let loaded: RunSummary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, summary);
        assert!(chrono::DateTime::parse_from_rfc3339(&loaded.generated_at).is_ok());
    }
}
