//! Clock synchronization harness CLI
//!
//! Runs a configured number of synchronization rounds over a simulated link
//! and writes the per-round CSV log.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use clocksync_harness::config::HarnessConfig;
use clocksync_harness::harness::Harness;
use clocksync_harness::metrics::{start_metrics_server, MetricsConfig};
use clocksync_harness::network::LinkProfile;
use clocksync_harness::TolerancePolicy;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Round-trip clock synchronization harness", long_about = None)]
struct Args {
    /// JSON config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of rounds
    #[arg(short = 'n', long)]
    rounds: Option<u32>,

    /// Round-trip delay bound in seconds
    #[arg(long)]
    d: Option<f64>,

    /// Maximum tolerated uncertainty in seconds
    #[arg(short, long)]
    epsilon: Option<f64>,

    /// Drift rate bound
    #[arg(long)]
    rho: Option<f64>,

    /// CSV output path
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Write a JSON run summary here
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Named link profile
    #[arg(long)]
    profile: Option<String>,

    /// Per-frame loss probability
    #[arg(long)]
    loss: Option<f64>,

    /// Delay jitter in seconds
    #[arg(long)]
    jitter: Option<f64>,

    /// Seed for the link's random draws
    #[arg(long)]
    seed: Option<u64>,

    /// How rounds are judged against epsilon
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    /// Exit non-zero if any round timed out or violated the tolerance
    #[arg(long)]
    strict: bool,

    /// List link profiles and exit
    #[arg(long)]
    list_profiles: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Bound,
    MeasuredError,
    Both,
}

impl From<PolicyArg> for TolerancePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Bound => TolerancePolicy::Bound,
            PolicyArg::MeasuredError => TolerancePolicy::MeasuredError,
            PolicyArg::Both => TolerancePolicy::Both,
        }
    }
}

impl Args {
    fn into_config(self) -> anyhow::Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_json_file(path)?,
            None => HarnessConfig::default(),
        };

        if let Some(rounds) = self.rounds {
            config.rounds = rounds;
        }
        if let Some(d) = self.d {
            config.d = d;
        }
        if let Some(epsilon) = self.epsilon {
            config.epsilon_max = epsilon;
        }
        if let Some(rho) = self.rho {
            config.rho = rho;
        }
        if let Some(out) = self.out {
            config.output = out;
        }
        if self.summary.is_some() {
            config.summary = self.summary;
        }
        if self.profile.is_some() {
            config.link.profile = self.profile;
        }
        if self.loss.is_some() {
            config.link.loss_probability = self.loss;
        }
        if self.jitter.is_some() {
            config.link.jitter = self.jitter;
        }
        if self.seed.is_some() {
            config.link.seed = self.seed;
        }
        if let Some(policy) = self.policy {
            config.client.policy = policy.into();
        }
        if self.metrics_addr.is_some() {
            config.metrics_addr = self.metrics_addr;
        }

        Ok(config)
    }
}

fn print_profiles(d: f64) {
    let d = Duration::try_from_secs_f64(d).unwrap_or(Duration::from_millis(20));
    println!("Link profiles for d = {:?}:\n", d);
    for profile in LinkProfile::all_profiles(d) {
        println!("  {:<10} {}", profile.name, profile.description);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let strict = args.strict;
    let list_profiles = args.list_profiles;
    let config = args.into_config().context("loading configuration")?;

    if list_profiles {
        print_profiles(config.d);
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(addr) = config.metrics_addr {
        start_metrics_server(MetricsConfig::with_addr(addr)).context("starting metrics listener")?;
    }

    let harness = Harness::build(config).context("building harness")?;

    let cancel = harness.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current round");
            cancel.cancel();
        }
    });

    let report = harness.run().await.context("synchronization run failed")?;

    println!("\n{}", report.summary.render_text());

    if strict && (report.summary.violations > 0 || report.summary.timed_out > 0) {
        tracing::error!(
            violations = report.summary.violations,
            timed_out = report.summary.timed_out,
            "Strict mode: run did not pass"
        );
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
