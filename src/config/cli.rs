//! CLI argument parsing using clap

use crate::engine::FailurePolicy;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Local mode (default) - in-process workers
    Local,
    /// Controller mode - run the turn loop against a remote broker
    Controller,
    /// Broker mode - partition turns over remote workers
    Broker,
    /// Worker mode - compute partitions for a broker
    Worker,
}

/// CLI spelling of the failure policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Abort the run when a partition is lost
    FailTurn,
    /// Keep the prior rows of lost partitions
    BestEffort,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::FailTurn => FailurePolicy::FailTurn,
            PolicyArg::BestEffort => FailurePolicy::BestEffort,
        }
    }
}

/// distlife - partitioned Game of Life with local and distributed workers
#[derive(Parser, Debug)]
#[command(name = "distlife")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: local, controller, broker, or worker
    #[arg(long, value_enum, default_value = "local")]
    pub mode: ExecutionMode,

    /// TOML configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    // === Run Options ===
    /// Number of partitions per turn
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Number of turns to compute
    #[arg(long)]
    pub turns: Option<usize>,

    /// Grid width
    #[arg(long)]
    pub width: Option<usize>,

    /// Grid height
    #[arg(long)]
    pub height: Option<usize>,

    /// Alive-count reporting interval (e.g., 500ms, 2s, 1m)
    #[arg(long)]
    pub status_interval: Option<String>,

    // === Network Options ===
    /// Broker address (controller mode)
    #[arg(long, env = "DISTLIFE_BROKER")]
    pub broker: Option<String>,

    /// Comma-separated worker addresses (broker mode), e.g. "10.0.1.10:8040,10.0.1.11"
    #[arg(long)]
    pub workers: Option<String>,

    /// Port the broker listens on
    #[arg(long)]
    pub listen_port: Option<u16>,

    /// Port workers listen on, also appended to worker addresses given without one
    #[arg(long)]
    pub worker_port: Option<u16>,

    /// What to do with a turn that lost partitions
    #[arg(long, value_enum)]
    pub failure_policy: Option<PolicyArg>,

    // === Image Options ===
    /// Directory holding <W>x<H>.pgm input images
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Directory snapshots are written to
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Start from a random board with this seed instead of an input image
    #[arg(long)]
    pub seed: Option<u64>,

    /// Live-cell fraction of a random board (0.0-1.0)
    #[arg(long)]
    pub density: Option<f64>,

    // === Runtime Options ===
    /// Print events as JSON lines on stdout
    #[arg(long)]
    pub events_json: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.threads == Some(0) {
            anyhow::bail!("threads must be at least 1");
        }

        if let Some(density) = self.density {
            if !(0.0..=1.0).contains(&density) {
                anyhow::bail!("density must be between 0.0 and 1.0");
            }
        }

        if self.mode == ExecutionMode::Worker && self.workers.is_some() {
            anyhow::bail!("--workers only applies to broker mode");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broker_mode() {
        let cli = Cli::try_parse_from([
            "distlife",
            "--mode",
            "broker",
            "--workers",
            "10.0.0.1,10.0.0.2:9000",
            "--listen-port",
            "9100",
            "--failure-policy",
            "best-effort",
        ])
        .unwrap();
        assert_eq!(cli.mode, ExecutionMode::Broker);
        assert_eq!(cli.listen_port, Some(9100));
        assert_eq!(cli.failure_policy, Some(PolicyArg::BestEffort));
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_defaults_to_local() {
        let cli = Cli::try_parse_from(["distlife", "-t", "4", "--turns", "10"]).unwrap();
        assert_eq!(cli.mode, ExecutionMode::Local);
        assert_eq!(cli.threads, Some(4));
        assert_eq!(cli.turns, Some(10));
        assert!(!cli.debug);
    }

    #[test]
    fn test_validate_threads() {
        let cli = Cli::try_parse_from(["distlife", "-t", "0"]).unwrap();
        assert!(cli.validate().is_err());

        let cli = Cli::try_parse_from(["distlife", "--density", "1.5"]).unwrap();
        assert!(cli.validate().is_err());
    }
}
