//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! Every section has defaults, so an empty TOML file (or none at all) yields a
//! runnable local configuration. CLI flags override file values.

pub mod cli;
pub mod cli_convert;
pub mod toml;
pub mod validator;

use crate::distributed::protocol::Params;
use crate::engine::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete run configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Simulation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of turns to compute
    #[serde(default = "default_turns")]
    pub turns: usize,
    /// Partitions per turn (local workers, or remote workers used by the broker)
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Grid width in cells
    #[serde(default = "default_dimension")]
    pub width: usize,
    /// Grid height in cells
    #[serde(default = "default_dimension")]
    pub height: usize,
}

fn default_turns() -> usize {
    100
}

fn default_threads() -> usize {
    num_cpus::get()
}

fn default_dimension() -> usize {
    512
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            turns: default_turns(),
            threads: default_threads(),
            width: default_dimension(),
            height: default_dimension(),
        }
    }
}

/// Turn loop control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Alive-count reporting interval (milliseconds)
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    /// Capacity of the local worker channels
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_status_interval_ms() -> u64 {
    2000
}

fn default_channel_capacity() -> usize {
    4
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: default_status_interval_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Distributed mode addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Broker address the controller connects to
    #[serde(default = "default_broker_address")]
    pub broker_address: String,
    /// Port the broker listens on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Worker addresses the broker connects to
    #[serde(default)]
    pub worker_addresses: Vec<String>,
    /// Port workers listen on, also appended to worker addresses given without one
    #[serde(default = "default_worker_port")]
    pub worker_port: u16,
}

fn default_broker_address() -> String {
    "127.0.0.1:8030".to_string()
}

fn default_listen_port() -> u16 {
    8030
}

fn default_worker_port() -> u16 {
    8040
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            broker_address: default_broker_address(),
            listen_port: default_listen_port(),
            worker_addresses: Vec::new(),
            worker_port: default_worker_port(),
        }
    }
}

/// Image input and output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Directory holding `<W>x<H>.pgm` input images
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    /// Directory snapshots are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Generate a random initial board with this seed instead of reading one
    #[serde(default)]
    pub seed: Option<u64>,
    /// Fraction of live cells in a generated board
    #[serde(default = "default_density")]
    pub density: f64,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_density() -> f64 {
    0.25
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            seed: None,
            density: default_density(),
        }
    }
}

/// Runtime behavior
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// What the broker does with a turn that lost partitions
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Debug logging
    #[serde(default)]
    pub debug: bool,
    /// Validate and print the configuration, then exit
    #[serde(default)]
    pub dry_run: bool,
    /// Print events as JSON lines on stdout
    #[serde(default)]
    pub events_json: bool,
}

impl Config {
    pub fn params(&self) -> Params {
        Params {
            turns: self.run.turns,
            threads: self.run.threads,
            image_width: self.run.width,
            image_height: self.run.height,
        }
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.control.status_interval_ms)
    }

    /// Worker addresses with the default worker port filled in
    pub fn worker_addresses(&self) -> Vec<String> {
        self.network
            .worker_addresses
            .iter()
            .map(|addr| cli_convert::with_default_port(addr, self.network.worker_port))
            .collect()
    }

    pub fn listen_address(&self) -> String {
        format!("0.0.0.0:{}", self.network.listen_port)
    }

    pub fn worker_listen_address(&self) -> String {
        format!("0.0.0.0:{}", self.network.worker_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.run.turns, 100);
        assert_eq!(config.run.width, 512);
        assert!(config.run.threads >= 1);
        assert_eq!(config.status_interval(), Duration::from_secs(2));
        assert_eq!(config.runtime.failure_policy, FailurePolicy::FailTurn);
        assert_eq!(config.listen_address(), "0.0.0.0:8030");
        assert_eq!(config.worker_listen_address(), "0.0.0.0:8040");
    }

    #[test]
    fn test_worker_addresses_get_port() {
        let mut config = Config::default();
        config.network.worker_addresses = vec!["10.0.0.1".to_string(), "10.0.0.2:9000".to_string()];
        assert_eq!(
            config.worker_addresses(),
            vec!["10.0.0.1:8040".to_string(), "10.0.0.2:9000".to_string()]
        );
    }

    #[test]
    fn test_params() {
        let mut config = Config::default();
        config.run.width = 64;
        config.run.height = 32;
        config.run.threads = 3;
        let params = config.params();
        assert_eq!((params.image_width, params.image_height, params.threads), (64, 32, 3));
    }
}
