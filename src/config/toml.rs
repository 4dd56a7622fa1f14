//! TOML configuration file parsing

use super::cli::Cli;
use super::cli_convert::{parse_address_list, parse_duration};
use super::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config =
        ::toml::from_str(contents).context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Load the file named by `--config` (or defaults) and apply CLI overrides
pub fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => parse_toml_file(path)?,
        None => Config::default(),
    };
    merge_cli_with_config(cli, config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    // Run parameters
    if let Some(turns) = cli.turns {
        config.run.turns = turns;
    }
    if let Some(threads) = cli.threads {
        config.run.threads = threads;
    }
    if let Some(width) = cli.width {
        config.run.width = width;
    }
    if let Some(height) = cli.height {
        config.run.height = height;
    }

    // Control
    if let Some(interval) = &cli.status_interval {
        let interval = parse_duration(interval).context("Invalid --status-interval")?;
        config.control.status_interval_ms = interval.as_millis() as u64;
    }

    // Network
    if let Some(broker) = &cli.broker {
        config.network.broker_address = broker.clone();
    }
    if let Some(workers) = &cli.workers {
        config.network.worker_addresses = parse_address_list(workers);
    }
    if let Some(port) = cli.listen_port {
        config.network.listen_port = port;
    }
    if let Some(port) = cli.worker_port {
        config.network.worker_port = port;
    }

    // Images
    if let Some(dir) = &cli.input_dir {
        config.images.input_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.images.output_dir = dir.clone();
    }
    if cli.seed.is_some() {
        config.images.seed = cli.seed;
    }
    if let Some(density) = cli.density {
        config.images.density = density;
    }

    // Runtime flags only ever switch things on
    if let Some(policy) = cli.failure_policy {
        config.runtime.failure_policy = policy.into();
    }
    if cli.debug {
        config.runtime.debug = true;
    }
    if cli.dry_run {
        config.runtime.dry_run = true;
    }
    if cli.events_json {
        config.runtime.events_json = true;
    }

    Ok(config)
}
