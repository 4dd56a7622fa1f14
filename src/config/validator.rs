//! Configuration validation

use super::cli::ExecutionMode;
use super::*;
use anyhow::Result;
use log::warn;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_run(&config.run)?;
    validate_control(&config.control)?;
    validate_images(&config.images)?;

    Ok(())
}

/// Validate configuration for a specific execution mode
pub fn validate_for_mode(config: &Config, mode: ExecutionMode) -> Result<()> {
    validate_config(config)?;

    match mode {
        ExecutionMode::Broker => {
            if config.network.worker_addresses.is_empty() {
                anyhow::bail!("broker mode needs at least one worker address (--workers)");
            }
        }
        ExecutionMode::Controller => {
            if config.network.broker_address.trim().is_empty() {
                anyhow::bail!("controller mode needs a broker address (--broker)");
            }
        }
        ExecutionMode::Local | ExecutionMode::Worker => {}
    }

    Ok(())
}

/// Validate run parameters
pub fn validate_run(run: &RunConfig) -> Result<()> {
    if run.threads == 0 {
        anyhow::bail!("run.threads must be at least 1");
    }
    if run.width == 0 || run.height == 0 {
        anyhow::bail!(
            "run.width and run.height must be at least 1 (got {}x{})",
            run.width,
            run.height
        );
    }

    if run.threads > run.height {
        warn!(
            "run.threads ({}) exceeds grid height ({}); using {} partitions",
            run.threads, run.height, run.height
        );
    }

    Ok(())
}

/// Validate control settings
pub fn validate_control(control: &ControlConfig) -> Result<()> {
    if control.status_interval_ms == 0 {
        anyhow::bail!("control.status_interval_ms must be greater than 0");
    }
    if control.channel_capacity == 0 {
        anyhow::bail!("control.channel_capacity must be greater than 0");
    }

    Ok(())
}

/// Validate image settings
pub fn validate_images(images: &ImageConfig) -> Result<()> {
    if !(0.0..=1.0).contains(&images.density) {
        anyhow::bail!(
            "images.density must be between 0.0 and 1.0 (got {})",
            images.density
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
        assert!(validate_for_mode(&Config::default(), ExecutionMode::Local).is_ok());
    }

    #[test]
    fn test_validate_run() {
        let mut config = Config::default();
        config.run.threads = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.run.height = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_status_interval() {
        let mut config = Config::default();
        config.control.status_interval_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_density() {
        let mut config = Config::default();
        config.images.density = -0.1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_broker_needs_workers() {
        let mut config = Config::default();
        assert!(validate_for_mode(&config, ExecutionMode::Broker).is_err());

        config.network.worker_addresses = vec!["127.0.0.1:8040".to_string()];
        assert!(validate_for_mode(&config, ExecutionMode::Broker).is_ok());
    }
}
