//! Configuration validation

use super::cli::ExecutionMode;
use super::*;
use anyhow::Result;

/// Validate the sections the given mode uses
pub fn validate_config(config: &Config, mode: ExecutionMode) -> Result<()> {
    validate_runtime(&config.runtime)?;

    match mode {
        ExecutionMode::Broker => validate_broker(&config.broker, true),
        ExecutionMode::Worker => validate_worker(&config.worker),
        ExecutionMode::Driver => validate_driver(&config.driver),
        ExecutionMode::Control => validate_control(&config.driver),
        ExecutionMode::Standalone => {
            validate_broker(&config.broker, false)?;
            validate_worker(&config.worker)?;
            validate_driver(&config.driver)
        }
    }
}

/// Validate broker configuration
///
/// `remote` requires at least one worker address; standalone mode uses
/// `local_workers` instead.
pub fn validate_broker(broker: &BrokerConfig, remote: bool) -> Result<()> {
    if remote && broker.worker_addresses.is_empty() {
        anyhow::bail!("broker.worker_addresses must list at least one worker");
    }
    if !remote && broker.local_workers == 0 {
        anyhow::bail!("broker.local_workers must be at least 1");
    }
    if let Some(timeout) = broker.turn_timeout {
        if timeout.is_zero() {
            anyhow::bail!("broker.turn_timeout must be greater than 0 if specified");
        }
    }
    if broker.listen_addr.trim().is_empty() {
        anyhow::bail!("broker.listen_addr must not be empty");
    }

    // Warn on unusually large pools
    if broker.worker_addresses.len() > 1024 || broker.local_workers > 1024 {
        tracing::warn!(
            remote = broker.worker_addresses.len(),
            local = broker.local_workers,
            "Very high worker count, most workers will receive empty sections on small boards"
        );
    }

    Ok(())
}

/// Validate worker configuration
pub fn validate_worker(worker: &WorkerConfig) -> Result<()> {
    if worker.sub_workers == 0 {
        anyhow::bail!("worker.sub_workers must be at least 1");
    }
    if worker.listen_addr.trim().is_empty() {
        anyhow::bail!("worker.listen_addr must not be empty");
    }
    Ok(())
}

/// Validate the driver settings control mode uses
pub fn validate_control(driver: &DriverConfig) -> Result<()> {
    if driver.broker_addr.trim().is_empty() {
        anyhow::bail!("driver.broker_addr must not be empty");
    }
    if driver.output_dir.as_os_str().is_empty() {
        anyhow::bail!("driver.output_dir must not be empty");
    }
    Ok(())
}

/// Validate driver configuration
pub fn validate_driver(driver: &DriverConfig) -> Result<()> {
    if driver.width == Some(0) || driver.height == Some(0) {
        anyhow::bail!("driver.width and driver.height must be at least 1");
    }
    if driver.input.is_none() && !(0.0..=1.0).contains(&driver.density) {
        anyhow::bail!("driver.density must be between 0.0 and 1.0, got {}", driver.density);
    }
    if driver.alive_poll.is_zero() {
        anyhow::bail!("driver.alive_poll must be greater than 0");
    }
    if driver.broker_addr.trim().is_empty() {
        anyhow::bail!("driver.broker_addr must not be empty");
    }
    Ok(())
}

/// Validate runtime configuration
pub fn validate_runtime(runtime: &RuntimeConfig) -> Result<()> {
    const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    if !LEVELS.contains(&runtime.log_level.to_lowercase().as_str()) {
        anyhow::bail!(
            "runtime.log_level must be one of {}, got {}",
            LEVELS.join(", "),
            runtime.log_level
        );
    }
    Ok(())
}
