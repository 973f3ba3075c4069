//! TOML configuration file parsing

use super::cli::Cli;
use super::cli_convert::parse_duration;
use super::*;
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
    let config: Config = ::toml::from_str(contents).context("Failed to parse TOML configuration")?;

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
    // Listen address applies to whichever service this process runs
    if let Some(ref listen) = cli.listen {
        config.broker.listen_addr = listen.clone();
        config.worker.listen_addr = listen.clone();
    }
    if let Some(ref grace) = cli.shutdown_grace {
        let grace = parse_duration(grace).context("Invalid --shutdown-grace")?;
        config.broker.shutdown_grace = grace;
        config.worker.shutdown_grace = grace;
    }

    // Broker
    if let Some(ref workers) = cli.workers {
        config.broker.worker_addresses = parse_address_list(workers.split(','));
    } else if let Some(ref path) = cli.workers_file {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read workers file: {}", path.display()))?;
        let lines = contents.lines().filter(|line| !line.trim_start().starts_with('#'));
        config.broker.worker_addresses = parse_address_list(lines);
    }
    if let Some(ref timeout) = cli.turn_timeout {
        config.broker.turn_timeout = Some(parse_duration(timeout).context("Invalid --turn-timeout")?);
    }
    if let Some(retries) = cli.worker_retries {
        config.broker.worker_retries = retries;
    }
    if let Some(count) = cli.local_workers {
        config.broker.local_workers = count;
    }

    // Worker
    if let Some(sub_workers) = cli.sub_workers {
        config.worker.sub_workers = sub_workers;
    }

    // Driver
    if let Some(ref broker) = cli.broker {
        config.driver.broker_addr = broker.clone();
    }
    if let Some(ref input) = cli.input {
        config.driver.input = Some(input.clone());
    }
    if cli.width.is_some() {
        config.driver.width = cli.width;
    }
    if cli.height.is_some() {
        config.driver.height = cli.height;
    }
    if let Some(turns) = cli.turns {
        config.driver.turns = turns;
    }
    if let Some(seed) = cli.seed {
        config.driver.seed = seed;
    }
    if let Some(density) = cli.density {
        config.driver.density = density;
    }
    if let Some(ref dir) = cli.output_dir {
        config.driver.output_dir = dir.clone();
    }
    if let Some(ref summary) = cli.summary {
        config.driver.summary = Some(summary.clone());
    }
    if let Some(ref poll) = cli.alive_poll {
        config.driver.alive_poll = parse_duration(poll).context("Invalid --alive-poll")?;
    }
    if cli.close_on_finish {
        config.driver.close_on_finish = true;
    }

    // Runtime
    if let Some(ref level) = cli.log_level {
        config.runtime.log_level = level.clone();
    }

    Ok(config)
}

/// Port assumed for worker addresses given without one
pub const DEFAULT_WORKER_PORT: u16 = 8040;

/// Trim address entries, dropping blanks and adding the default worker port
fn parse_address_list<'a>(entries: impl Iterator<Item = &'a str>) -> Vec<String> {
    entries
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(|addr| {
            if addr.contains(':') {
                addr.to_string()
            } else {
                format!("{}:{}", addr, DEFAULT_WORKER_PORT)
            }
        })
        .collect()
}
