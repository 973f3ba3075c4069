//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! Every section has defaults, so an empty file (or no file) is a valid
//! configuration for a single-machine run.

pub mod cli;
pub mod cli_convert;
pub mod toml;
pub mod validator;

use crate::coordinator::BrokerSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete process configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Address the broker service binds
    #[serde(default = "default_broker_listen")]
    pub listen_addr: String,
    /// Worker services to connect to at start-up (host:port)
    #[serde(default)]
    pub worker_addresses: Vec<String>,
    /// Deadline for all workers to answer one turn (e.g. "30s"); unset waits forever
    #[serde(default, with = "cli_convert::serde_opt_duration")]
    pub turn_timeout: Option<Duration>,
    /// Extra attempts per partition before a worker failure fails the run
    #[serde(default)]
    pub worker_retries: u32,
    /// Time open connections get to finish after CloseBroker
    #[serde(default = "default_shutdown_grace", with = "cli_convert::serde_duration")]
    pub shutdown_grace: Duration,
    /// In-process workers used by standalone mode
    #[serde(default = "default_local_workers")]
    pub local_workers: usize,
}

fn default_broker_listen() -> String {
    "0.0.0.0:8030".to_string()
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(1)
}

fn default_local_workers() -> usize {
    num_cpus::get().max(1)
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_broker_listen(),
            worker_addresses: Vec::new(),
            turn_timeout: None,
            worker_retries: 0,
            shutdown_grace: default_shutdown_grace(),
            local_workers: default_local_workers(),
        }
    }
}

impl BrokerConfig {
    pub fn settings(&self) -> BrokerSettings {
        BrokerSettings {
            turn_timeout: self.turn_timeout,
            worker_retries: self.worker_retries,
        }
    }
}

/// Worker node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Address the worker service binds
    #[serde(default = "default_worker_listen")]
    pub listen_addr: String,
    /// Row bands each section is split into
    #[serde(default = "default_sub_workers")]
    pub sub_workers: usize,
    /// Time open connections get to finish after CloseWorker
    #[serde(default = "default_shutdown_grace", with = "cli_convert::serde_duration")]
    pub shutdown_grace: Duration,
}

fn default_worker_listen() -> String {
    "0.0.0.0:8040".to_string()
}

fn default_sub_workers() -> usize {
    crate::worker::DEFAULT_SUB_WORKERS
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_worker_listen(),
            sub_workers: default_sub_workers(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

/// Driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Broker service to drive
    #[serde(default = "default_broker_addr")]
    pub broker_addr: String,
    /// Initial board as a binary PGM; a random board is generated when unset
    pub input: Option<PathBuf>,
    /// Board width (must match `input` when both are given)
    pub width: Option<usize>,
    /// Board height (must match `input` when both are given)
    pub height: Option<usize>,
    /// Generations to compute
    #[serde(default = "default_turns")]
    pub turns: u32,
    /// Seed for the random board
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Probability of a cell starting alive in the random board
    #[serde(default = "default_density")]
    pub density: f64,
    /// Directory the final board is written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Optional JSON run summary path
    pub summary: Option<PathBuf>,
    /// Interval between alive-cell reports
    #[serde(default = "default_alive_poll", with = "cli_convert::serde_duration")]
    pub alive_poll: Duration,
    /// Send CloseBroker once the run has finished
    #[serde(default)]
    pub close_on_finish: bool,
}

/// Side length of the generated board when no size is configured
pub const DEFAULT_BOARD_SIZE: usize = 64;

fn default_broker_addr() -> String {
    "127.0.0.1:8030".to_string()
}

fn default_turns() -> u32 {
    100
}

fn default_seed() -> u64 {
    1
}

fn default_density() -> f64 {
    0.25
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_alive_poll() -> Duration {
    Duration::from_secs(2)
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            broker_addr: default_broker_addr(),
            input: None,
            width: None,
            height: None,
            turns: default_turns(),
            seed: default_seed(),
            density: default_density(),
            output_dir: default_output_dir(),
            summary: None,
            alive_poll: default_alive_poll(),
            close_on_finish: false,
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Log level used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}
