//! CLI argument parsing using clap

use crate::distributed::control::ControlAction;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Standalone mode (default) - broker with in-process workers, driven locally
    Standalone,
    /// Broker mode - own the game and fan turns out to worker services
    Broker,
    /// Worker mode - serve row sections to a broker
    Worker,
    /// Driver mode - start a run on a broker and collect the result
    Driver,
    /// Control mode - pause, snapshot or kill the run on a broker
    Control,
}

/// lifegrid - distributed Game of Life
#[derive(Parser, Debug)]
#[command(name = "lifegrid")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: standalone, broker, worker, driver, or control
    #[arg(long, value_enum, default_value = "standalone")]
    pub mode: ExecutionMode,

    /// Action for control mode
    #[arg(long, value_enum, required_if_eq("mode", "control"))]
    pub action: Option<ControlAction>,

    /// TOML configuration file (CLI options override it)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Address to listen on (broker and worker modes)
    #[arg(long)]
    pub listen: Option<String>,

    // === Broker Options ===
    /// Comma-separated worker addresses (e.g., "10.0.1.10:8040,10.0.1.11:8040")
    #[arg(long)]
    pub workers: Option<String>,

    /// File listing worker addresses, one per line ('#' starts a comment)
    #[arg(long)]
    pub workers_file: Option<PathBuf>,

    /// Deadline for one turn across all workers (e.g., 30s, 500ms)
    #[arg(long)]
    pub turn_timeout: Option<String>,

    /// Retries per partition before a worker failure fails the run
    #[arg(long)]
    pub worker_retries: Option<u32>,

    /// In-process workers for standalone mode
    #[arg(long)]
    pub local_workers: Option<usize>,

    /// Grace period for open connections at shutdown (e.g., 1s)
    #[arg(long)]
    pub shutdown_grace: Option<String>,

    // === Worker Options ===
    /// Row bands each worker splits its section into
    #[arg(long)]
    pub sub_workers: Option<usize>,

    // === Driver Options ===
    /// Broker address to drive
    #[arg(long, env = "LIFEGRID_BROKER")]
    pub broker: Option<String>,

    /// Initial board (binary PGM); a random board is generated when omitted
    #[arg(short = 'i', long)]
    pub input: Option<PathBuf>,

    /// Board width
    #[arg(short = 'W', long)]
    pub width: Option<usize>,

    /// Board height
    #[arg(short = 'H', long)]
    pub height: Option<usize>,

    /// Number of turns to compute
    #[arg(short = 't', long)]
    pub turns: Option<u32>,

    /// Seed for the random board
    #[arg(long)]
    pub seed: Option<u64>,

    /// Alive probability for the random board (0.0-1.0)
    #[arg(long)]
    pub density: Option<f64>,

    /// Directory for the final board image
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Write a JSON run summary to this path
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Interval between alive-cell reports (e.g., 2s)
    #[arg(long)]
    pub alive_poll: Option<String>,

    /// Close the broker and its workers when the run finishes
    #[arg(long)]
    pub close_on_finish: bool,

    // === Runtime Options ===
    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,
}
