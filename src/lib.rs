//! lifegrid - distributed Game of Life
//!
//! A broker owns the authoritative board and runs the turn loop; each turn it
//! partitions the rows across a pool of workers, waits for every section, and
//! reassembles the next generation. Workers split their section again into
//! row bands computed in parallel. A driver starts runs, polls progress and
//! writes the final board.
//!
//! # Architecture
//!
//! - **board**: board model, row partitioning, PGM IO, random seeding
//! - **worker**: the cell rule and the section engine
//! - **coordinator**: the broker session and turn loop
//! - **distributed**: wire protocol, services and clients
//! - **config**: CLI, TOML and validation
//! - **stats**: turn latency histogram

pub mod board;
pub mod config;
pub mod coordinator;
pub mod distributed;
pub mod error;
pub mod stats;
pub mod worker;

// Re-export commonly used types
pub use board::{Board, Cell, RowRange};
pub use config::Config;
pub use coordinator::{Broker, BrokerSettings, GameResult, RunOutcome};
pub use error::{GolError, Result};
