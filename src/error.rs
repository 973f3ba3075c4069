//! Error types shared by the broker, the workers and the wire protocol
//!
//! Every failure that can cross a process boundary has an [`ErrorKind`] so the
//! receiving side can rebuild a typed error from an `Error` response.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum GolError {
    /// Request or board failed validation (dimension mismatch, bad range, ...)
    #[error("validation error: {0}")]
    Validation(String),

    /// Socket or file IO failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// MessagePack encoding failure
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding failure
    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Peer sent something the protocol does not allow at this point
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Frame length prefix exceeds the allowed maximum
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Peer speaks a different protocol version
    #[error("protocol version mismatch: local={local}, remote={remote}")]
    VersionMismatch { local: u32, remote: u32 },

    /// Not every worker answered before the turn deadline
    #[error("turn {turn}: workers did not finish within {timeout:?}")]
    WorkerTimeout { turn: u32, timeout: Duration },

    /// A worker call failed after all retries
    #[error("worker {worker} failed: {message}")]
    WorkerFailed { worker: usize, message: String },

    /// The worker has been told to close and refused further work
    #[error("worker is closing")]
    WorkerClosing,

    /// Control call arrived before any game was started
    #[error("no game has been started")]
    NoActiveGame,

    /// StartGame arrived while another run is still being driven
    #[error("a game is already running")]
    RunInProgress,

    /// The broker has been closed and accepts no new runs
    #[error("broker is closed")]
    BrokerClosed,

    /// Error reported by the remote side of a call
    #[error("remote {kind:?} error: {message}")]
    Remote { kind: ErrorKind, message: String },
}

/// Error classification carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Transport,
    Protocol,
    WorkerTimeout,
    WorkerFailed,
    WorkerClosing,
    NoActiveGame,
    RunInProgress,
    BrokerClosed,
}

impl GolError {
    /// Wire classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GolError::Validation(_) => ErrorKind::Validation,
            GolError::Io(_) => ErrorKind::Transport,
            GolError::Encode(_)
            | GolError::Decode(_)
            | GolError::Protocol(_)
            | GolError::FrameTooLarge { .. }
            | GolError::VersionMismatch { .. } => ErrorKind::Protocol,
            GolError::WorkerTimeout { .. } => ErrorKind::WorkerTimeout,
            GolError::WorkerFailed { .. } => ErrorKind::WorkerFailed,
            GolError::WorkerClosing => ErrorKind::WorkerClosing,
            GolError::NoActiveGame => ErrorKind::NoActiveGame,
            GolError::RunInProgress => ErrorKind::RunInProgress,
            GolError::BrokerClosed => ErrorKind::BrokerClosed,
            GolError::Remote { kind, .. } => *kind,
        }
    }

    /// Shorthand for a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        GolError::Validation(message.into())
    }
}

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, GolError>;
