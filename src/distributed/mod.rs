//! Networked roles
//!
//! # Architecture
//!
//! - **Broker service**: exposes the [`Broker`](crate::coordinator::Broker)
//!   operations and drives remote workers through [`RemoteWorker`]
//! - **Worker service**: computes row sections on request
//! - **Driver**: starts a run, monitors it, writes the final board
//!
//! # Modules
//!
//! - `protocol`: request/response types and framing
//! - `rpc`: accept loop and client connection shared by all roles
//! - `broker_service`, `worker_service`: the two servers
//! - `client`, `remote_worker`: typed clients for each server
//! - `driver`: the driver mode
//! - `control`: pause, snapshot and kill, from the driver or control mode

pub mod broker_service;
pub mod client;
pub mod control;
pub mod driver;
pub mod protocol;
pub mod remote_worker;
pub mod rpc;
pub mod worker_service;

pub use broker_service::BrokerService;
pub use client::BrokerClient;
pub use control::{ControlAction, ControlOutcome};
pub use driver::{Driver, DriverReport, RunSummary};
pub use protocol::{ErrorMessage, Request, RequestFrame, Response, MAX_FRAME_BYTES, PROTOCOL_VERSION};
pub use remote_worker::{connect_workers, RemoteWorker};
pub use worker_service::WorkerService;
