//! Worker service
//!
//! Runs on each worker node. Serves `AdvanceSection` from the broker and stops
//! once `CloseWorker` arrives:
//! - the close flag is raised so in-flight sections stop dispatching bands
//! - the listener stops accepting
//! - open connections get `shutdown_grace` before the service returns

use super::protocol::{Request, Response};
use super::rpc::{serve, RequestHandler};
use crate::error::{GolError, Result};
use crate::worker::{LocalWorker, SectionClient, SectionEngine};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Worker node service
pub struct WorkerService {
    listener: TcpListener,
    worker: LocalWorker,
    shutdown_grace: Duration,
}

impl WorkerService {
    pub async fn bind(addr: &str, sub_workers: usize, shutdown_grace: Duration) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let node_id = node_id();
        let worker = LocalWorker::new(node_id, SectionEngine::new(sub_workers));
        Ok(Self {
            listener,
            worker,
            shutdown_grace,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the broker sends `CloseWorker`
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tracing::info!(
            addr = %self.local_addr()?,
            node = %self.worker.name(),
            "Worker service listening"
        );

        let handler = Arc::new(WorkerHandler {
            worker: self.worker,
            shutdown: shutdown_tx,
        });
        serve(self.listener, handler, shutdown_rx, self.shutdown_grace).await?;
        tracing::info!("Worker service stopped");
        Ok(())
    }
}

struct WorkerHandler {
    worker: LocalWorker,
    shutdown: watch::Sender<bool>,
}

#[async_trait]
impl RequestHandler for WorkerHandler {
    fn role(&self) -> &'static str {
        "worker"
    }

    async fn handle(&self, request: Request) -> Result<Response> {
        match request {
            Request::AdvanceSection(req) => {
                let range = req.range();
                let section = self.worker.advance_section(req).await?;
                tracing::trace!(range = %range, "Section advanced");
                Ok(Response::Section(section))
            }
            Request::CloseWorker => {
                self.worker.close().await?;
                self.shutdown.send_replace(true);
                tracing::info!("CloseWorker received");
                Ok(Response::Ack)
            }
            other => Err(GolError::Protocol(format!(
                "{} is not served by a worker",
                other.name()
            ))),
        }
    }
}

/// Hostname, or "unknown" when it cannot be read
fn node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
