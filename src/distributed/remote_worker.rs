//! Worker reached over TCP

use super::protocol::{Request, Response};
use super::rpc::RpcClient;
use crate::error::{GolError, Result};
use crate::worker::{AdvanceSectionRequest, Section, SectionClient};
use async_trait::async_trait;
use std::sync::Arc;

/// Broker-side handle on one worker service
#[derive(Debug)]
pub struct RemoteWorker {
    rpc: RpcClient,
}

impl RemoteWorker {
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        Ok(Self {
            rpc: RpcClient::connect(addr).await?,
        })
    }
}

#[async_trait]
impl SectionClient for RemoteWorker {
    fn name(&self) -> &str {
        self.rpc.addr()
    }

    async fn advance_section(&self, request: AdvanceSectionRequest) -> Result<Section> {
        match self.rpc.call(Request::AdvanceSection(request)).await? {
            Response::Section(section) => Ok(section),
            other => Err(unexpected("AdvanceSection", &other)),
        }
    }

    async fn close(&self) -> Result<()> {
        match self.rpc.call(Request::CloseWorker).await? {
            Response::Ack => Ok(()),
            other => Err(unexpected("CloseWorker", &other)),
        }
    }
}

/// Connect to every configured worker; any unreachable address is fatal
pub async fn connect_workers(addresses: &[String]) -> Result<Vec<Arc<dyn SectionClient>>> {
    let mut workers: Vec<Arc<dyn SectionClient>> = Vec::with_capacity(addresses.len());
    for addr in addresses {
        let worker = RemoteWorker::connect(addr.as_str()).await.map_err(|e| {
            tracing::error!(worker = %addr, error = %e, "Failed to connect to worker");
            e
        })?;
        tracing::info!(worker = %addr, "Connected to worker");
        workers.push(Arc::new(worker));
    }
    Ok(workers)
}

pub(crate) fn unexpected(op: &str, response: &Response) -> GolError {
    GolError::Protocol(format!("unexpected {} response to {}", response.name(), op))
}
