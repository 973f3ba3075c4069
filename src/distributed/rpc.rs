//! Request/response transport shared by the broker and worker services
//!
//! [`serve`] runs the accept loop: one task per connection, each answering
//! frames in order through a [`RequestHandler`]. [`RpcClient`] is the calling
//! side. A client connection that is dropped in the middle of a call (the
//! broker abandoning a late worker, for example) is discarded and replaced on
//! the next call so a stale response is never read as the answer to a new
//! request.

use super::protocol::{read_frame, write_frame, Request, RequestFrame, Response};
use crate::error::{GolError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;

/// Server-side dispatch for decoded requests
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Service name for logs
    fn role(&self) -> &'static str;

    async fn handle(&self, request: Request) -> Result<Response>;
}

/// Accept connections until `shutdown` turns true
///
/// Connections still open at shutdown get `grace` to finish their current
/// call before they are aborted.
pub async fn serve(
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    mut shutdown: watch::Receiver<bool>,
    grace: Duration,
) -> Result<()> {
    let role = handler.role();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(role, error = %e, "Failed to accept connection");
                        continue;
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(role, %peer, error = %e, "Failed to set TCP_NODELAY");
                }
                tracing::debug!(role, %peer, "Connection accepted");

                let handler = Arc::clone(&handler);
                connections.spawn(async move {
                    match serve_connection(stream, handler.as_ref()).await {
                        Ok(()) => tracing::debug!(role, %peer, "Connection closed"),
                        Err(e) => tracing::warn!(role, %peer, error = %e, "Connection failed"),
                    }
                });
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
    }

    drop(listener);
    tracing::info!(role, open = connections.len(), grace = ?grace, "Shutting down");

    let drained = tokio::time::timeout(grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::debug!(role, open = connections.len(), "Aborting connections after grace period");
        connections.shutdown().await;
    }
    Ok(())
}

async fn serve_connection(mut stream: TcpStream, handler: &dyn RequestHandler) -> Result<()> {
    while let Some(frame) = read_frame::<_, RequestFrame>(&mut stream).await? {
        let response = match frame.check_version() {
            Err(e) => {
                tracing::warn!(role = handler.role(), error = %e, "Rejecting request");
                Response::error(&e)
            }
            Ok(()) => {
                let op = frame.request.name();
                tracing::trace!(role = handler.role(), op, "Request");
                match handler.handle(frame.request).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::debug!(role = handler.role(), op, error = %e, "Request failed");
                        Response::error(&e)
                    }
                }
            }
        };
        write_frame(&mut stream, &response).await?;
    }
    Ok(())
}

/// One connection to a remote service
#[derive(Debug)]
pub struct RpcClient {
    addr: String,

    /// `None` after a call was interrupted; the next call reconnects
    stream: Mutex<Option<TcpStream>>,
}

impl RpcClient {
    /// Connect eagerly so an unreachable peer fails at start-up
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        let stream = open(&addr).await?;
        Ok(Self {
            addr,
            stream: Mutex::new(Some(stream)),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one request and wait for its response
    ///
    /// `Error` responses come back as [`GolError::Remote`].
    pub async fn call(&self, request: Request) -> Result<Response> {
        let mut guard = self.stream.lock().await;
        let mut stream = match guard.take() {
            Some(stream) => stream,
            None => {
                tracing::debug!(addr = %self.addr, "Reconnecting");
                open(&self.addr).await?
            }
        };

        write_frame(&mut stream, &RequestFrame::new(request)).await?;
        let response: Response = read_frame(&mut stream).await?.ok_or_else(|| {
            GolError::Protocol(format!("{} closed the connection mid-call", self.addr))
        })?;

        *guard = Some(stream);
        response.into_result()
    }
}

async fn open(addr: &str) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}
