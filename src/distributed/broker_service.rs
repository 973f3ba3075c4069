//! Broker service
//!
//! Exposes a [`Broker`] over TCP. The service stops accepting once the broker
//! reports it has been closed and returns after `shutdown_grace`, which lets
//! the driver's blocked `StartGame` call receive its final answer.

use super::protocol::{Request, Response};
use super::rpc::{serve, RequestHandler};
use crate::coordinator::Broker;
use crate::error::{GolError, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub struct BrokerService {
    listener: TcpListener,
    broker: Arc<Broker>,
    shutdown_grace: Duration,
}

impl BrokerService {
    pub async fn bind(addr: &str, broker: Arc<Broker>, shutdown_grace: Duration) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            broker,
            shutdown_grace,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn broker(&self) -> Arc<Broker> {
        Arc::clone(&self.broker)
    }

    /// Serve until `CloseBroker` completes
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            addr = %self.local_addr()?,
            workers = self.broker.worker_count(),
            "Broker service listening"
        );

        let shutdown = self.broker.closed_signal();
        let handler = Arc::new(BrokerHandler {
            broker: self.broker,
        });
        serve(self.listener, handler, shutdown, self.shutdown_grace).await?;
        tracing::info!("Broker service stopped");
        Ok(())
    }
}

struct BrokerHandler {
    broker: Arc<Broker>,
}

#[async_trait]
impl RequestHandler for BrokerHandler {
    fn role(&self) -> &'static str {
        "broker"
    }

    async fn handle(&self, request: Request) -> Result<Response> {
        let response = match request {
            Request::StartGame(req) => Response::GameFinished(self.broker.start_game(req).await?),
            Request::AliveCellCount => Response::AliveCells(self.broker.alive_cell_count().await?),
            Request::CurrentBoard => Response::Board(self.broker.current_board().await?),
            Request::PauseBroker => Response::Paused(self.broker.pause().await?),
            Request::CloseBroker => {
                self.broker.close().await?;
                Response::Ack
            }
            Request::ControllerClosed => {
                self.broker.controller_closed().await?;
                Response::Ack
            }
            other => {
                return Err(GolError::Protocol(format!(
                    "{} is not served by the broker",
                    other.name()
                )))
            }
        };
        Ok(response)
    }
}
