//! Typed client for the broker service

use super::protocol::{Request, Response};
use super::remote_worker::unexpected;
use super::rpc::RpcClient;
use crate::board::Board;
use crate::coordinator::{AliveCellsReport, BoardSnapshot, GameResult, PauseReport, StartGameRequest};
use crate::error::Result;

/// One connection to a broker
///
/// Calls on one client are answered in order, so a driver that wants to poll
/// while `start_game` is blocked opens a second client.
#[derive(Debug)]
pub struct BrokerClient {
    rpc: RpcClient,
}

impl BrokerClient {
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        Ok(Self {
            rpc: RpcClient::connect(addr).await?,
        })
    }

    pub fn addr(&self) -> &str {
        self.rpc.addr()
    }

    /// Run `turns` generations of `board`; returns when the run ends
    pub async fn start_game(&self, board: Board, turns: u32) -> Result<GameResult> {
        let request = StartGameRequest::new(board, turns);
        match self.rpc.call(Request::StartGame(request)).await? {
            Response::GameFinished(result) => Ok(result),
            other => Err(unexpected("StartGame", &other)),
        }
    }

    pub async fn alive_cell_count(&self) -> Result<AliveCellsReport> {
        match self.rpc.call(Request::AliveCellCount).await? {
            Response::AliveCells(report) => Ok(report),
            other => Err(unexpected("AliveCellCount", &other)),
        }
    }

    pub async fn current_board(&self) -> Result<BoardSnapshot> {
        match self.rpc.call(Request::CurrentBoard).await? {
            Response::Board(snapshot) => Ok(snapshot),
            other => Err(unexpected("CurrentBoard", &other)),
        }
    }

    pub async fn pause(&self) -> Result<PauseReport> {
        match self.rpc.call(Request::PauseBroker).await? {
            Response::Paused(report) => Ok(report),
            other => Err(unexpected("PauseBroker", &other)),
        }
    }

    pub async fn close_broker(&self) -> Result<()> {
        self.ack(Request::CloseBroker).await
    }

    pub async fn controller_closed(&self) -> Result<()> {
        self.ack(Request::ControllerClosed).await
    }

    async fn ack(&self, request: Request) -> Result<()> {
        let op = request.name();
        match self.rpc.call(request).await? {
            Response::Ack => Ok(()),
            other => Err(unexpected(op, &other)),
        }
    }
}
