//! Wire protocol
//!
//! Request/response RPC between driver, broker and workers. Every call is one
//! request frame answered by exactly one response frame on the same
//! connection. Bodies are MessagePack (rmp-serde), which keeps serde
//! attributes such as `rename_all` working across the wire.
//!
//! # Call Flow
//!
//! ```text
//! Driver                  Broker                      Worker (x N)
//!   |                       |                              |
//!   |-- StartGame --------->|                              |
//!   |                       |-- AdvanceSection ----------->|
//!   |                       |<----------------- Section ---|
//!   |                       |        ... one per turn ...  |
//!   |-- AliveCellCount ---->|   (separate connection)      |
//!   |<------- AliveCells ---|                              |
//!   |                       |                              |
//!   |<--- GameFinished -----|                              |
//!   |-- CloseBroker ------->|-- CloseWorker -------------->|
//!   |                       |<---------------------- Ack --|
//!   |<------------- Ack ----|                              |
//! ```
//!
//! # Message Framing
//!
//! ```text
//! [4 bytes: body length (little-endian u32)][N bytes: MessagePack body]
//! ```

use crate::coordinator::{AliveCellsReport, BoardSnapshot, GameResult, PauseReport, StartGameRequest};
use crate::error::{ErrorKind, GolError, Result};
use crate::worker::{AdvanceSectionRequest, Section};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Increment on breaking changes. Both ends of a connection must agree.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted frame body (512 MiB)
pub const MAX_FRAME_BYTES: usize = 512 * 1024 * 1024;

/// Operations a peer can invoke
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Run a game to completion (Driver → Broker)
    StartGame(StartGameRequest),

    /// Alive cells of the last completed turn (Driver → Broker)
    AliveCellCount,

    /// Snapshot of the last completed turn (Driver → Broker)
    CurrentBoard,

    /// Toggle pause (Driver → Broker)
    PauseBroker,

    /// Close workers and stop the broker (Driver → Broker)
    CloseBroker,

    /// The driver is going away (Driver → Broker)
    ControllerClosed,

    /// Advance one row section by a generation (Broker → Worker)
    AdvanceSection(AdvanceSectionRequest),

    /// Stop the worker (Broker → Worker)
    CloseWorker,
}

impl Request {
    /// Operation name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Request::StartGame(_) => "StartGame",
            Request::AliveCellCount => "AliveCellCount",
            Request::CurrentBoard => "CurrentBoard",
            Request::PauseBroker => "PauseBroker",
            Request::CloseBroker => "CloseBroker",
            Request::ControllerClosed => "ControllerClosed",
            Request::AdvanceSection(_) => "AdvanceSection",
            Request::CloseWorker => "CloseWorker",
        }
    }
}

/// Versioned request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub protocol_version: u32,
    pub request: Request,
}

impl RequestFrame {
    pub fn new(request: Request) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            request,
        }
    }

    pub fn check_version(&self) -> Result<()> {
        if self.protocol_version != PROTOCOL_VERSION {
            return Err(GolError::VersionMismatch {
                local: PROTOCOL_VERSION,
                remote: self.protocol_version,
            });
        }
        Ok(())
    }
}

/// Reply to a [`Request`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    GameFinished(GameResult),
    AliveCells(AliveCellsReport),
    Board(BoardSnapshot),
    Paused(PauseReport),
    Section(Section),
    Ack,
    Error(ErrorMessage),
}

/// Error reported by the serving side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&GolError> for ErrorMessage {
    fn from(err: &GolError) -> Self {
        let message = match err {
            // Avoid stacking "remote ... error:" prefixes across hops
            GolError::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            kind: err.kind(),
            message,
        }
    }
}

impl From<ErrorMessage> for GolError {
    fn from(msg: ErrorMessage) -> Self {
        GolError::Remote {
            kind: msg.kind,
            message: msg.message,
        }
    }
}

impl Response {
    pub fn error(err: &GolError) -> Self {
        Response::Error(ErrorMessage::from(err))
    }

    /// Turn an `Error` response into `Err`
    pub fn into_result(self) -> Result<Self> {
        match self {
            Response::Error(msg) => Err(msg.into()),
            other => Ok(other),
        }
    }

    /// Variant name for protocol errors
    pub fn name(&self) -> &'static str {
        match self {
            Response::GameFinished(_) => "GameFinished",
            Response::AliveCells(_) => "AliveCells",
            Response::Board(_) => "Board",
            Response::Paused(_) => "Paused",
            Response::Section(_) => "Section",
            Response::Ack => "Ack",
            Response::Error(_) => "Error",
        }
    }
}

/// Serialize a message with its length prefix
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let body = rmp_serde::to_vec(msg)?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(GolError::FrameTooLarge {
            size: body.len(),
            max: MAX_FRAME_BYTES,
        });
    }

    let mut framed = Vec::with_capacity(4 + body.len());
    framed.extend_from_slice(&(body.len() as u32).to_le_bytes());
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Read one frame
///
/// Returns `Ok(None)` when the peer closed the connection cleanly before a new
/// frame started.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(GolError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_BYTES,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(rmp_serde::from_slice(&body)?))
}

/// Write one frame and flush
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let framed = encode_frame(msg)?;
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}
