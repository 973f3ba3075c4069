//! Broker coordination engine
//!
//! The [`Broker`] is the session object behind every broker operation. It owns
//! the canonical [`Game`], drives the turn loop for the caller of
//! [`Broker::start_game`], and serves control calls (pause, inspection, close,
//! disconnect) concurrently with that loop.
//!
//! # Turn loop
//!
//! ```text
//!            ┌──────── resume ────────┐
//!            ▼                        │
//!   ──▶ RUNNING ──── pause ────▶ PAUSED
//!        │  │  │
//!        │  │  └── turns exhausted ──▶ DONE
//!        │  └───── close ────────────▶ CLOSING ──▶ (workers closed)
//!        └──────── disconnect ───────▶ DISCONNECTED
//! ```
//!
//! Signals are checked at turn boundaries only, in the order disconnect,
//! pause, close. A turn snapshots `current`, fans one `AdvanceSection` call out
//! per worker, waits for all of them, then reassembles and swaps under the
//! session lock.

pub mod game;

use crate::board::{partition, Board, Cell};
use crate::error::{ErrorKind, GolError, Result};
use crate::stats::{TurnRecorder, TurnTimings};
use crate::worker::{AdvanceSectionRequest, Section, SectionClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinSet;

pub use game::Game;

/// Turn loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Running,
    Paused,
    Closing,
    Disconnected,
    Done,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every requested turn was computed
    Completed,
    /// CloseBroker stopped the run and the workers were closed
    Closed,
    /// The driver went away; the last completed board stands
    Disconnected,
}

/// StartGame request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartGameRequest {
    pub board: Board,
    pub width: usize,
    pub height: usize,
    pub turns: u32,
}

impl StartGameRequest {
    pub fn new(board: Board, turns: u32) -> Self {
        Self {
            width: board.width(),
            height: board.height(),
            board,
            turns,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(GolError::validation(format!(
                "board must be at least 1x1, got {}x{}",
                self.width, self.height
            )));
        }
        self.board.ensure_dimensions(self.width, self.height)?;
        self.board.validate()
    }
}

/// StartGame response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameResult {
    pub board: Board,
    pub completed_turns: u32,
    pub alive_cells: Vec<Cell>,
    pub outcome: RunOutcome,
    pub timings: TurnTimings,
}

/// AliveCellCount response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliveCellsReport {
    pub completed_turns: u32,
    pub alive_cells: Vec<Cell>,
}

/// CurrentBoard response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub board: Board,
    pub completed_turns: u32,
}

/// PauseBroker response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseReport {
    /// Turns completed when the toggle was applied
    pub completed_turns: u32,
    /// State after the toggle
    pub paused: bool,
}

/// Broker tuning
#[derive(Debug, Clone, Default)]
pub struct BrokerSettings {
    /// Deadline for all workers to answer one turn; `None` waits forever
    pub turn_timeout: Option<Duration>,

    /// Extra attempts per partition before a worker failure fails the run
    pub worker_retries: u32,
}

#[derive(Debug)]
struct Session {
    game: Option<Game>,
    state: TurnState,
    running: bool,
    close_requested: bool,
    disconnected: bool,
    closed: bool,
}

/// Outcome of closing the worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
enum WorkersClosed {
    Acknowledged,
    Failed { kind: ErrorKind, message: String },
}

/// What the turn loop does next, decided under the session lock
enum Step {
    Wait,
    Close,
    Finish(RunOutcome),
    Advance { turn: u32, board: Arc<Board> },
}

/// Broker session: game state, control signals and the worker pool
pub struct Broker {
    workers: Vec<Arc<dyn SectionClient>>,
    settings: BrokerSettings,
    session: Mutex<Session>,

    /// Wakes the turn loop when a control signal changes
    control: Notify,

    /// Set once the worker pool has been closed, with the outcome
    workers_closed: watch::Sender<Option<WorkersClosed>>,

    /// Flips once CloseBroker completed; the service stops accepting on it
    closed: watch::Sender<bool>,
}

impl Broker {
    pub fn new(workers: Vec<Arc<dyn SectionClient>>, settings: BrokerSettings) -> Result<Self> {
        if workers.is_empty() {
            return Err(GolError::validation("broker needs at least one worker"));
        }

        Ok(Self {
            workers,
            settings,
            session: Mutex::new(Session {
                game: None,
                state: TurnState::Done,
                running: false,
                close_requested: false,
                disconnected: false,
                closed: false,
            }),
            control: Notify::new(),
            workers_closed: watch::channel(None).0,
            closed: watch::channel(false).0,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Receiver that turns `true` once the broker has been closed
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    pub async fn state(&self) -> TurnState {
        self.session.lock().await.state
    }

    /// Run a new game to completion and return the final generation
    ///
    /// Blocks the caller for the whole run. Only one run may be active at a
    /// time; a new run replaces the previous game.
    pub async fn start_game(&self, request: StartGameRequest) -> Result<GameResult> {
        request.validate()?;
        let turns = request.turns;
        let (width, height) = (request.width, request.height);

        {
            let mut session = self.session.lock().await;
            if session.closed || session.close_requested {
                return Err(GolError::BrokerClosed);
            }
            if session.running {
                return Err(GolError::RunInProgress);
            }
            session.game = Some(Game::new(request.board));
            session.state = TurnState::Running;
            session.running = true;
            session.disconnected = false;
        }

        tracing::info!(
            width,
            height,
            turns,
            workers = self.workers.len(),
            "Starting game"
        );

        let mut recorder = TurnRecorder::new();
        let outcome = self.drive(turns, &mut recorder).await;

        // The result is read in the same critical section that ends the run,
        // before a queued StartGame can replace the game
        let (result, close_pending) = {
            let mut session = self.session.lock().await;
            session.running = false;
            if outcome.is_err() && matches!(session.state, TurnState::Running | TurnState::Paused) {
                session.state = TurnState::Done;
            }
            let close_pending = session.close_requested && self.workers_closed.borrow().is_none();
            let result = outcome.and_then(|outcome| {
                let game = session.game.as_ref().ok_or(GolError::NoActiveGame)?;
                Ok(GameResult {
                    board: game.current().clone(),
                    completed_turns: game.completed_turns(),
                    alive_cells: game.current().alive_cells(),
                    outcome,
                    timings: recorder.summary(),
                })
            });
            (result, close_pending)
        };
        if close_pending {
            // The loop stopped before it could honour a pending CloseBroker
            self.finish_worker_close().await.ok();
        }

        let result = result?;
        tracing::info!(
            completed_turns = result.completed_turns,
            outcome = ?result.outcome,
            mean_turn_us = result.timings.mean_us,
            p99_turn_us = result.timings.p99_us,
            "Game finished"
        );
        Ok(result)
    }

    /// Alive cells of the last completed generation
    pub async fn alive_cell_count(&self) -> Result<AliveCellsReport> {
        let session = self.session.lock().await;
        let game = session.game.as_ref().ok_or(GolError::NoActiveGame)?;
        Ok(AliveCellsReport {
            completed_turns: game.completed_turns(),
            alive_cells: game.current().alive_cells(),
        })
    }

    /// Copy of the last completed generation
    pub async fn current_board(&self) -> Result<BoardSnapshot> {
        let session = self.session.lock().await;
        let game = session.game.as_ref().ok_or(GolError::NoActiveGame)?;
        Ok(BoardSnapshot {
            board: game.current().clone(),
            completed_turns: game.completed_turns(),
        })
    }

    /// Toggle between running and paused
    pub async fn pause(&self) -> Result<PauseReport> {
        let report = {
            let mut session = self.session.lock().await;
            let completed_turns = session
                .game
                .as_ref()
                .ok_or(GolError::NoActiveGame)?
                .completed_turns();
            let paused = match session.state {
                TurnState::Running => {
                    session.state = TurnState::Paused;
                    true
                }
                TurnState::Paused => {
                    session.state = TurnState::Running;
                    false
                }
                other => {
                    return Err(GolError::validation(format!(
                        "cannot pause a run that is {:?}",
                        other
                    )))
                }
            };
            PauseReport {
                completed_turns,
                paused,
            }
        };

        self.control.notify_one();
        tracing::info!(
            completed_turns = report.completed_turns,
            paused = report.paused,
            "Pause toggled"
        );
        Ok(report)
    }

    /// Close the cascade below this broker
    ///
    /// With a run active the turn loop performs the close at its next
    /// boundary (after a resume, if paused); otherwise the workers are closed
    /// here. Returns once every worker acknowledged. If any worker failed to
    /// acknowledge, the error is returned, the broker stays open, and a later
    /// call closes the pool again.
    pub async fn close(&self) -> Result<()> {
        let close_here = {
            let mut session = self.session.lock().await;
            let failed_before = matches!(
                *self.workers_closed.borrow(),
                Some(WorkersClosed::Failed { .. })
            );
            if session.close_requested && !failed_before {
                false
            } else {
                if failed_before {
                    self.workers_closed.send_replace(None);
                }
                session.close_requested = true;
                !session.running
            }
        };

        let result = if close_here {
            self.finish_worker_close().await
        } else {
            self.control.notify_one();
            self.wait_workers_closed().await
        };

        if let Err(e) = result {
            tracing::error!(error = %e, "Broker close incomplete");
            return Err(e);
        }

        {
            let mut session = self.session.lock().await;
            session.closed = true;
        }
        self.closed.send_replace(true);
        tracing::info!("Broker closed");
        Ok(())
    }

    /// Wait for whichever task closes the pool and take its outcome
    async fn wait_workers_closed(&self) -> Result<()> {
        let mut workers_closed = self.workers_closed.subscribe();
        let outcome = {
            let published = workers_closed
                .wait_for(Option::is_some)
                .await
                .map_err(|_| GolError::Protocol("worker close signal dropped".to_string()))?;
            (*published).clone()
        };

        match outcome {
            Some(WorkersClosed::Failed { kind, message }) => Err(GolError::Remote { kind, message }),
            _ => Ok(()),
        }
    }

    /// The driver is going away; stop issuing turns
    pub async fn controller_closed(&self) -> Result<()> {
        {
            let mut session = self.session.lock().await;
            if !session.running {
                tracing::debug!("Controller closed with no active run");
                return Ok(());
            }
            session.disconnected = true;
        }
        self.control.notify_one();
        tracing::info!("Controller disconnected");
        Ok(())
    }

    async fn drive(&self, turns: u32, recorder: &mut TurnRecorder) -> Result<RunOutcome> {
        loop {
            match self.next_step(turns).await? {
                Step::Wait => self.control.notified().await,
                Step::Finish(outcome) => return Ok(outcome),
                Step::Close => {
                    self.finish_worker_close().await?;
                    return Ok(RunOutcome::Closed);
                }
                Step::Advance { turn, board } => {
                    let started = Instant::now();
                    let sections = self.advance_turn(turn, board).await?;

                    let mut session = self.session.lock().await;
                    let game = session.game.as_mut().ok_or(GolError::NoActiveGame)?;
                    game.commit(&sections)?;
                    drop(session);

                    recorder.record(started.elapsed());
                    tracing::trace!(turn, "Turn complete");
                }
            }
        }
    }

    async fn next_step(&self, turns: u32) -> Result<Step> {
        let mut session = self.session.lock().await;

        if session.disconnected {
            session.state = TurnState::Disconnected;
            return Ok(Step::Finish(RunOutcome::Disconnected));
        }
        if session.state == TurnState::Paused {
            return Ok(Step::Wait);
        }
        if session.close_requested {
            session.state = TurnState::Closing;
            return Ok(Step::Close);
        }

        let game = session.game.as_ref().ok_or(GolError::NoActiveGame)?;
        if game.completed_turns() >= turns {
            session.state = TurnState::Done;
            return Ok(Step::Finish(RunOutcome::Completed));
        }
        Ok(Step::Advance {
            turn: game.completed_turns() + 1,
            board: game.snapshot(),
        })
    }

    /// Fan one turn out to every worker and collect sections in row order
    async fn advance_turn(&self, turn: u32, board: Arc<Board>) -> Result<Vec<Section>> {
        let width = board.width();
        let ranges = partition(board.full_range(), self.workers.len());
        let mut tasks = JoinSet::new();

        for (index, (worker, range)) in self.workers.iter().zip(&ranges).enumerate() {
            let worker = Arc::clone(worker);
            let request = AdvanceSectionRequest::new(*range, Arc::clone(&board));
            let retries = self.settings.worker_retries;
            tasks.spawn(async move {
                let result = advance_with_retries(worker.as_ref(), request, retries).await;
                (index, worker, result)
            });
        }
        drop(board);

        let barrier = async move {
            let mut sections: Vec<Option<Section>> = vec![None; ranges.len()];
            while let Some(joined) = tasks.join_next().await {
                let (index, worker, result) = joined.map_err(std::io::Error::from)?;
                let section = result.map_err(|e| GolError::WorkerFailed {
                    worker: index,
                    message: format!("{}: {}", worker.name(), e),
                })?;
                section.check_matches(ranges[index], width)?;
                sections[index] = Some(section);
            }
            Ok::<_, GolError>(sections.into_iter().flatten().collect::<Vec<_>>())
        };

        match self.settings.turn_timeout {
            Some(timeout) => tokio::time::timeout(timeout, barrier)
                .await
                .map_err(|_| GolError::WorkerTimeout { turn, timeout })?,
            None => barrier.await,
        }
    }

    /// Close every worker, then publish the outcome
    async fn finish_worker_close(&self) -> Result<()> {
        let result = self.close_workers().await;
        let outcome = match result {
            Ok(()) => WorkersClosed::Acknowledged,
            Err(ref e) => WorkersClosed::Failed {
                kind: e.kind(),
                message: e.to_string(),
            },
        };
        self.workers_closed.send_replace(Some(outcome));
        result
    }

    async fn close_workers(&self) -> Result<()> {
        tracing::info!(workers = self.workers.len(), "Closing workers");

        let mut tasks = JoinSet::new();
        for (index, worker) in self.workers.iter().enumerate() {
            let worker = Arc::clone(worker);
            tasks.spawn(async move {
                let result = worker.close().await;
                (index, worker, result)
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let (index, worker, result) = joined.map_err(std::io::Error::from)?;
            match result {
                Ok(()) => tracing::debug!(worker = index, name = %worker.name(), "Worker closed"),
                Err(e) => {
                    tracing::error!(worker = index, name = %worker.name(), error = %e, "Worker close failed");
                    first_error.get_or_insert(GolError::WorkerFailed {
                        worker: index,
                        message: e.to_string(),
                    });
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn advance_with_retries(
    worker: &dyn SectionClient,
    request: AdvanceSectionRequest,
    retries: u32,
) -> Result<Section> {
    let mut attempt = 0;
    loop {
        match worker.advance_section(request.clone()).await {
            Ok(section) => return Ok(section),
            Err(e) if attempt < retries && is_retryable(&e) => {
                attempt += 1;
                tracing::warn!(
                    worker = %worker.name(),
                    attempt,
                    retries,
                    error = %e,
                    "Worker call failed, retrying"
                );
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_retryable(err: &GolError) -> bool {
    !matches!(err.kind(), ErrorKind::Validation | ErrorKind::WorkerClosing)
}

#[cfg(test)]
mod tests;
