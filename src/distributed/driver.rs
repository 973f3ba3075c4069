//! Driver
//!
//! The driver owns the initial board and the final image. It:
//! - loads a PGM board or generates a seeded random one
//! - calls StartGame on one connection and waits for the run to end
//! - reports the alive-cell count every `alive_poll` from a second connection,
//!   except while it has paused the run
//! - turns Ctrl+C into ControllerClosed; a second Ctrl+C abandons the run
//! - applies control signals (SIGUSR1 pause, SIGUSR2 snapshot, SIGQUIT kill)
//! - writes the final board to `<output_dir>/<w>x<h>x<turns>.pgm`
//! - optionally writes a JSON summary and cascades CloseBroker
//!
//! It never advances turns itself.

use super::client::BrokerClient;
use super::control::{self, ControlAction, ControlOutcome};
use crate::board::pgm::{read_pgm, write_pgm};
use crate::board::seed::random_board;
use crate::board::Board;
use crate::config::{DriverConfig, DEFAULT_BOARD_SIZE};
use crate::coordinator::{GameResult, RunOutcome};
use crate::stats::TurnTimings;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, watch};

/// JSON run summary
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub broker: String,
    pub width: usize,
    pub height: usize,
    pub requested_turns: u32,
    pub completed_turns: u32,
    pub alive_cells: usize,
    pub outcome: RunOutcome,
    pub elapsed_secs: f64,
    pub output: PathBuf,
    pub timings: TurnTimings,
}

/// What a driver run produced
#[derive(Debug)]
pub struct DriverReport {
    pub result: GameResult,
    pub output: PathBuf,
}

pub struct Driver {
    config: DriverConfig,
}

impl Driver {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    /// Run one game against the configured broker
    pub async fn run(self) -> Result<DriverReport> {
        let board = self.initial_board()?;
        let (width, height) = (board.width(), board.height());
        let turns = self.config.turns;

        println!("lifegrid driver");
        println!("  Broker: {}", self.config.broker_addr);
        println!("  Board:  {}x{} ({} alive)", width, height, board.alive_count());
        println!("  Turns:  {}", turns);
        println!();

        let runner = BrokerClient::connect(self.config.broker_addr.as_str())
            .await
            .with_context(|| format!("Failed to connect to broker at {}", self.config.broker_addr))?;
        let control = Arc::new(
            BrokerClient::connect(self.config.broker_addr.as_str())
                .await
                .context("Failed to open control connection")?,
        );

        let (done_tx, done_rx) = watch::channel(false);
        let (paused_tx, paused_rx) = watch::channel(false);
        let (abort_tx, abort_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor_alive_cells(
            Arc::clone(&control),
            self.config.alive_poll,
            done_rx.clone(),
            paused_rx,
        ));
        let operator = tokio::spawn(handle_operator(
            Arc::clone(&control),
            self.config.output_dir.clone(),
            done_rx,
            paused_tx,
            abort_tx,
        ));

        let started_at = Utc::now();
        let started = Instant::now();
        let outcome = tokio::select! {
            outcome = runner.start_game(board, turns) => outcome,
            Ok(()) = abort_rx => {
                done_tx.send_replace(true);
                anyhow::bail!("Interrupted twice, abandoning the run");
            }
        };
        let elapsed = started.elapsed();
        done_tx.send_replace(true);

        monitor.await.context("Alive-cell monitor panicked")?;
        operator.await.context("Operator control handler panicked")?;

        let result = outcome.context("StartGame failed")?;
        println!(
            "Run {:?}: {} turns in {:.2}s, {} alive cells",
            result.outcome,
            result.completed_turns,
            elapsed.as_secs_f64(),
            result.alive_cells.len()
        );

        let output = output_path(&self.config.output_dir, width, height, result.completed_turns);
        write_pgm(&output, &result.board)?;
        println!("Wrote {}", output.display());

        if let Some(ref path) = self.config.summary {
            let summary = RunSummary {
                started_at,
                finished_at: Utc::now(),
                broker: self.config.broker_addr.clone(),
                width,
                height,
                requested_turns: turns,
                completed_turns: result.completed_turns,
                alive_cells: result.alive_cells.len(),
                outcome: result.outcome,
                elapsed_secs: elapsed.as_secs_f64(),
                output: output.clone(),
                timings: result.timings.clone(),
            };
            write_summary(path, &summary)?;
            println!("Wrote summary {}", path.display());
        }

        if self.config.close_on_finish && result.outcome != RunOutcome::Closed {
            control.close_broker().await.context("CloseBroker failed")?;
            println!("Broker closed");
        }

        Ok(DriverReport { result, output })
    }

    fn initial_board(&self) -> Result<Board> {
        match self.config.input {
            Some(ref path) => {
                let board = read_pgm(path)?;
                let expected_width = self.config.width.unwrap_or(board.width());
                let expected_height = self.config.height.unwrap_or(board.height());
                if (board.width(), board.height()) != (expected_width, expected_height) {
                    anyhow::bail!(
                        "{} is {}x{}, configured size is {}x{}",
                        path.display(),
                        board.width(),
                        board.height(),
                        expected_width,
                        expected_height
                    );
                }
                Ok(board)
            }
            None => Ok(random_board(
                self.config.width.unwrap_or(DEFAULT_BOARD_SIZE),
                self.config.height.unwrap_or(DEFAULT_BOARD_SIZE),
                self.config.density,
                self.config.seed,
            )),
        }
    }
}

/// `<dir>/<width>x<height>x<turns>.pgm`
pub fn output_path(dir: &Path, width: usize, height: usize, turns: u32) -> PathBuf {
    dir.join(format!("{}x{}x{}.pgm", width, height, turns))
}

fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    std::fs::write(path, json).with_context(|| format!("Failed to write summary: {}", path.display()))
}

/// Resolves once `flag` is set or its sender is gone
async fn flag_set(flag: &mut watch::Receiver<bool>) {
    flag.wait_for(|set| *set).await.ok();
}

/// Report the alive-cell count until the run ends, skipping ticks while paused
async fn monitor_alive_cells(
    client: Arc<BrokerClient>,
    interval: std::time::Duration,
    mut done: watch::Receiver<bool>,
    paused: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // First tick fires immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = flag_set(&mut done) => return,
            _ = ticker.tick() => {
                let is_paused = *paused.borrow();
                if is_paused {
                    tracing::trace!("Run paused, skipping alive cell report");
                    continue;
                }
                match client.alive_cell_count().await {
                    Ok(report) => {
                        println!(
                            "Completed turns {:>6}  alive cells {}",
                            report.completed_turns,
                            report.alive_cells.len()
                        );
                        tracing::debug!(
                            completed_turns = report.completed_turns,
                            alive = report.alive_cells.len(),
                            "Alive cell count"
                        );
                    }
                    Err(e) => tracing::warn!(error = %e, "AliveCellCount failed"),
                }
            }
        }
    }
}

/// Map Ctrl+C and control signals onto broker calls until the run ends
///
/// The first Ctrl+C sends ControllerClosed; the second fires `abort` so the
/// driver stops waiting on a broker that does not answer.
async fn handle_operator(
    client: Arc<BrokerClient>,
    output_dir: PathBuf,
    mut done: watch::Receiver<bool>,
    paused: watch::Sender<bool>,
    abort: oneshot::Sender<()>,
) {
    let mut signals = match ControlSignals::install() {
        Ok(signals) => Some(signals),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install control signal handlers");
            None
        }
    };
    let mut abort = Some(abort);
    let mut interrupts = Interrupts::default();

    loop {
        tokio::select! {
            _ = flag_set(&mut done) => return,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
                    return;
                }
                if interrupts.press() == Interrupt::Abandon {
                    println!("Interrupted again, exiting");
                    if let Some(abort) = abort.take() {
                        abort.send(()).ok();
                    }
                    return;
                }
                println!("Interrupted, telling broker to stop (Ctrl+C again to exit)");
                // Off this loop so a stalled broker cannot swallow the second Ctrl+C
                let client = Arc::clone(&client);
                tokio::spawn(async move {
                    if let Err(e) = client.controller_closed().await {
                        tracing::error!(error = %e, "ControllerClosed failed");
                    }
                });
            }
            action = next_action(&mut signals) => {
                match control::apply(&client, action, &output_dir).await {
                    Ok(ControlOutcome::Paused { .. }) => {
                        paused.send_replace(true);
                    }
                    Ok(ControlOutcome::Resumed { .. }) | Ok(ControlOutcome::Killed(_)) => {
                        paused.send_replace(false);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(?action, error = %format!("{:#}", e), "Control action failed"),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Ask the broker to stop and keep waiting for its result
    StopRun,
    /// Stop waiting for the broker
    Abandon,
}

/// Ctrl+C presses seen during one run
#[derive(Debug, Default)]
struct Interrupts {
    seen: u32,
}

impl Interrupts {
    fn press(&mut self) -> Interrupt {
        self.seen += 1;
        if self.seen == 1 {
            Interrupt::StopRun
        } else {
            Interrupt::Abandon
        }
    }
}

async fn next_action(signals: &mut Option<ControlSignals>) -> ControlAction {
    match signals {
        Some(signals) => signals.recv().await,
        None => std::future::pending().await,
    }
}

/// Unix signals mapped to control actions
#[cfg(unix)]
struct ControlSignals {
    pause: tokio::signal::unix::Signal,
    snapshot: tokio::signal::unix::Signal,
    kill: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ControlSignals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            pause: signal(SignalKind::user_defined1())?,
            snapshot: signal(SignalKind::user_defined2())?,
            kill: signal(SignalKind::quit())?,
        })
    }

    async fn recv(&mut self) -> ControlAction {
        tokio::select! {
            Some(()) = self.pause.recv() => ControlAction::Pause,
            Some(()) = self.snapshot.recv() => ControlAction::Snapshot,
            Some(()) = self.kill.recv() => ControlAction::Kill,
            else => std::future::pending().await,
        }
    }
}

#[cfg(not(unix))]
struct ControlSignals;

#[cfg(not(unix))]
impl ControlSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> ControlAction {
        std::future::pending().await
    }
}
