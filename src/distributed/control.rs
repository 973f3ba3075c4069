//! Operator controls for a broker run
//!
//! The driver applies these when it receives a control signal while its run
//! is in progress (SIGUSR1 pause, SIGUSR2 snapshot, SIGQUIT kill). The
//! `control` mode applies one of them from another process.

use super::client::BrokerClient;
use super::driver::output_path;
use crate::board::pgm::write_pgm;
use crate::coordinator::BoardSnapshot;
use crate::error::ErrorKind;
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::{Path, PathBuf};

/// Control action
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ControlAction {
    /// Toggle between paused and running
    Pause,
    /// Write the current board to the output directory
    Snapshot,
    /// Write a snapshot, then close the broker and its workers
    Kill,
    /// Tell the broker the driver went away
    Quit,
}

/// What an applied action did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    Paused { completed_turns: u32 },
    Resumed { completed_turns: u32 },
    Snapshot(PathBuf),
    /// Broker closed; the snapshot is missing when no game was ever started
    Killed(Option<PathBuf>),
    Quit,
}

/// Apply one action through `client`, writing images under `output_dir`
pub async fn apply(client: &BrokerClient, action: ControlAction, output_dir: &Path) -> Result<ControlOutcome> {
    tracing::debug!(?action, broker = client.addr(), "Applying control action");

    match action {
        ControlAction::Pause => {
            let report = client.pause().await.context("PauseBroker failed")?;
            if report.paused {
                println!("Paused after turn {}", report.completed_turns);
                Ok(ControlOutcome::Paused {
                    completed_turns: report.completed_turns,
                })
            } else {
                println!("Continuing from turn {}", report.completed_turns);
                Ok(ControlOutcome::Resumed {
                    completed_turns: report.completed_turns,
                })
            }
        }
        ControlAction::Snapshot => Ok(ControlOutcome::Snapshot(snapshot(client, output_dir).await?)),
        ControlAction::Kill => {
            let path = match client.current_board().await {
                Ok(snapshot) => Some(write_snapshot(&snapshot, output_dir)?),
                Err(e) if e.kind() == ErrorKind::NoActiveGame => None,
                Err(e) => return Err(e).context("CurrentBoard failed"),
            };
            // A paused run only honours the close after a resume
            resume_if_paused(client).await;
            client.close_broker().await.context("CloseBroker failed")?;
            println!("Broker closed");
            Ok(ControlOutcome::Killed(path))
        }
        ControlAction::Quit => {
            client
                .controller_closed()
                .await
                .context("ControllerClosed failed")?;
            Ok(ControlOutcome::Quit)
        }
    }
}

/// Write the broker's current board to `<dir>/<w>x<h>x<turns>.pgm`
pub async fn snapshot(client: &BrokerClient, output_dir: &Path) -> Result<PathBuf> {
    let snapshot = client.current_board().await.context("CurrentBoard failed")?;
    write_snapshot(&snapshot, output_dir)
}

fn write_snapshot(snapshot: &BoardSnapshot, output_dir: &Path) -> Result<PathBuf> {
    let board = &snapshot.board;
    let path = output_path(output_dir, board.width(), board.height(), snapshot.completed_turns);
    write_pgm(&path, board)?;
    println!(
        "Wrote {} (turn {}, {} alive)",
        path.display(),
        snapshot.completed_turns,
        board.alive_count()
    );
    Ok(path)
}

/// Leave the run unpaused, whatever state it was in
async fn resume_if_paused(client: &BrokerClient) {
    // Errors mean there is no run to resume
    if let Ok(report) = client.pause().await {
        if report.paused {
            client.pause().await.ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::pgm::read_pgm;
    use crate::board::seed::random_board;
    use crate::coordinator::{Broker, BrokerSettings, RunOutcome};
    use crate::distributed::BrokerService;
    use crate::worker::{rules, LocalWorker, SectionClient};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    async fn start_broker() -> (String, JoinHandle<crate::Result<()>>) {
        let workers: Vec<Arc<dyn SectionClient>> = LocalWorker::pool(2, 2)
            .into_iter()
            .map(|w| Arc::new(w) as Arc<dyn SectionClient>)
            .collect();
        let broker = Arc::new(Broker::new(workers, BrokerSettings::default()).unwrap());
        let service = BrokerService::bind("127.0.0.1:0", broker, Duration::from_millis(100))
            .await
            .unwrap();
        let addr = service.local_addr().unwrap().to_string();
        (addr, tokio::spawn(service.run()))
    }

    #[tokio::test]
    async fn test_snapshot_names_file_after_turns() {
        let (addr, service) = start_broker().await;
        let dir = tempfile::tempdir().unwrap();
        let client = BrokerClient::connect(addr.as_str()).await.unwrap();

        let board = random_board(9, 6, 0.4, 17);
        let result = client.start_game(board.clone(), 4).await.unwrap();

        let outcome = apply(&client, ControlAction::Snapshot, dir.path()).await.unwrap();
        let path = dir.path().join("9x6x4.pgm");
        assert_eq!(outcome, ControlOutcome::Snapshot(path.clone()));
        assert_eq!(read_pgm(&path).unwrap(), result.board);

        let mut expected = board;
        for _ in 0..4 {
            expected = rules::step(&expected);
        }
        assert_eq!(result.board, expected);

        apply(&client, ControlAction::Kill, dir.path()).await.unwrap();
        service.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_pause_toggles_and_kill_stops_paused_run() {
        let (addr, service) = start_broker().await;
        let dir = tempfile::tempdir().unwrap();
        let runner = BrokerClient::connect(addr.as_str()).await.unwrap();
        let control = BrokerClient::connect(addr.as_str()).await.unwrap();

        let run = tokio::spawn(async move { runner.start_game(random_board(16, 16, 0.3, 2), 1_000_000).await });
        while control
            .alive_cell_count()
            .await
            .map(|r| r.completed_turns < 2)
            .unwrap_or(true)
        {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let paused = apply(&control, ControlAction::Pause, dir.path()).await.unwrap();
        assert!(matches!(paused, ControlOutcome::Paused { .. }));

        let killed = apply(&control, ControlAction::Kill, dir.path()).await.unwrap();
        match killed {
            ControlOutcome::Killed(Some(path)) => assert!(path.exists()),
            other => panic!("unexpected outcome {:?}", other),
        }

        let result = run.await.unwrap().unwrap();
        assert_eq!(result.outcome, RunOutcome::Closed);
        service.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_kill_without_game_still_closes() {
        let (addr, service) = start_broker().await;
        let dir = tempfile::tempdir().unwrap();
        let client = BrokerClient::connect(addr.as_str()).await.unwrap();

        let err = client.current_board().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoActiveGame);
        assert!(apply(&client, ControlAction::Snapshot, dir.path()).await.is_err());

        let outcome = apply(&client, ControlAction::Kill, dir.path()).await.unwrap();
        assert_eq!(outcome, ControlOutcome::Killed(None));
        service.await.unwrap().unwrap();
    }
}
