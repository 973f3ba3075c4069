use super::*;
use crate::board::seed::random_board;
use crate::worker::{rules, SectionEngine};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// Scriptable worker: computes real sections, optionally slowly or failing
#[derive(Default)]
struct MockWorker {
    name: String,
    delay: Option<Duration>,
    failures_left: AtomicU32,
    refuse_close: AtomicBool,
    calls: AtomicUsize,
    closes: AtomicUsize,
}

impl MockWorker {
    fn new(index: usize) -> Self {
        Self {
            name: format!("mock-{}", index),
            ..Default::default()
        }
    }

    fn slow(index: usize, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(index)
        }
    }

    fn flaky(index: usize, failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            ..Self::new(index)
        }
    }

    fn stuck_open(index: usize) -> Self {
        Self {
            refuse_close: AtomicBool::new(true),
            ..Self::new(index)
        }
    }
}

#[async_trait]
impl SectionClient for MockWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn advance_section(&self, request: AdvanceSectionRequest) -> Result<Section> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(GolError::Protocol("connection reset".to_string()));
        }
        SectionEngine::new(1).advance_section(&request, &AtomicBool::new(false))
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.refuse_close.load(Ordering::SeqCst) {
            return Err(GolError::Protocol("connection refused".to_string()));
        }
        Ok(())
    }
}

fn pool(workers: Vec<MockWorker>) -> (Vec<Arc<MockWorker>>, Vec<Arc<dyn SectionClient>>) {
    let mocks: Vec<Arc<MockWorker>> = workers.into_iter().map(Arc::new).collect();
    let clients = mocks
        .iter()
        .map(|m| Arc::clone(m) as Arc<dyn SectionClient>)
        .collect();
    (mocks, clients)
}

fn broker_with(workers: Vec<MockWorker>, settings: BrokerSettings) -> (Vec<Arc<MockWorker>>, Arc<Broker>) {
    let (mocks, clients) = pool(workers);
    let broker = Broker::new(clients, settings).unwrap();
    (mocks, Arc::new(broker))
}

fn evolve(board: &Board, turns: u32) -> Board {
    let mut board = board.clone();
    for _ in 0..turns {
        board = rules::step(&board);
    }
    board
}

async fn wait_for_turns(broker: &Broker, turns: u32) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Ok(report) = broker.alive_cell_count().await {
                if report.completed_turns >= turns {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("run did not reach the expected turn");
}

#[tokio::test]
async fn test_completed_turns_match_request() {
    let board = random_board(16, 16, 0.4, 7);

    for turns in [0, 1, 100] {
        let (_, broker) = broker_with((0..3).map(MockWorker::new).collect(), BrokerSettings::default());
        let result = broker
            .start_game(StartGameRequest::new(board.clone(), turns))
            .await
            .unwrap();

        assert_eq!(result.completed_turns, turns);
        assert_eq!(result.outcome, RunOutcome::Completed);
        assert_eq!(result.board, evolve(&board, turns), "turns={}", turns);
        assert_eq!(result.alive_cells, result.board.alive_cells());
        assert_eq!(result.timings.turns, turns as u64);
    }
}

#[tokio::test]
async fn test_worker_count_does_not_change_result() {
    let board = random_board(20, 11, 0.35, 21);
    let expected = evolve(&board, 10);

    for workers in 1..=5 {
        let (_, broker) = broker_with((0..workers).map(MockWorker::new).collect(), BrokerSettings::default());
        let result = broker
            .start_game(StartGameRequest::new(board.clone(), 10))
            .await
            .unwrap();
        assert_eq!(result.board, expected, "workers={}", workers);
    }
}

#[tokio::test]
async fn test_more_workers_than_rows() {
    let board = random_board(6, 3, 0.5, 2);
    let (mocks, broker) = broker_with((0..5).map(MockWorker::new).collect(), BrokerSettings::default());

    let result = broker
        .start_game(StartGameRequest::new(board.clone(), 4))
        .await
        .unwrap();
    assert_eq!(result.board, evolve(&board, 4));
    assert!(mocks.iter().all(|m| m.calls.load(Ordering::SeqCst) == 4));
}

#[tokio::test]
async fn test_rejects_dimension_mismatch() {
    let (_, broker) = broker_with(vec![MockWorker::new(0)], BrokerSettings::default());
    let mut request = StartGameRequest::new(Board::new(4, 4), 1);
    request.width = 5;

    let err = broker.start_game(request).await.unwrap_err();
    assert!(matches!(err, GolError::Validation(_)));
    assert!(matches!(
        broker.alive_cell_count().await.unwrap_err(),
        GolError::NoActiveGame
    ));
}

#[test]
fn test_requires_a_worker() {
    assert!(Broker::new(Vec::new(), BrokerSettings::default()).is_err());
}

#[tokio::test]
async fn test_pause_and_resume_keep_result() {
    let board = random_board(12, 12, 0.4, 5);
    let turns = 60;
    let (_, broker) = broker_with(
        (0..2)
            .map(|i| MockWorker::slow(i, Duration::from_millis(1)))
            .collect(),
        BrokerSettings::default(),
    );

    let run = tokio::spawn({
        let broker = Arc::clone(&broker);
        let board = board.clone();
        async move { broker.start_game(StartGameRequest::new(board, turns)).await }
    });

    wait_for_turns(&broker, 5).await;
    let report = broker.pause().await.unwrap();
    assert!(report.paused);

    // At most the turn in flight when the toggle landed completes
    tokio::time::sleep(Duration::from_millis(30)).await;
    let first = broker.current_board().await.unwrap();
    assert!(first.completed_turns <= report.completed_turns + 1);
    tokio::time::sleep(Duration::from_millis(30)).await;
    let second = broker.current_board().await.unwrap();
    assert_eq!(first.completed_turns, second.completed_turns);
    assert_eq!(first.board, second.board);
    assert_eq!(broker.state().await, TurnState::Paused);

    let resumed = broker.pause().await.unwrap();
    assert!(!resumed.paused);

    let result = run.await.unwrap().unwrap();
    assert_eq!(result.completed_turns, turns);
    assert_eq!(result.board, evolve(&board, turns));
}

#[tokio::test]
async fn test_pause_without_game() {
    let (_, broker) = broker_with(vec![MockWorker::new(0)], BrokerSettings::default());
    assert!(matches!(broker.pause().await.unwrap_err(), GolError::NoActiveGame));
}

#[tokio::test]
async fn test_alive_count_never_torn() {
    let board = random_board(24, 24, 0.3, 42);
    let turns = 40;
    let generations: Vec<Vec<Cell>> = (0..=turns)
        .scan(board.clone(), |current, _| {
            let cells = current.alive_cells();
            *current = rules::step(current);
            Some(cells)
        })
        .collect();

    let (_, broker) = broker_with(
        (0..4)
            .map(|i| MockWorker::slow(i, Duration::from_micros(200)))
            .collect(),
        BrokerSettings::default(),
    );
    let run = tokio::spawn({
        let broker = Arc::clone(&broker);
        async move { broker.start_game(StartGameRequest::new(board, turns)).await }
    });

    let mut observed = 0;
    while !run.is_finished() {
        if let Ok(report) = broker.alive_cell_count().await {
            let expected = &generations[report.completed_turns as usize];
            assert_eq!(&report.alive_cells, expected, "turn {}", report.completed_turns);
            observed += 1;
        }
        tokio::task::yield_now().await;
    }

    let result = run.await.unwrap().unwrap();
    assert_eq!(result.alive_cells, generations[turns as usize]);
    assert!(observed > 0);
}

#[tokio::test]
async fn test_close_during_run_cascades_once() {
    let board = random_board(10, 10, 0.4, 3);
    let (mocks, broker) = broker_with(
        (0..3)
            .map(|i| MockWorker::slow(i, Duration::from_millis(1)))
            .collect(),
        BrokerSettings::default(),
    );
    let mut closed = broker.closed_signal();

    let run = tokio::spawn({
        let broker = Arc::clone(&broker);
        async move { broker.start_game(StartGameRequest::new(board, 1_000_000)).await }
    });

    wait_for_turns(&broker, 2).await;
    broker.close().await.unwrap();

    let result = run.await.unwrap().unwrap();
    assert_eq!(result.outcome, RunOutcome::Closed);
    assert!(result.completed_turns >= 2);
    for mock in &mocks {
        assert_eq!(mock.closes.load(Ordering::SeqCst), 1, "{}", mock.name);
    }

    closed.wait_for(|c| *c).await.unwrap();
    let err = broker
        .start_game(StartGameRequest::new(Board::new(2, 2), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, GolError::BrokerClosed));
}

#[tokio::test]
async fn test_close_when_idle() {
    let (mocks, broker) = broker_with((0..2).map(MockWorker::new).collect(), BrokerSettings::default());

    broker.close().await.unwrap();
    broker.close().await.unwrap();

    assert!(*broker.closed_signal().borrow());
    for mock in &mocks {
        assert_eq!(mock.closes.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn test_disconnect_keeps_last_board() {
    let board = random_board(14, 9, 0.45, 8);
    let (_, broker) = broker_with(
        (0..2)
            .map(|i| MockWorker::slow(i, Duration::from_millis(1)))
            .collect(),
        BrokerSettings::default(),
    );

    let run = tokio::spawn({
        let broker = Arc::clone(&broker);
        let board = board.clone();
        async move { broker.start_game(StartGameRequest::new(board, 1_000_000)).await }
    });

    wait_for_turns(&broker, 3).await;
    broker.controller_closed().await.unwrap();

    let result = run.await.unwrap().unwrap();
    assert_eq!(result.outcome, RunOutcome::Disconnected);
    assert_eq!(result.board, evolve(&board, result.completed_turns));
    assert_eq!(broker.state().await, TurnState::Disconnected);

    // Last completed generation stays inspectable
    let snapshot = broker.current_board().await.unwrap();
    assert_eq!(snapshot.completed_turns, result.completed_turns);
}

#[tokio::test]
async fn test_disconnect_takes_priority_over_pause() {
    let board = random_board(8, 8, 0.4, 4);
    let (_, broker) = broker_with(
        vec![MockWorker::slow(0, Duration::from_millis(1))],
        BrokerSettings::default(),
    );

    let run = tokio::spawn({
        let broker = Arc::clone(&broker);
        async move { broker.start_game(StartGameRequest::new(board, 1_000_000)).await }
    });

    wait_for_turns(&broker, 1).await;
    broker.pause().await.unwrap();
    broker.controller_closed().await.unwrap();

    let result = run.await.unwrap().unwrap();
    assert_eq!(result.outcome, RunOutcome::Disconnected);
}

#[tokio::test]
async fn test_second_start_rejected_while_running() {
    let (_, broker) = broker_with(
        vec![MockWorker::slow(0, Duration::from_millis(1))],
        BrokerSettings::default(),
    );

    let run = tokio::spawn({
        let broker = Arc::clone(&broker);
        async move {
            broker
                .start_game(StartGameRequest::new(Board::new(4, 4), 1_000_000))
                .await
        }
    });

    wait_for_turns(&broker, 1).await;
    let err = broker
        .start_game(StartGameRequest::new(Board::new(4, 4), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, GolError::RunInProgress));

    broker.controller_closed().await.unwrap();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_turn_timeout_leaves_board_unchanged() {
    let board = random_board(8, 8, 0.5, 13);
    let settings = BrokerSettings {
        turn_timeout: Some(Duration::from_millis(50)),
        worker_retries: 0,
    };
    let (_, broker) = broker_with(
        vec![
            MockWorker::new(0),
            MockWorker::slow(1, Duration::from_secs(30)),
        ],
        settings,
    );

    let err = broker
        .start_game(StartGameRequest::new(board.clone(), 5))
        .await
        .unwrap_err();
    assert!(matches!(err, GolError::WorkerTimeout { turn: 1, .. }));

    let snapshot = broker.current_board().await.unwrap();
    assert_eq!(snapshot.completed_turns, 0);
    assert_eq!(snapshot.board, board);
}

#[tokio::test]
async fn test_worker_failure_fails_run() {
    let board = random_board(8, 8, 0.5, 17);
    let (_, broker) = broker_with(
        vec![MockWorker::new(0), MockWorker::flaky(1, 1)],
        BrokerSettings::default(),
    );

    let err = broker
        .start_game(StartGameRequest::new(board.clone(), 3))
        .await
        .unwrap_err();
    assert!(matches!(err, GolError::WorkerFailed { worker: 1, .. }));
    assert_eq!(broker.current_board().await.unwrap().board, board);

    // The broker accepts a new run afterwards
    let result = broker
        .start_game(StartGameRequest::new(board.clone(), 3))
        .await
        .unwrap();
    assert_eq!(result.board, evolve(&board, 3));
}

#[tokio::test]
async fn test_worker_retries_recover() {
    let board = random_board(9, 7, 0.5, 19);
    let settings = BrokerSettings {
        turn_timeout: None,
        worker_retries: 2,
    };
    let (mocks, broker) = broker_with(vec![MockWorker::flaky(0, 2), MockWorker::new(1)], settings);

    let result = broker
        .start_game(StartGameRequest::new(board.clone(), 2))
        .await
        .unwrap();
    assert_eq!(result.board, evolve(&board, 2));
    assert_eq!(mocks[0].calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_close_while_paused_waits_for_resume() {
    let board = random_board(10, 10, 0.4, 21);
    let (mocks, broker) = broker_with(
        (0..2)
            .map(|i| MockWorker::slow(i, Duration::from_millis(1)))
            .collect(),
        BrokerSettings::default(),
    );

    let run = tokio::spawn({
        let broker = Arc::clone(&broker);
        async move { broker.start_game(StartGameRequest::new(board, 1_000_000)).await }
    });

    wait_for_turns(&broker, 2).await;
    assert!(broker.pause().await.unwrap().paused);

    let closer = tokio::spawn({
        let broker = Arc::clone(&broker);
        async move { broker.close().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!closer.is_finished());
    assert_eq!(broker.state().await, TurnState::Paused);
    for mock in &mocks {
        assert_eq!(mock.closes.load(Ordering::SeqCst), 0);
    }

    assert!(!broker.pause().await.unwrap().paused);
    closer.await.unwrap().unwrap();

    let result = run.await.unwrap().unwrap();
    assert_eq!(result.outcome, RunOutcome::Closed);
    for mock in &mocks {
        assert_eq!(mock.closes.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn test_result_belongs_to_its_own_run() {
    for _ in 0..20 {
        let (_, broker) = broker_with(
            (0..2)
                .map(|i| MockWorker::slow(i, Duration::from_micros(100)))
                .collect(),
            BrokerSettings::default(),
        );
        let board = random_board(8, 8, 0.4, 13);
        let expected = evolve(&board, 5);

        let run = tokio::spawn({
            let broker = Arc::clone(&broker);
            async move { broker.start_game(StartGameRequest::new(board, 5)).await }
        });

        // Other callers keep trying to start a tiny run of their own
        let contenders: Vec<_> = (0..16)
            .map(|_| {
                let broker = Arc::clone(&broker);
                tokio::spawn(async move {
                    for _ in 0..200 {
                        match broker.start_game(StartGameRequest::new(Board::new(3, 3), 0)).await {
                            Ok(result) => return Some(result),
                            Err(_) => tokio::task::yield_now().await,
                        }
                    }
                    None
                })
            })
            .collect();

        let result = run.await.unwrap().unwrap();
        assert_eq!(result.completed_turns, 5);
        assert_eq!(result.board, expected);

        for contender in contenders {
            if let Some(other) = contender.await.unwrap() {
                assert_eq!(other.board.width(), 3);
                assert_eq!(other.completed_turns, 0);
            }
        }
    }
}

#[tokio::test]
async fn test_close_reports_unacknowledged_worker() {
    let board = random_board(10, 10, 0.4, 8);
    let (mocks, broker) = broker_with(
        vec![
            MockWorker::slow(0, Duration::from_millis(1)),
            MockWorker::stuck_open(1),
        ],
        BrokerSettings::default(),
    );

    let run = tokio::spawn({
        let broker = Arc::clone(&broker);
        async move { broker.start_game(StartGameRequest::new(board, 1_000_000)).await }
    });
    wait_for_turns(&broker, 2).await;

    let err = broker.close().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WorkerFailed);
    assert!(!*broker.closed_signal().borrow());
    assert!(run.await.unwrap().is_err());

    // A second attempt closes the pool again once the worker answers
    mocks[1].refuse_close.store(false, Ordering::SeqCst);
    broker.close().await.unwrap();
    assert!(*broker.closed_signal().borrow());
    assert_eq!(mocks[1].closes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_idle_close_failure_keeps_broker_open() {
    let (mocks, broker) = broker_with(
        vec![MockWorker::new(0), MockWorker::stuck_open(1)],
        BrokerSettings::default(),
    );

    let err = broker.close().await.unwrap_err();
    assert!(matches!(err, GolError::WorkerFailed { worker: 1, .. }));
    assert!(!*broker.closed_signal().borrow());

    let err = broker
        .start_game(StartGameRequest::new(Board::new(2, 2), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, GolError::BrokerClosed));
    assert_eq!(mocks[0].closes.load(Ordering::SeqCst), 1);
}
