//! In-process worker
//!
//! Runs the section engine on the blocking thread pool. The worker service
//! wraps one of these per process, and the standalone mode gives the broker a
//! pool of them instead of remote nodes.

use super::{AdvanceSectionRequest, Section, SectionClient, SectionEngine};
use crate::error::{GolError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Worker that computes sections on the local machine
#[derive(Debug, Clone)]
pub struct LocalWorker {
    name: String,
    engine: Arc<SectionEngine>,
    closing: Arc<AtomicBool>,
}

impl LocalWorker {
    pub fn new(name: impl Into<String>, engine: SectionEngine) -> Self {
        Self {
            name: name.into(),
            engine: Arc::new(engine),
            closing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build `count` workers named `local-0`, `local-1`, ...
    pub fn pool(count: usize, sub_workers: usize) -> Vec<Self> {
        (0..count)
            .map(|i| Self::new(format!("local-{}", i), SectionEngine::new(sub_workers)))
            .collect()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SectionClient for LocalWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn advance_section(&self, request: AdvanceSectionRequest) -> Result<Section> {
        if self.is_closing() {
            return Err(GolError::WorkerClosing);
        }

        let engine = Arc::clone(&self.engine);
        let closing = Arc::clone(&self.closing);
        let section = tokio::task::spawn_blocking(move || engine.advance_section(&request, &closing))
            .await
            .map_err(std::io::Error::from)??;
        Ok(section)
    }

    async fn close(&self) -> Result<()> {
        self.closing.store(true, Ordering::Release);
        tracing::debug!(worker = %self.name, "local worker closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Board, Cell, RowRange};
    use crate::worker::rules;

    #[tokio::test]
    async fn test_local_worker_advances() {
        let board = Board::with_alive(6, 6, &[Cell::new(1, 2), Cell::new(2, 2), Cell::new(3, 2)])
            .unwrap();
        let worker = LocalWorker::new("w", SectionEngine::default());
        let range = RowRange::new(0, 6);
        let section = worker
            .advance_section(AdvanceSectionRequest::new(range, Arc::new(board.clone())))
            .await
            .unwrap();
        assert_eq!(section.cells, rules::step(&board).cells());
    }

    #[tokio::test]
    async fn test_local_worker_refuses_after_close() {
        let worker = LocalWorker::new("w", SectionEngine::default());
        worker.close().await.unwrap();
        assert!(worker.is_closing());

        let board = Arc::new(Board::new(2, 2));
        let err = worker
            .advance_section(AdvanceSectionRequest::new(RowRange::new(0, 2), board))
            .await
            .unwrap_err();
        assert!(matches!(err, GolError::WorkerClosing));
    }

    #[test]
    fn test_pool_names() {
        let pool = LocalWorker::pool(3, 2);
        let names: Vec<&str> = pool.iter().map(|w| w.name()).collect();
        assert_eq!(names, vec!["local-0", "local-1", "local-2"]);
    }
}
