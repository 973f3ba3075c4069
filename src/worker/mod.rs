//! Worker compute engine
//!
//! A worker receives a row range and a snapshot of the full board, and returns
//! the next generation for exactly those rows. The range is split again into
//! sub-bands that run concurrently on the rayon pool.
//!
//! # Architecture
//!
//! - [`SectionEngine`]: pure computation, no IO
//! - [`SectionClient`]: how the broker talks to a worker; implemented in-process
//!   by [`LocalWorker`] and over TCP by `distributed::RemoteWorker`
//! - `rules`: the per-cell recurrence

pub mod local;
pub mod rules;

use crate::board::{partition, Board, RowRange, DEAD};
use crate::error::{GolError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use local::LocalWorker;

/// Default number of sub-bands a worker splits its range into
pub const DEFAULT_SUB_WORKERS: usize = 2;

/// AdvanceSection request (broker → worker)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceSectionRequest {
    /// First row to advance
    pub start_y: usize,

    /// One past the last row to advance
    pub end_y: usize,

    pub width: usize,
    pub height: usize,

    /// Full snapshot of the current generation
    ///
    /// Rows outside the range are needed for neighbour lookups across the
    /// range boundary and around the torus.
    pub board: Arc<Board>,
}

impl AdvanceSectionRequest {
    pub fn new(range: RowRange, board: Arc<Board>) -> Self {
        Self {
            start_y: range.start,
            end_y: range.end,
            width: board.width(),
            height: board.height(),
            board,
        }
    }

    pub fn range(&self) -> RowRange {
        RowRange {
            start: self.start_y,
            end: self.end_y,
        }
    }

    /// Check range and dimensions before any cell is touched
    pub fn validate(&self) -> Result<()> {
        if self.start_y > self.end_y || self.end_y > self.height {
            return Err(GolError::validation(format!(
                "row range [{}, {}) invalid for height {}",
                self.start_y, self.end_y, self.height
            )));
        }
        self.board.ensure_dimensions(self.width, self.height)?;
        self.board.validate()
    }
}

/// Advanced rows returned by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub start_y: usize,
    pub end_y: usize,
    pub width: usize,

    /// Row-major cells of rows `[start_y, end_y)`
    pub cells: Vec<u8>,
}

impl Section {
    pub fn range(&self) -> RowRange {
        RowRange {
            start: self.start_y,
            end: self.end_y,
        }
    }

    /// Check that this section answers a request for `range` on a board of `width`
    pub fn check_matches(&self, range: RowRange, width: usize) -> Result<()> {
        if self.range() != range || self.width != width {
            return Err(GolError::Protocol(format!(
                "section covers rows [{}, {}) width {}, expected {} width {}",
                self.start_y, self.end_y, self.width, range, width
            )));
        }
        if self.cells.len() != range.len() * width {
            return Err(GolError::Protocol(format!(
                "section holds {} cells, expected {}",
                self.cells.len(),
                range.len() * width
            )));
        }
        Ok(())
    }
}

/// How the broker reaches one worker
#[async_trait]
pub trait SectionClient: Send + Sync {
    /// Identifier used in logs (address or local name)
    fn name(&self) -> &str;

    /// Compute the next generation for the requested rows
    async fn advance_section(&self, request: AdvanceSectionRequest) -> Result<Section>;

    /// Tell the worker to close; returns once the worker acknowledged
    async fn close(&self) -> Result<()>;
}

/// Splits a row range into sub-bands and advances them in parallel
#[derive(Debug, Clone)]
pub struct SectionEngine {
    sub_workers: usize,
}

impl Default for SectionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SUB_WORKERS)
    }
}

impl SectionEngine {
    pub fn new(sub_workers: usize) -> Self {
        Self {
            sub_workers: sub_workers.max(1),
        }
    }

    pub fn sub_workers(&self) -> usize {
        self.sub_workers
    }

    /// Advance the requested rows by one generation
    ///
    /// `closing` is polled before each sub-band is dispatched. Once it is set
    /// no further bands start and the call fails with
    /// [`GolError::WorkerClosing`]; bands already running are left to finish.
    pub fn advance_section(
        &self,
        request: &AdvanceSectionRequest,
        closing: &AtomicBool,
    ) -> Result<Section> {
        request.validate()?;

        let range = request.range();
        let width = request.width;
        let board: &Board = &request.board;
        let mut cells = vec![DEAD; range.len() * width];
        let bands = partition(range, self.sub_workers);
        let mut aborted = false;

        rayon::scope(|scope| {
            let mut remaining: &mut [u8] = &mut cells;
            for band in bands {
                if closing.load(Ordering::Acquire) {
                    aborted = true;
                    break;
                }
                let (chunk, rest) = std::mem::take(&mut remaining).split_at_mut(band.len() * width);
                remaining = rest;
                if band.is_empty() {
                    continue;
                }
                scope.spawn(move |_| rules::advance_band(board, band, chunk));
            }
        });

        if aborted {
            tracing::debug!(range = %range, "section abandoned, worker closing");
            return Err(GolError::WorkerClosing);
        }

        Ok(Section {
            start_y: range.start,
            end_y: range.end,
            width,
            cells,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{seed::random_board, Cell};

    fn request(board: &Board, range: RowRange) -> AdvanceSectionRequest {
        AdvanceSectionRequest::new(range, Arc::new(board.clone()))
    }

    #[test]
    fn test_section_matches_single_threaded_step() {
        let board = random_board(40, 33, 0.35, 11);
        let expected = rules::step(&board);
        let closing = AtomicBool::new(false);

        for sub_workers in [1, 2, 3, 7, 64] {
            let engine = SectionEngine::new(sub_workers);
            let range = RowRange::new(5, 29);
            let section = engine.advance_section(&request(&board, range), &closing).unwrap();
            section.check_matches(range, 40).unwrap();
            assert_eq!(section.cells, expected.rows(range), "sub_workers={}", sub_workers);
        }
    }

    #[test]
    fn test_empty_range_returns_empty_section() {
        let board = Board::new(4, 4);
        let engine = SectionEngine::default();
        let section = engine
            .advance_section(&request(&board, RowRange::new(2, 2)), &AtomicBool::new(false))
            .unwrap();
        assert!(section.cells.is_empty());
    }

    #[test]
    fn test_closing_flag_aborts() {
        let board = Board::with_alive(4, 4, &[Cell::new(1, 1)]).unwrap();
        let engine = SectionEngine::default();
        let err = engine
            .advance_section(&request(&board, RowRange::new(0, 4)), &AtomicBool::new(true))
            .unwrap_err();
        assert!(matches!(err, GolError::WorkerClosing));
    }

    #[test]
    fn test_rejects_range_past_height() {
        let board = Board::new(4, 4);
        let mut req = request(&board, RowRange::new(0, 4));
        req.end_y = 5;
        let err = SectionEngine::default()
            .advance_section(&req, &AtomicBool::new(false))
            .unwrap_err();
        assert!(matches!(err, GolError::Validation(_)));
    }

    #[test]
    fn test_rejects_dimension_mismatch() {
        let board = Board::new(4, 4);
        let mut req = request(&board, RowRange::new(0, 2));
        req.width = 5;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_check_matches_rejects_wrong_range() {
        let section = Section {
            start_y: 0,
            end_y: 2,
            width: 3,
            cells: vec![DEAD; 6],
        };
        assert!(section.check_matches(RowRange::new(0, 2), 3).is_ok());
        assert!(section.check_matches(RowRange::new(1, 3), 3).is_err());
        assert!(section.check_matches(RowRange::new(0, 2), 4).is_err());
    }
}
