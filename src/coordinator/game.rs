//! Game state owned by the broker
//!
//! `current` is shared with in-flight worker requests as an `Arc` snapshot;
//! `next` is the reassembly buffer. The two are swapped once a turn has been
//! fully reassembled.

use crate::board::{Board, RowRange};
use crate::error::{GolError, Result};
use crate::worker::Section;
use std::sync::Arc;

/// One run's boards and turn counter
#[derive(Debug)]
pub struct Game {
    current: Arc<Board>,
    next: Board,
    completed_turns: u32,
}

impl Game {
    pub fn new(board: Board) -> Self {
        let next = Board::new(board.width(), board.height());
        Self {
            current: Arc::new(board),
            next,
            completed_turns: 0,
        }
    }

    /// Last fully computed generation
    pub fn current(&self) -> &Board {
        &self.current
    }

    /// Shared handle on the current generation for worker requests
    pub fn snapshot(&self) -> Arc<Board> {
        Arc::clone(&self.current)
    }

    pub fn completed_turns(&self) -> u32 {
        self.completed_turns
    }

    /// Reassemble worker sections into `next`, swap, and count the turn
    ///
    /// Sections must be in ascending row order and cover the board exactly.
    /// Everything is checked before the first row is copied, so a rejected
    /// turn leaves both boards untouched.
    pub fn commit(&mut self, sections: &[Section]) -> Result<()> {
        let width = self.next.width();
        let mut expected_start = 0;
        for section in sections {
            let range = RowRange {
                start: expected_start,
                end: section.end_y,
            };
            if section.end_y < expected_start {
                return Err(GolError::Protocol(format!(
                    "section [{}, {}) is out of order",
                    section.start_y, section.end_y
                )));
            }
            section.check_matches(range, width)?;
            expected_start = section.end_y;
        }
        if expected_start != self.next.height() {
            return Err(GolError::Protocol(format!(
                "sections cover rows [0, {}), board has {}",
                expected_start,
                self.next.height()
            )));
        }

        for section in sections {
            self.next.rows_mut(section.range()).copy_from_slice(&section.cells);
        }

        let advanced = std::mem::replace(&mut self.next, Board::new(0, 0));
        let previous = std::mem::replace(&mut self.current, Arc::new(advanced));
        // Workers have dropped their snapshots by now; clone only if one is still held
        self.next = Arc::try_unwrap(previous).unwrap_or_else(|shared| (*shared).clone());
        self.completed_turns += 1;
        Ok(())
    }
}
