//! Board representation
//!
//! A board is a `width × height` grid of cells stored row-major in one flat
//! buffer. Each cell holds one of two sentinel bytes: [`ALIVE`] or [`DEAD`].
//!
//! # Modules
//!
//! - `partition`: row range splitting shared by the broker and the workers
//! - `pgm`: binary PGM (P5) import/export used by the driver
//! - `seed`: seeded random soup generation

pub mod partition;
pub mod pgm;
pub mod seed;

use crate::error::{GolError, Result};
use serde::{Deserialize, Serialize};

pub use partition::{partition, RowRange};

/// Cell value for a live cell
pub const ALIVE: u8 = 255;

/// Cell value for a dead cell
pub const DEAD: u8 = 0;

/// Coordinate of a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
}

impl Cell {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// One generation of the grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl Board {
    /// Create an all-dead board
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![DEAD; width * height],
        }
    }

    /// Build a board from a row-major cell buffer
    ///
    /// Fails if the buffer length does not match `width × height` or a cell is
    /// neither [`ALIVE`] nor [`DEAD`].
    pub fn from_cells(width: usize, height: usize, cells: Vec<u8>) -> Result<Self> {
        let board = Self { width, height, cells };
        board.validate()?;
        Ok(board)
    }

    /// Build a board with the given cells alive
    pub fn with_alive(width: usize, height: usize, alive: &[Cell]) -> Result<Self> {
        let mut board = Self::new(width, height);
        for cell in alive {
            if cell.x >= width || cell.y >= height {
                return Err(GolError::validation(format!(
                    "cell ({}, {}) outside {}x{} board",
                    cell.x, cell.y, width, height
                )));
            }
            board.set(cell.x, cell.y, true);
        }
        Ok(board)
    }

    /// Check the buffer against the declared dimensions and cell encoding
    ///
    /// Boards arriving over the wire bypass [`Board::from_cells`], so request
    /// handlers call this before touching the cells.
    pub fn validate(&self) -> Result<()> {
        let expected = self.width.checked_mul(self.height).ok_or_else(|| {
            GolError::validation(format!("board {}x{} overflows", self.width, self.height))
        })?;
        if self.cells.len() != expected {
            return Err(GolError::validation(format!(
                "board buffer holds {} cells, expected {}x{} = {}",
                self.cells.len(),
                self.width,
                self.height,
                expected
            )));
        }
        if let Some(pos) = self.cells.iter().position(|&c| c != ALIVE && c != DEAD) {
            return Err(GolError::validation(format!(
                "cell ({}, {}) has value {}, expected {} or {}",
                pos % self.width,
                pos / self.width,
                self.cells[pos],
                DEAD,
                ALIVE
            )));
        }
        Ok(())
    }

    /// Check that the board matches the dimensions a request declared
    pub fn ensure_dimensions(&self, width: usize, height: usize) -> Result<()> {
        if self.width != width || self.height != height {
            return Err(GolError::validation(format!(
                "board is {}x{} but request declares {}x{}",
                self.width, self.height, width, height
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Raw row-major cells
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Cells of row `y`
    pub fn row(&self, y: usize) -> &[u8] {
        &self.cells[y * self.width..(y + 1) * self.width]
    }

    /// Cells of rows `[start_y, end_y)`
    pub fn rows(&self, range: RowRange) -> &[u8] {
        &self.cells[range.start * self.width..range.end * self.width]
    }

    /// Mutable cells of rows `[start_y, end_y)`
    pub fn rows_mut(&mut self, range: RowRange) -> &mut [u8] {
        &mut self.cells[range.start * self.width..range.end * self.width]
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.cells[y * self.width + x]
    }

    pub fn is_alive(&self, x: usize, y: usize) -> bool {
        self.get(x, y) == ALIVE
    }

    /// Alive check with toroidal wraparound on both axes
    pub fn is_alive_wrapped(&self, x: isize, y: isize) -> bool {
        self.is_alive(wrap(x, self.width), wrap(y, self.height))
    }

    pub fn set(&mut self, x: usize, y: usize, alive: bool) {
        self.cells[y * self.width + x] = if alive { ALIVE } else { DEAD };
    }

    /// Coordinates of every live cell, in row-major order
    pub fn alive_cells(&self) -> Vec<Cell> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == ALIVE)
            .map(|(i, _)| Cell::new(i % self.width, i / self.width))
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == ALIVE).count()
    }

    /// Full row range of this board
    pub fn full_range(&self) -> RowRange {
        RowRange::new(0, self.height)
    }
}

/// Wrap a possibly negative coordinate onto `[0, n)`
///
/// Neighbour offsets never exceed one cell, so adding `n` once is enough to
/// keep the dividend non-negative.
pub fn wrap(v: isize, n: usize) -> usize {
    let n = n as isize;
    ((v + n) % n) as usize
}
