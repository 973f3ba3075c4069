//! Conway's cell update rule on a toroidal board

use crate::board::{Board, RowRange, ALIVE, DEAD};

/// Relative offsets of the eight neighbours
const NEIGHBOUR_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Count live neighbours of `(x, y)`, wrapping past every edge
pub fn alive_neighbours(board: &Board, x: usize, y: usize) -> u8 {
    let (x, y) = (x as isize, y as isize);
    NEIGHBOUR_OFFSETS
        .iter()
        .filter(|(dx, dy)| board.is_alive_wrapped(x + dx, y + dy))
        .count() as u8
}

/// Next state of one cell given its current state and neighbour count
pub fn next_state(alive: bool, neighbours: u8) -> bool {
    matches!((alive, neighbours), (true, 2) | (true, 3) | (false, 3))
}

/// Advance rows `range` of `board` by one generation into `out`
///
/// `out` holds exactly `range.len() * board.width()` cells; row `range.start`
/// lands at offset 0. Only `board` is read, so bands can run concurrently
/// against the same snapshot.
pub fn advance_band(board: &Board, range: RowRange, out: &mut [u8]) {
    let width = board.width();
    debug_assert_eq!(out.len(), range.len() * width);

    for (row_idx, y) in range.iter().enumerate() {
        let row_out = &mut out[row_idx * width..(row_idx + 1) * width];
        for (x, cell) in row_out.iter_mut().enumerate() {
            let alive = next_state(board.is_alive(x, y), alive_neighbours(board, x, y));
            *cell = if alive { ALIVE } else { DEAD };
        }
    }
}

/// Advance a whole board one generation on the current thread
///
/// Reference implementation used to check distributed results.
pub fn step(board: &Board) -> Board {
    let range = board.full_range();
    let mut next = Board::new(board.width(), board.height());
    advance_band(board, range, next.rows_mut(range));
    next
}
