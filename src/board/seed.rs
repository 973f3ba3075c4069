//! Seeded random soups
//!
//! Used by the driver when no input image is given. The same seed always
//! produces the same board, which makes runs reproducible across clusters.

use super::Board;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

/// Generate a board where each cell is alive with probability `density`
pub fn random_board(width: usize, height: usize, density: f64, seed: u64) -> Board {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let density = density.clamp(0.0, 1.0);
    let mut board = Board::new(width, height);
    for y in 0..height {
        for x in 0..width {
            if rng.gen_bool(density) {
                board.set(x, y, true);
            }
        }
    }
    board
}
