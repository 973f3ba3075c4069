//! Row range partitioning
//!
//! The broker splits `[0, height)` across its workers and each worker splits
//! its own range across sub-bands. Both levels use [`partition`], which places
//! boundary `i` at `start + i * len / parts` so every range size is either
//! `len / parts` or one more, and the last range always ends at `end`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open row range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "row range {}..{} is inverted", start, end);
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, y: usize) -> bool {
        y >= self.start && y < self.end
    }

    pub fn iter(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for RowRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Split `range` into `parts` contiguous ranges in ascending order
///
/// When `parts` exceeds the number of rows some ranges are empty; they still
/// appear so callers can zip the result with a fixed worker list. `parts == 0`
/// yields no ranges.
pub fn partition(range: RowRange, parts: usize) -> Vec<RowRange> {
    if parts == 0 {
        return Vec::new();
    }

    let len = range.len();
    (0..parts)
        .map(|i| {
            let start = range.start + i * len / parts;
            let end = if i == parts - 1 {
                range.end
            } else {
                range.start + (i + 1) * len / parts
            };
            RowRange::new(start, end)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_cover(range: RowRange, parts: &[RowRange]) {
        let mut next = range.start;
        for p in parts {
            assert_eq!(p.start, next, "gap or overlap at {}", p);
            next = p.end;
        }
        assert_eq!(next, range.end);
    }

    #[test]
    fn test_partition_covers_every_row_once() {
        for height in 1..=64 {
            for workers in 1..=16 {
                let range = RowRange::new(0, height);
                let parts = partition(range, workers);
                assert_eq!(parts.len(), workers);
                assert_exact_cover(range, &parts);

                let min = parts.iter().map(RowRange::len).min().unwrap();
                let max = parts.iter().map(RowRange::len).max().unwrap();
                assert!(max - min <= 1, "h={} k={} sizes {}..{}", height, workers, min, max);
            }
        }
    }

    #[test]
    fn test_partition_offset_range() {
        let range = RowRange::new(10, 17);
        let parts = partition(range, 2);
        assert_eq!(parts, vec![RowRange::new(10, 13), RowRange::new(13, 17)]);
    }

    #[test]
    fn test_partition_more_parts_than_rows() {
        let range = RowRange::new(0, 2);
        let parts = partition(range, 4);
        assert_exact_cover(range, &parts);
        assert_eq!(parts.iter().filter(|p| p.is_empty()).count(), 2);
    }

    #[test]
    fn test_partition_nested_levels_cover() {
        let outer = partition(RowRange::new(0, 101), 3);
        let mut inner = Vec::new();
        for p in &outer {
            inner.extend(partition(*p, 2));
        }
        assert_exact_cover(RowRange::new(0, 101), &inner);
    }

    #[test]
    fn test_partition_zero_parts() {
        assert!(partition(RowRange::new(0, 10), 0).is_empty());
    }
}
