//! Row partitioning
//!
//! A grid of height H is split into N contiguous row ranges. The first `H mod N`
//! ranges receive one extra row, so sizes never differ by more than one and the
//! layout is the same for a given (H, N) on every turn and every host.

use crate::grid::{Cell, Grid};
use serde::{Deserialize, Serialize};

/// Half-open row range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Clamp a requested worker count to `1..=height`
pub fn clamp_workers(requested: usize, height: usize) -> usize {
    requested.clamp(1, height.max(1))
}

/// Split rows `0..height` into `clamp_workers(workers, height)` ranges
pub fn partition_rows(height: usize, workers: usize) -> Vec<RowRange> {
    if height == 0 {
        return Vec::new();
    }
    let n = clamp_workers(workers, height);
    let base = height / n;
    let extra = height % n;

    let mut ranges = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let len = base + usize::from(i < extra);
        ranges.push(RowRange::new(start, start + len));
        start += len;
    }
    ranges
}

/// Rows of one partition plus a wraparound halo row on each side
///
/// `cells` holds `range.len() + 2` rows: the row above `range.start` (wrapping to
/// the last grid row), the partition rows, then the row after `range.end - 1`
/// (wrapping to row 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub width: usize,
    pub range: RowRange,
    pub cells: Vec<Cell>,
}

impl Segment {
    /// Number of non-halo rows
    pub fn rows(&self) -> usize {
        self.range.len()
    }

    /// Cell at column `x` of segment row `row` (0 is the top halo)
    #[inline]
    pub fn get(&self, x: usize, row: usize) -> Cell {
        self.cells[row * self.width + x]
    }
}

/// Build the halo segment for `range` out of `grid`
pub fn halo_segment(grid: &Grid, range: RowRange) -> Segment {
    let height = grid.height();
    let above = (range.start + height - 1) % height;
    let below = range.end % height;

    let mut cells = Vec::with_capacity((range.len() + 2) * grid.width());
    cells.extend_from_slice(grid.row(above));
    cells.extend_from_slice(grid.rows(range.start, range.end));
    cells.extend_from_slice(grid.row(below));

    Segment {
        width: grid.width(),
        range,
        cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellCoord;

    #[test]
    fn test_partition_covers_rows() {
        for height in 1..=40 {
            for workers in 1..=height {
                let ranges = partition_rows(height, workers);
                assert_eq!(ranges.len(), workers);
                assert_eq!(ranges[0].start, 0);
                assert_eq!(ranges[ranges.len() - 1].end, height);
                for pair in ranges.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start);
                }
                let min = ranges.iter().map(RowRange::len).min().unwrap();
                let max = ranges.iter().map(RowRange::len).max().unwrap();
                assert!(min >= 1);
                assert!(max - min <= 1);
            }
        }
    }

    #[test]
    fn test_remainder_goes_first() {
        let ranges = partition_rows(10, 4);
        let lens: Vec<usize> = ranges.iter().map(RowRange::len).collect();
        assert_eq!(lens, vec![3, 3, 2, 2]);
    }

    #[test]
    fn test_clamp_workers() {
        assert_eq!(clamp_workers(0, 16), 1);
        assert_eq!(clamp_workers(32, 16), 16);
        assert_eq!(clamp_workers(4, 16), 4);
        assert_eq!(partition_rows(3, 8).len(), 3);
    }

    #[test]
    fn test_halo_segment_wraps() {
        let alive = [CellCoord::new(0, 0), CellCoord::new(1, 3)];
        let grid = Grid::with_alive(2, 4, &alive).unwrap();

        let first = halo_segment(&grid, RowRange::new(0, 2));
        assert_eq!(first.cells.len(), 4 * 2);
        // top halo is row 3
        assert_eq!(first.get(1, 0), Cell::Alive);
        assert_eq!(first.get(0, 1), Cell::Alive);

        let last = halo_segment(&grid, RowRange::new(2, 4));
        // bottom halo is row 0
        assert_eq!(last.get(0, 3), Cell::Alive);
        assert_eq!(last.get(1, 2), Cell::Alive);
    }
}
