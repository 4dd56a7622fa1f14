//! Game of Life kernel
//!
//! Two entry points compute the same rule over different inputs:
//!
//! - `step_rows` reads neighbours from the full grid. Remote workers receive the
//!   whole grid with every request, so this is the form they run.
//! - `step_segment` reads vertical neighbours from the halo rows of a `Segment`.
//!   Local workers only ever see their own rows plus two halo rows.
//!
//! Both report flipped cells in partition-local coordinates; the coordinator adds
//! the partition's start row before reporting them.

use super::partition::{RowRange, Segment};
use crate::grid::{Cell, CellCoord, Grid, GridError};
use rayon::prelude::*;

/// Result of stepping one partition
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KernelOutput {
    /// Next-turn cells of the partition rows, row-major
    pub cells: Vec<Cell>,
    /// Changed cells, y relative to the partition start
    pub flipped: Vec<CellCoord>,
}

/// Transition rule
#[inline]
pub fn next_state(cell: Cell, alive_neighbours: usize) -> Cell {
    match (cell, alive_neighbours) {
        (Cell::Alive, 2) | (Cell::Alive, 3) => Cell::Alive,
        (Cell::Dead, 3) => Cell::Alive,
        _ => Cell::Dead,
    }
}

/// Live cells among the eight toroidal neighbours of (x, y)
pub fn alive_neighbours(grid: &Grid, x: usize, y: usize) -> usize {
    let (w, h) = (grid.width(), grid.height());
    let mut count = 0;
    for (i, dy) in [h - 1, 0, 1].into_iter().enumerate() {
        for (j, dx) in [w - 1, 0, 1].into_iter().enumerate() {
            if i == 1 && j == 1 {
                continue;
            }
            if grid.get((x + dx) % w, (y + dy) % h).is_alive() {
                count += 1;
            }
        }
    }
    count
}

/// Same count over a segment row, `row` being a non-halo row index
fn segment_neighbours(segment: &Segment, x: usize, row: usize) -> usize {
    let w = segment.width;
    let mut count = 0;
    for r in [row - 1, row, row + 1] {
        for (j, dx) in [w - 1, 0, 1].into_iter().enumerate() {
            if j == 1 && r == row {
                continue;
            }
            if segment.get((x + dx) % w, r).is_alive() {
                count += 1;
            }
        }
    }
    count
}

fn collect_rows<F>(width: usize, rows: usize, compute_row: F) -> KernelOutput
where
    F: Fn(usize) -> (Vec<Cell>, Vec<CellCoord>) + Sync + Send,
{
    let per_row: Vec<(Vec<Cell>, Vec<CellCoord>)> =
        (0..rows).into_par_iter().map(compute_row).collect();

    let mut output = KernelOutput {
        cells: Vec::with_capacity(width * rows),
        flipped: Vec::new(),
    };
    for (cells, flipped) in per_row {
        output.cells.extend(cells);
        output.flipped.extend(flipped);
    }
    output
}

/// Step the rows of `range` using the full grid for neighbour lookup
pub fn step_rows(grid: &Grid, range: RowRange) -> KernelOutput {
    let width = grid.width();
    collect_rows(width, range.len(), |local_y| {
        let y = range.start + local_y;
        let mut cells = Vec::with_capacity(width);
        let mut flipped = Vec::new();
        for x in 0..width {
            let current = grid.get(x, y);
            let next = next_state(current, alive_neighbours(grid, x, y));
            if next != current {
                flipped.push(CellCoord::new(x, local_y));
            }
            cells.push(next);
        }
        (cells, flipped)
    })
}

/// Step the non-halo rows of a segment
pub fn step_segment(segment: &Segment) -> KernelOutput {
    let width = segment.width;
    let mut output = KernelOutput {
        cells: Vec::with_capacity(width * segment.rows()),
        flipped: Vec::new(),
    };
    for local_y in 0..segment.rows() {
        let row = local_y + 1;
        for x in 0..width {
            let current = segment.get(x, row);
            let next = next_state(current, segment_neighbours(segment, x, row));
            if next != current {
                output.flipped.push(CellCoord::new(x, local_y));
            }
            output.cells.push(next);
        }
    }
    output
}

/// Whole grid as a single partition
pub fn step_grid(grid: &Grid) -> Result<Grid, GridError> {
    let output = step_rows(grid, RowRange::new(0, grid.height()));
    Grid::from_cells(grid.width(), grid.height(), output.cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::partition::halo_segment;

    fn coords(list: &[(usize, usize)]) -> Vec<CellCoord> {
        list.iter().map(|&(x, y)| CellCoord::new(x, y)).collect()
    }

    /// Neighbour count on an explicitly padded copy, no modular arithmetic
    fn padded_count(grid: &Grid, x: usize, y: usize) -> usize {
        let (w, h) = (grid.width(), grid.height());
        let mut padded = vec![vec![false; w + 2]; h + 2];
        for (py, row) in padded.iter_mut().enumerate() {
            let gy = match py {
                0 => h - 1,
                p if p == h + 1 => 0,
                p => p - 1,
            };
            for (px, cell) in row.iter_mut().enumerate() {
                let gx = match px {
                    0 => w - 1,
                    p if p == w + 1 => 0,
                    p => p - 1,
                };
                *cell = grid.get(gx, gy).is_alive();
            }
        }
        let mut count = 0;
        for py in y..=y + 2 {
            for px in x..=x + 2 {
                if (px, py) != (x + 1, y + 1) && padded[py][px] {
                    count += 1;
                }
            }
        }
        count
    }

    #[test]
    fn test_transition_table() {
        assert_eq!(next_state(Cell::Alive, 1), Cell::Dead);
        assert_eq!(next_state(Cell::Alive, 2), Cell::Alive);
        assert_eq!(next_state(Cell::Alive, 3), Cell::Alive);
        assert_eq!(next_state(Cell::Alive, 4), Cell::Dead);
        assert_eq!(next_state(Cell::Dead, 3), Cell::Alive);
        for n in [0, 1, 2, 4, 5, 6, 7, 8] {
            assert_eq!(next_state(Cell::Dead, n), Cell::Dead);
        }
    }

    #[test]
    fn test_wraparound_matches_padded_copy() {
        let grid = Grid::random(7, 5, 0.45, 99).unwrap();
        for y in 0..grid.height() {
            for x in 0..grid.width() {
                assert_eq!(
                    alive_neighbours(&grid, x, y),
                    padded_count(&grid, x, y),
                    "mismatch at ({}, {})",
                    x,
                    y
                );
            }
        }
    }

    #[test]
    fn test_blinker_oscillates() {
        let horizontal = Grid::with_alive(5, 5, &coords(&[(1, 2), (2, 2), (3, 2)])).unwrap();
        let vertical = step_grid(&horizontal).unwrap();
        assert_eq!(vertical.alive_cells(), coords(&[(2, 1), (2, 2), (2, 3)]));
        assert_eq!(step_grid(&vertical).unwrap(), horizontal);
    }

    #[test]
    fn test_three_by_three_torus_fills() {
        // every cell of a 3x3 torus neighbours all eight others
        let horizontal = Grid::with_alive(3, 3, &coords(&[(0, 1), (1, 1), (2, 1)])).unwrap();
        assert_eq!(step_grid(&horizontal).unwrap().alive_count(), 9);
    }

    #[test]
    fn test_single_cell_dies() {
        let grid = Grid::with_alive(8, 8, &coords(&[(4, 4)])).unwrap();
        assert_eq!(step_grid(&grid).unwrap().alive_count(), 0);
    }

    #[test]
    fn test_dead_grid_stays_dead() {
        let mut grid = Grid::new(6, 4).unwrap();
        for _ in 0..5 {
            grid = step_grid(&grid).unwrap();
        }
        assert_eq!(grid.alive_count(), 0);
    }

    #[test]
    fn test_flipped_are_local() {
        let grid = Grid::with_alive(5, 6, &coords(&[(1, 3), (2, 3), (3, 3)])).unwrap();
        let out = step_rows(&grid, RowRange::new(2, 5));
        assert_eq!(out.cells.len(), 5 * 3);
        // global (1,3),(3,3) die, (2,2),(2,4) are born
        assert_eq!(out.flipped, coords(&[(2, 0), (1, 1), (3, 1), (2, 2)]));
    }

    #[test]
    fn test_segment_matches_full_grid() {
        let grid = Grid::random(9, 11, 0.35, 3).unwrap();
        for range in [RowRange::new(0, 4), RowRange::new(4, 8), RowRange::new(8, 11)] {
            let full = step_rows(&grid, range);
            let halo = step_segment(&halo_segment(&grid, range));
            assert_eq!(full, halo);
        }
    }
}
