//! Grid data model
//!
//! A `Grid` is a fixed-size, row-major matrix of two-valued cells. Grids are never
//! mutated once a turn has committed them: every turn builds a fresh grid and the
//! previous one is shared read-only (`Arc<Grid>`) with whoever still needs it.
//!
//! # Wire format
//!
//! Cells serialize as booleans (`true` = alive) so a grid travels over the
//! MessagePack protocol as `{ width, height, cells: [bool] }`. Deserialization
//! rejects grids whose cell count does not match `width * height`.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Byte value used for a live cell in PGM images
pub const ALIVE_BYTE: u8 = 255;

/// Byte value used for a dead cell in PGM images
pub const DEAD_BYTE: u8 = 0;

/// State of a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cell {
    #[default]
    Dead,
    Alive,
}

impl Cell {
    pub fn is_alive(self) -> bool {
        self == Cell::Alive
    }

    /// Decode an image byte. Any non-zero byte counts as alive.
    pub fn from_byte(byte: u8) -> Self {
        if byte == DEAD_BYTE {
            Cell::Dead
        } else {
            Cell::Alive
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Cell::Alive => ALIVE_BYTE,
            Cell::Dead => DEAD_BYTE,
        }
    }
}

impl From<bool> for Cell {
    fn from(alive: bool) -> Self {
        if alive {
            Cell::Alive
        } else {
            Cell::Dead
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(self.is_alive())
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bool::deserialize(deserializer).map(Cell::from)
    }
}

/// Cell coordinate (x = column, y = row)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: usize,
    pub y: usize,
}

impl CellCoord {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Errors raised while building a grid
#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("grid dimensions must be non-zero (got {width}x{height})")]
    EmptyDimensions { width: usize, height: usize },

    #[error("grid {width}x{height} has more cells than fit in memory")]
    TooLarge { width: usize, height: usize },

    #[error("grid {width}x{height} needs {expected} cells, got {actual}")]
    CellCount {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("density must be between 0.0 and 1.0, got {0}")]
    Density(f64),
}

/// Game of Life grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GridParts")]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

/// Unvalidated grid as it arrives off the wire
#[derive(Deserialize)]
struct GridParts {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl TryFrom<GridParts> for Grid {
    type Error = GridError;

    fn try_from(parts: GridParts) -> Result<Self, Self::Error> {
        Grid::from_cells(parts.width, parts.height, parts.cells)
    }
}

/// Number of cells in a `width` x `height` grid
pub fn cell_count(width: usize, height: usize) -> Result<usize, GridError> {
    if width == 0 || height == 0 {
        return Err(GridError::EmptyDimensions { width, height });
    }
    width
        .checked_mul(height)
        .ok_or(GridError::TooLarge { width, height })
}

impl Grid {
    /// Create an all-dead grid
    pub fn new(width: usize, height: usize) -> Result<Self, GridError> {
        let count = cell_count(width, height)?;
        Self::from_cells(width, height, vec![Cell::Dead; count])
    }

    /// Build a grid from row-major cells
    pub fn from_cells(width: usize, height: usize, cells: Vec<Cell>) -> Result<Self, GridError> {
        let expected = cell_count(width, height)?;
        if cells.len() != expected {
            return Err(GridError::CellCount {
                width,
                height,
                expected,
                actual: cells.len(),
            });
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Build a grid from image bytes (255 alive, 0 dead)
    pub fn from_bytes(width: usize, height: usize, bytes: &[u8]) -> Result<Self, GridError> {
        let cells = bytes.iter().map(|&b| Cell::from_byte(b)).collect();
        Self::from_cells(width, height, cells)
    }

    /// Build an all-dead grid with the given cells set alive
    ///
    /// Coordinates outside the grid wrap around.
    pub fn with_alive(width: usize, height: usize, alive: &[CellCoord]) -> Result<Self, GridError> {
        let mut cells = vec![Cell::Dead; cell_count(width, height)?];
        for coord in alive {
            cells[(coord.y % height) * width + coord.x % width] = Cell::Alive;
        }
        Self::from_cells(width, height, cells)
    }

    /// Random grid where each cell is alive with probability `density`
    pub fn random(width: usize, height: usize, density: f64, seed: u64) -> Result<Self, GridError> {
        if !(0.0..=1.0).contains(&density) {
            return Err(GridError::Density(density));
        }
        let count = cell_count(width, height)?;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let cells = (0..count)
            .map(|_| Cell::from(rng.gen_bool(density)))
            .collect();
        Self::from_cells(width, height, cells)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Cell at (x, y). Panics if out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Cell {
        self.cells[y * self.width + x]
    }

    /// All cells, row-major
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Cells of rows `start..end`
    pub fn rows(&self, start: usize, end: usize) -> &[Cell] {
        &self.cells[start * self.width..end * self.width]
    }

    /// Cells of a single row
    pub fn row(&self, y: usize) -> &[Cell] {
        self.rows(y, y + 1)
    }

    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    /// Image bytes (255 alive, 0 dead), row-major
    pub fn to_bytes(&self) -> Vec<u8> {
        self.cells.iter().map(|c| c.to_byte()).collect()
    }

    /// Number of live cells (full linear scan)
    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_alive()).count()
    }

    /// Coordinates of all live cells in row-major order
    pub fn alive_cells(&self) -> Vec<CellCoord> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_alive())
            .map(|(i, _)| CellCoord::new(i % self.width, i / self.width))
            .collect()
    }

    /// Cells whose value differs between `self` and `next`, row-major
    ///
    /// Both grids must have the same dimensions.
    pub fn diff(&self, next: &Grid) -> Vec<CellCoord> {
        debug_assert_eq!((self.width, self.height), (next.width, next.height));
        self.cells
            .iter()
            .zip(next.cells.iter())
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, _)| CellCoord::new(i % self.width, i / self.width))
            .collect()
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..self.height {
            for cell in self.row(y) {
                f.write_str(if cell.is_alive() { "#" } else { "." })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
