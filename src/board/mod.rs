//! Toroidal Game of Life board
//!
//! This module holds the authoritative cell matrix and the update rule that every
//! execution path (single-process reference, local worker pool, remote workers)
//! shares. The board is a torus: neighbour lookups wrap modulo height and width,
//! so no edge is ever "missing".
//!
//! # Representation
//!
//! Cells are stored row-major in a single `Vec<bool>`. Image files use one byte
//! per cell where `255` means alive; see [`ALIVE_BYTE`] and [`Grid::from_bytes`].
//!
//! # Example
//!
//! ```
//! use golnet::board::{Cell, Grid};
//!
//! // Horizontal blinker on row 2 turns vertical on column 2
//! let grid = Grid::from_cells(5, 5, &[Cell::new(1, 2), Cell::new(2, 2), Cell::new(3, 2)]);
//! let next = grid.step();
//! assert_eq!(next.alive_count(), 3);
//! assert!(next.is_alive(1, 2));
//! assert!(next.is_alive(3, 2));
//! assert!(!next.is_alive(2, 1));
//! ```

use crate::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Byte value of a live cell in image files
pub const ALIVE_BYTE: u8 = 255;

/// Byte value of a dead cell in image files
pub const DEAD_BYTE: u8 = 0;

/// State of a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellState {
    Alive,
    Dead,
}

impl CellState {
    #[inline]
    pub fn is_alive(self) -> bool {
        self == CellState::Alive
    }
}

impl From<bool> for CellState {
    #[inline]
    fn from(alive: bool) -> Self {
        if alive {
            CellState::Alive
        } else {
            CellState::Dead
        }
    }
}

/// Coordinate of a cell: `x` is the column, `y` is the row
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

/// Conway's update rule
///
/// A live cell with 2 or 3 live neighbours survives, a dead cell with exactly
/// 3 live neighbours is born, every other cell is dead in the next generation.
#[inline]
pub fn next_state(cell: CellState, alive_neighbours: u8) -> CellState {
    match (cell, alive_neighbours) {
        (CellState::Alive, 2) | (CellState::Alive, 3) => CellState::Alive,
        (CellState::Dead, 3) => CellState::Alive,
        _ => CellState::Dead,
    }
}

/// Toroidal cell matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GridParts")]
pub struct Grid {
    height: usize,
    width: usize,
    cells: Vec<bool>,
}

/// Unchecked wire form of [`Grid`]
#[derive(Deserialize)]
struct GridParts {
    height: usize,
    width: usize,
    cells: Vec<bool>,
}

impl TryFrom<GridParts> for Grid {
    type Error = anyhow::Error;

    fn try_from(parts: GridParts) -> Result<Self> {
        Grid::from_vec(parts.height, parts.width, parts.cells)
    }
}

impl Grid {
    /// Create an all-dead grid
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            cells: vec![false; height * width],
        }
    }

    /// Build a grid from row-major cell states
    pub fn from_vec(height: usize, width: usize, cells: Vec<bool>) -> Result<Self> {
        if cells.len() != height * width {
            anyhow::bail!(
                "cell buffer has {} entries, expected {}x{} = {}",
                cells.len(),
                height,
                width,
                height * width
            );
        }
        Ok(Self { height, width, cells })
    }

    /// Build a grid with exactly the given cells alive
    ///
    /// Coordinates outside the grid wrap around.
    pub fn from_cells(height: usize, width: usize, alive: &[Cell]) -> Self {
        let mut grid = Self::new(height, width);
        if height == 0 || width == 0 {
            return grid;
        }
        for cell in alive {
            grid.set(cell.y % height, cell.x % width, true);
        }
        grid
    }

    /// Build a grid from image bytes (one byte per cell, `255` = alive)
    pub fn from_bytes(height: usize, width: usize, bytes: &[u8]) -> Result<Self> {
        let cells = bytes.iter().map(|&b| b == ALIVE_BYTE).collect();
        Self::from_vec(height, width, cells)
    }

    /// Random board where each cell is alive with probability `density`
    pub fn random<R: Rng>(height: usize, width: usize, density: f64, rng: &mut R) -> Self {
        let density = density.clamp(0.0, 1.0);
        let cells = (0..height * width).map(|_| rng.gen_bool(density)).collect();
        Self { height, width, cells }
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }

    #[inline]
    pub fn is_alive(&self, row: usize, col: usize) -> bool {
        self.cells[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, alive: bool) {
        self.cells[row * self.width + col] = alive;
    }

    /// One row as a slice
    #[inline]
    pub fn row(&self, row: usize) -> &[bool] {
        &self.cells[row * self.width..(row + 1) * self.width]
    }

    /// Rows `[start, end)` as one contiguous slice
    pub fn rows(&self, start: usize, end: usize) -> &[bool] {
        &self.cells[start * self.width..end * self.width]
    }

    /// Mutable rows `[start, end)`
    pub fn rows_mut(&mut self, start: usize, end: usize) -> &mut [bool] {
        &mut self.cells[start * self.width..end * self.width]
    }

    /// Row-major cell states
    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    /// Image bytes (one byte per cell)
    pub fn to_bytes(&self) -> Vec<u8> {
        self.cells
            .iter()
            .map(|&alive| if alive { ALIVE_BYTE } else { DEAD_BYTE })
            .collect()
    }

    /// Count live neighbours of `(row, col)` with toroidal wraparound
    pub fn alive_neighbours(&self, row: usize, col: usize) -> u8 {
        let mut count = 0u8;
        let (h, w) = (self.height as isize, self.width as isize);
        for dr in [-1isize, 0, 1] {
            for dc in [-1isize, 0, 1] {
                if dr == 0 && dc == 0 {
                    continue;
                }
                let r = (row as isize + dr).rem_euclid(h) as usize;
                let c = (col as isize + dc).rem_euclid(w) as usize;
                if self.is_alive(r, c) {
                    count += 1;
                }
            }
        }
        count
    }

    /// Next generation computed in-process
    ///
    /// This is the reference every distributed path must match bit for bit.
    pub fn step(&self) -> Grid {
        let mut next = Grid::new(self.height, self.width);
        for row in 0..self.height {
            for col in 0..self.width {
                let state = CellState::from(self.is_alive(row, col));
                let n = self.alive_neighbours(row, col);
                next.set(row, col, next_state(state, n).is_alive());
            }
        }
        next
    }

    /// Coordinates of every live cell, in row-major order
    pub fn alive_cells(&self) -> Vec<Cell> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &alive)| alive)
            .map(|(i, _)| Cell::new(i % self.width, i / self.width))
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|&&alive| alive).count()
    }
}
