//! Row-band partitioning and halo exchange
//!
//! The engine splits the board into contiguous row bands, one per registered
//! worker. A band cannot see the rows just outside its range, so each band
//! travels with two halo rows taken from the pre-turn board:
//!
//! ```text
//!   row start-1 (wrapped)  -> halo_above
//!   rows [start, end)      -> band
//!   row end (wrapped)      -> halo_below
//! ```
//!
//! # Band sizing
//!
//! With `n` bands over `height` rows, bands `0..n-1` get `height / n` rows and
//! the last band also takes the remainder `height % n`. The same policy is used
//! when a worker subdivides its band across local threads ([`subdivide`]).

use crate::board::Grid;
use crate::error::EngineError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Contiguous rows of the board
///
/// `start_row` is the band's first row in board coordinates, so cells reported
/// from a band are global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub start_row: usize,
    pub width: usize,
    pub cells: Vec<bool>,
}

impl Band {
    pub fn new(start_row: usize, width: usize, cells: Vec<bool>) -> Self {
        Self { start_row, width, cells }
    }

    /// Number of rows in this band
    pub fn rows(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.cells.len() / self.width
        }
    }

    /// One past the last row, in board coordinates
    pub fn end_row(&self) -> usize {
        self.start_row + self.rows()
    }

    /// Local row `r` as a slice
    pub fn row(&self, r: usize) -> &[bool] {
        &self.cells[r * self.width..(r + 1) * self.width]
    }
}

/// A band plus the halo rows needed to compute its next state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandTask {
    pub band: Band,
    pub halo_above: Vec<bool>,
    pub halo_below: Vec<bool>,
}

/// Row ranges for `n` bands over `total` rows
///
/// Bands `0..n-1` get `total / n` rows; the last band absorbs the remainder.
/// Returns an empty list when `n == 0`.
pub fn band_ranges(total: usize, n: usize) -> Vec<Range<usize>> {
    if n == 0 {
        return Vec::new();
    }
    let div = total / n;
    let rem = total % n;
    (0..n)
        .map(|i| {
            let start = i * div;
            let end = if i == n - 1 { (i + 1) * div + rem } else { (i + 1) * div };
            start..end
        })
        .collect()
}

/// Split `grid` into `n` band tasks with wrapped halos
///
/// Fails with [`EngineError::NoWorkers`] when `n == 0`.
pub fn partition(grid: &Grid, n: usize) -> Result<Vec<BandTask>> {
    if n == 0 {
        return Err(EngineError::NoWorkers.into());
    }
    if grid.is_empty() {
        return Err(EngineError::InvalidBoard("board has no cells".to_string()).into());
    }

    let height = grid.height();
    let tasks = band_ranges(height, n)
        .into_iter()
        .map(|range| {
            let above = (range.start + height - 1) % height;
            let below = range.end % height;
            BandTask {
                band: Band::new(range.start, grid.width(), grid.rows(range.start, range.end).to_vec()),
                halo_above: grid.row(above).to_vec(),
                halo_below: grid.row(below).to_vec(),
            }
        })
        .collect();

    Ok(tasks)
}

/// Write bands back into a `height x width` board, in band order
///
/// Bands must be contiguous, start at row 0, match `width` and cover every row
/// exactly once.
pub fn reassemble(height: usize, width: usize, bands: Vec<Band>) -> Result<Grid> {
    let mut grid = Grid::new(height, width);
    let mut next_row = 0;

    for (i, band) in bands.into_iter().enumerate() {
        if band.width != width {
            return Err(EngineError::InvalidBoard(format!(
                "band {} has width {}, board width is {}",
                i, band.width, width
            ))
            .into());
        }
        if band.start_row != next_row {
            return Err(EngineError::InvalidBoard(format!(
                "band {} starts at row {}, expected row {}",
                i, band.start_row, next_row
            ))
            .into());
        }
        if band.cells.len() % width.max(1) != 0 || band.end_row() > height {
            return Err(EngineError::InvalidBoard(format!(
                "band {} does not fit rows {}..{}",
                i,
                band.start_row,
                band.end_row()
            ))
            .into());
        }

        let end = band.end_row();
        grid.rows_mut(band.start_row, end).copy_from_slice(&band.cells);
        next_row = end;
    }

    if next_row != height {
        return Err(EngineError::InvalidBoard(format!(
            "bands cover {} of {} rows",
            next_row, height
        ))
        .into());
    }

    Ok(grid)
}

/// Split one band task into `k` smaller tasks
///
/// Inner halos come from the band itself; the outermost sub-tasks keep the
/// original halos. `k == 0` is treated as one sub-task.
pub fn subdivide(task: &BandTask, k: usize) -> Vec<BandTask> {
    let band = &task.band;
    let rows = band.rows();

    band_ranges(rows, k.max(1))
        .into_iter()
        .map(|range| {
            let halo_above = if range.start == 0 {
                task.halo_above.clone()
            } else {
                band.row(range.start - 1).to_vec()
            };
            let halo_below = if range.end == rows {
                task.halo_below.clone()
            } else {
                band.row(range.end).to_vec()
            };
            BandTask {
                band: Band::new(
                    band.start_row + range.start,
                    band.width,
                    band.cells[range.start * band.width..range.end * band.width].to_vec(),
                ),
                halo_above,
                halo_below,
            }
        })
        .collect()
}
