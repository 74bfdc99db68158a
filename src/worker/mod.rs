//! Band compute workers
//!
//! A worker is a stateless compute unit: it receives one band of the board plus
//! its two halo rows and returns the band's next generation. The engine only
//! ever talks to workers through the [`WorkerContract`] trait, so the turn loop
//! does not know whether a band is computed in-process or on another host.
//!
//! # Implementations
//!
//! - [`local::LocalWorker`]: computes in this process on a rayon pool, splitting
//!   the band into sub-bands (one per thread)
//! - [`crate::distributed::RemoteWorker`]: forwards calls over TCP to a
//!   [`crate::distributed::WorkerService`], which wraps a `LocalWorker`
//!
//! Both produce results bit-identical to [`crate::board::Grid::step`].

pub mod local;

use crate::board::{next_state, Cell};
use crate::partition::{subdivide, Band, BandTask};
use crate::Result;
use async_trait::async_trait;
use rayon::prelude::*;

pub use local::LocalWorker;

/// Operations the engine can invoke on a worker
///
/// Implementations keep no state between calls and never call back into the
/// engine.
#[async_trait]
pub trait WorkerContract: Send + Sync {
    /// Identity used in logs and errors (address for remote workers)
    fn id(&self) -> &str;

    /// Next generation of `task.band`
    async fn compute_next_band(&self, task: BandTask) -> Result<Band>;

    /// Live cells of `band`, in board coordinates
    async fn count_alive_cells(&self, band: Band) -> Result<Vec<Cell>>;

    /// Terminate the worker once in-flight calls complete
    ///
    /// Calling this more than once is harmless.
    async fn shutdown(&self) -> Result<()>;
}

/// Apply the update rule to every cell of a band
///
/// Edge rows read their outside neighbours from the halos; columns wrap.
pub fn compute_band(task: &BandTask) -> Result<Band> {
    let band = &task.band;
    let width = band.width;
    let rows = band.rows();

    if rows == 0 {
        return Ok(Band::new(band.start_row, width, Vec::new()));
    }
    if task.halo_above.len() != width || task.halo_below.len() != width {
        anyhow::bail!(
            "halo width mismatch: band width {}, halos {}/{}",
            width,
            task.halo_above.len(),
            task.halo_below.len()
        );
    }

    let mut next = vec![false; rows * width];
    for r in 0..rows {
        let above = if r == 0 { &task.halo_above[..] } else { band.row(r - 1) };
        let below = if r + 1 == rows { &task.halo_below[..] } else { band.row(r + 1) };
        let here = band.row(r);

        for c in 0..width {
            let left = (c + width - 1) % width;
            let right = (c + 1) % width;
            let neighbours = [
                above[left], above[c], above[right],
                here[left], here[right],
                below[left], below[c], below[right],
            ]
            .iter()
            .filter(|&&alive| alive)
            .count() as u8;

            next[r * width + c] = next_state(here[c].into(), neighbours).is_alive();
        }
    }

    Ok(Band::new(band.start_row, width, next))
}

/// Compute a band split across `threads` sub-bands
///
/// Runs on the current rayon pool. The split is invisible in the result.
pub fn compute_band_parallel(task: &BandTask, threads: usize) -> Result<Band> {
    if threads <= 1 {
        return compute_band(task);
    }

    let parts = subdivide(task, threads)
        .par_iter()
        .map(compute_band)
        .collect::<Result<Vec<Band>>>()?;

    let mut cells = Vec::with_capacity(task.band.cells.len());
    for part in parts {
        cells.extend_from_slice(&part.cells);
    }
    Ok(Band::new(task.band.start_row, task.band.width, cells))
}

/// Live cells of a band, in board coordinates
pub fn alive_cells_in(band: &Band) -> Vec<Cell> {
    if band.width == 0 {
        return Vec::new();
    }
    band.cells
        .iter()
        .enumerate()
        .filter(|(_, &alive)| alive)
        .map(|(i, _)| Cell::new(i % band.width, band.start_row + i / band.width))
        .collect()
}
