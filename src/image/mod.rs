//! Board image storage
//!
//! Boards are loaded from and saved to single-channel images where a byte of
//! [`ALIVE_BYTE`](crate::board::ALIVE_BYTE) is a live cell. Input images are
//! named `<height>x<width>`, snapshots `<height>x<width>x<turn>`.

pub mod pgm;

pub use pgm::PgmStore;

use crate::board::Grid;
use crate::Result;

/// Load and save boards
pub trait ImageStore: Send + Sync {
    /// Load the input board of the given size
    fn load(&self, height: usize, width: usize) -> Result<Grid>;

    /// Save `grid` as the snapshot of `turn`, returning the image name
    fn save(&self, grid: &Grid, turn: u64) -> Result<String>;
}

/// Name of the input image for a board size
pub fn input_name(height: usize, width: usize) -> String {
    format!("{}x{}", height, width)
}

/// Name of a snapshot image
pub fn snapshot_name(height: usize, width: usize, turn: u64) -> String {
    format!("{}x{}x{}", height, width, turn)
}
