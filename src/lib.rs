//! golnet - Distributed Game of Life
//!
//! golnet runs Conway's Game of Life on a toroidal board, splitting every
//! generation into row bands that are computed in parallel by a pool of
//! workers and merged back in band order before the next turn starts.
//!
//! # Architecture
//!
//! - **Engine**: owns the board, drives the turn loop, exposes a lifecycle
//!   (start, pause, stop, continue, disconnect, close)
//! - **Workers**: compute one band per call, locally or over TCP
//! - **Controller**: loads the board, relays keypresses, samples the live-cell
//!   count and writes the final image
//! - **Events**: ordered per-turn flips for visualization
//! - **Distributed mode**: engine, workers and controller as separate processes

pub mod board;
pub mod config;
pub mod controller;
pub mod distributed;
pub mod engine;
pub mod error;
pub mod events;
pub mod image;
pub mod output;
pub mod partition;
pub mod stats;
pub mod util;
pub mod worker;

// Re-export commonly used types
pub use board::{Cell, Grid};
pub use config::Config;
pub use engine::{Engine, LifecycleState, Snapshot};
pub use error::EngineError;

/// Result type used throughout golnet
pub type Result<T> = anyhow::Result<T>;
