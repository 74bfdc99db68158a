//! Visualization events
//!
//! The engine emits an ordered stream of events to an optional sink while a run
//! is attached: per-turn cell flips followed by a turn-complete marker. The
//! session controller adds periodic alive-cell samples and the final
//! notifications. Events for turn `t` are only emitted after turn `t` has been
//! merged, and always in increasing turn order.

use crate::board::Cell;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Operator-visible session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Executing,
    Paused,
    Quitting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Executing => write!(f, "Executing"),
            SessionState::Paused => write!(f, "Paused"),
            SessionState::Quitting => write!(f, "Quitting"),
        }
    }
}

/// One entry of the visualization stream
///
/// `turn` is always the number of completed turns the event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A cell changed state between `turn - 1` and `turn`
    CellFlipped { turn: u64, cell: Cell },

    /// Every flip for `turn` has been sent
    TurnComplete { turn: u64 },

    /// Periodic live-cell sample
    AliveCellsCount { turn: u64, count: usize },

    /// The run ended; `alive` lists the live cells of the final board
    FinalTurnComplete { turn: u64, alive: Vec<Cell> },

    /// A snapshot image was written
    ImageOutputComplete { turn: u64, filename: String },

    StateChange { turn: u64, state: SessionState },
}

impl Event {
    pub fn turn(&self) -> u64 {
        match self {
            Event::CellFlipped { turn, .. }
            | Event::TurnComplete { turn }
            | Event::AliveCellsCount { turn, .. }
            | Event::FinalTurnComplete { turn, .. }
            | Event::ImageOutputComplete { turn, .. }
            | Event::StateChange { turn, .. } => *turn,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::CellFlipped { turn, cell } => {
                write!(f, "Turn {}: cell ({}, {}) flipped", turn, cell.x, cell.y)
            }
            Event::TurnComplete { turn } => write!(f, "Turn {} complete", turn),
            Event::AliveCellsCount { turn, count } => {
                write!(f, "Turn {}: {} alive cells", turn, count)
            }
            Event::FinalTurnComplete { turn, alive } => {
                write!(f, "Final turn {} complete: {} alive cells", turn, alive.len())
            }
            Event::ImageOutputComplete { turn, filename } => {
                write!(f, "Turn {}: wrote {}", turn, filename)
            }
            Event::StateChange { turn, state } => write!(f, "Turn {}: {}", turn, state),
        }
    }
}

/// Receiver of engine events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one turn's worth of events, in order
    async fn send(&self, events: Vec<Event>) -> Result<()>;
}

/// Sink that forwards into an in-process channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&self, events: Vec<Event>) -> Result<()> {
        for event in events {
            self.tx
                .send(event)
                .map_err(|_| anyhow::anyhow!("event receiver dropped"))?;
        }
        Ok(())
    }
}

/// Cells whose state differs between two sorted live-cell lists
///
/// Both inputs must be sorted; the result is sorted.
pub fn flipped_cells(before: &[Cell], after: &[Cell]) -> Vec<Cell> {
    let mut flipped = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < before.len() && j < after.len() {
        match before[i].cmp(&after[j]) {
            std::cmp::Ordering::Less => {
                flipped.push(before[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                flipped.push(after[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }
    flipped.extend_from_slice(&before[i..]);
    flipped.extend_from_slice(&after[j..]);
    flipped
}
