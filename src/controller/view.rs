//! Controller-side view of the event stream
//!
//! [`BoardView`] rebuilds the live board from `CellFlipped` events, which is
//! what a visualizer draws. [`report_events`] drains the controller's event
//! channel, keeps the view current and prints what the operator should see.

use crate::board::{Cell, Grid};
use crate::events::{Event, SessionState};
use std::collections::BTreeSet;
use tokio::sync::mpsc;

/// Live-cell set rebuilt from flips
#[derive(Debug, Clone)]
pub struct BoardView {
    height: usize,
    width: usize,
    alive: BTreeSet<Cell>,
    completed_turn: u64,
}

impl BoardView {
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            alive: BTreeSet::new(),
            completed_turn: 0,
        }
    }

    /// Apply one event; only flips and turn markers affect the view
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::CellFlipped { cell, .. } => {
                if !self.alive.remove(cell) {
                    self.alive.insert(*cell);
                }
            }
            Event::TurnComplete { turn } => self.completed_turn = *turn,
            _ => {}
        }
    }

    /// Last turn whose flips have all been applied
    pub fn completed_turn(&self) -> u64 {
        self.completed_turn
    }

    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    pub fn grid(&self) -> Grid {
        let alive: Vec<Cell> = self.alive.iter().copied().collect();
        Grid::from_cells(self.height, self.width, &alive)
    }
}

/// Drain `events` until the session's `Quitting` state change or until every
/// sender is gone
///
/// Flips and turn markers are printed only with `print_all`; everything else
/// is always printed.
pub async fn report_events(
    mut events: mpsc::UnboundedReceiver<Event>,
    mut view: BoardView,
    print_all: bool,
) -> BoardView {
    while let Some(event) = events.recv().await {
        view.apply(&event);
        let routine = matches!(event, Event::CellFlipped { .. } | Event::TurnComplete { .. });
        if print_all || !routine {
            println!("{}", event);
        }
        if matches!(event, Event::StateChange { state: SessionState::Quitting, .. }) {
            break;
        }
    }
    view
}
