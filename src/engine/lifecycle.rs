//! Lifecycle states, snapshots and the run cancellation token

use crate::board::Grid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Engine lifecycle state
///
/// ```text
/// Idle -> Running <-> Paused
///         Running -> Stopped -> Running (continue)
///         Running/Paused -> Disconnected (visualization link dropped)
/// any -> Closed
/// ```
///
/// `Disconnected` is a view of a Running or Paused run whose visualization
/// link has been detached; the run itself keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Idle,
    Running,
    Paused,
    Stopped,
    Disconnected,
    Closed,
}

impl LifecycleState {
    /// A run exists and has not ended
    pub fn is_active(self) -> bool {
        matches!(self, LifecycleState::Running | LifecycleState::Paused)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Running => "running",
            LifecycleState::Paused => "paused",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Disconnected => "disconnected",
            LifecycleState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A fully merged turn and its board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub turn: u64,
    pub grid: Grid,
}

/// Live-cell count of a fully merged turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliveCount {
    pub turn: u64,
    pub alive: usize,
}

/// Cooperative stop signal for one run
///
/// Checked by the turn loop at the top of every iteration only; an in-flight
/// turn always completes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::Disconnected.to_string(), "disconnected");
        assert!(LifecycleState::Paused.is_active());
        assert!(!LifecycleState::Stopped.is_active());
    }
}
