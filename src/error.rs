//! Engine error taxonomy
//!
//! Fallible APIs return `anyhow::Result`; these variants sit inside the
//! `anyhow::Error` wherever a caller needs to tell failures apart
//! (`err.downcast_ref::<EngineError>()`). They also travel over the wire as
//! [`ErrorKind`] so a remote client can rebuild them.

use crate::engine::LifecycleState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// `start` or `continue` with an empty worker registry
    #[error("no workers available")]
    NoWorkers,

    /// Operation not allowed in the current lifecycle state
    #[error("cannot {op} while {state}")]
    InvalidState {
        op: String,
        state: LifecycleState,
    },

    /// Registration attempted while a run is in progress
    #[error("worker registry is locked while a run is in progress")]
    RegistryLocked,

    /// The engine has been closed
    #[error("engine is closed")]
    Closed,

    #[error("invalid board: {0}")]
    InvalidBoard(String),

    /// A worker call failed; fatal to the run
    #[error("worker {worker} failed: {message}")]
    Worker {
        worker: String,
        message: String,
    },

    #[error("protocol version mismatch: local={local}, remote={remote}")]
    ProtocolMismatch {
        local: u32,
        remote: u32,
    },

    /// Error reported by a remote peer that has no typed counterpart
    #[error("{0}")]
    Remote(String),
}

impl EngineError {
    pub fn invalid_state(op: impl Into<String>, state: LifecycleState) -> Self {
        Self::InvalidState {
            op: op.into(),
            state,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoWorkers => ErrorKind::NoWorkers,
            Self::InvalidState { state, .. } => ErrorKind::InvalidState(*state),
            Self::RegistryLocked => ErrorKind::RegistryLocked,
            Self::Closed => ErrorKind::Closed,
            Self::InvalidBoard(_) => ErrorKind::InvalidBoard,
            Self::Worker { .. } => ErrorKind::Worker,
            Self::ProtocolMismatch { .. } => ErrorKind::ProtocolMismatch,
            Self::Remote(_) => ErrorKind::Other,
        }
    }
}

/// Wire-level error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NoWorkers,
    InvalidState(LifecycleState),
    RegistryLocked,
    Closed,
    InvalidBoard,
    Worker,
    ProtocolMismatch,
    Other,
}

/// Classify an arbitrary error for transmission
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    err.downcast_ref::<EngineError>()
        .map(EngineError::kind)
        .unwrap_or(ErrorKind::Other)
}
