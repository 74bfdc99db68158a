//! End-of-session reporting
//!
//! A [`RunReport`] is built once the controller returns and is printed to the
//! console ([`text`]) and optionally written as JSON ([`json`]).

pub mod json;
pub mod text;

use crate::controller::SessionEnd;
use crate::stats::TurnSummary;
use crate::util::time::{cell_update_rate, format_duration};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Duration with both microseconds and human-readable format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonDuration {
    pub micros: u64,
    pub human: String,
}

impl JsonDuration {
    pub fn from_duration(d: Duration) -> Self {
        Self {
            micros: d.as_micros() as u64,
            human: format_duration(d),
        }
    }
}

/// How the session ended, as reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Completed,
    Killed,
    Detached,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// RFC 3339 time the report was produced
    pub timestamp: String,
    pub mode: String,
    pub outcome: Outcome,
    pub height: usize,
    pub width: usize,
    /// Last merged turn
    pub turn: u64,
    /// Live cells of the final board; unknown for a detached session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alive: Option<usize>,
    pub elapsed: JsonDuration,
    pub cell_updates_per_sec: f64,
    /// Turn latency, available when the engine ran in this process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_latency: Option<TurnSummary>,
}

impl RunReport {
    pub fn new(
        mode: &str,
        end: &SessionEnd,
        height: usize,
        width: usize,
        elapsed: Duration,
        turn_latency: Option<TurnSummary>,
    ) -> Self {
        let (outcome, alive) = match end {
            SessionEnd::Completed(s) => (Outcome::Completed, Some(s.grid.alive_count())),
            SessionEnd::Killed(s) => (Outcome::Killed, Some(s.grid.alive_count())),
            SessionEnd::Detached { .. } => (Outcome::Detached, None),
        };
        // A continued run only computed the turns recorded this session
        let turns_run = turn_latency.as_ref().map_or(end.turn(), |t| t.turns);

        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            mode: mode.to_string(),
            outcome,
            height,
            width,
            turn: end.turn(),
            alive,
            elapsed: JsonDuration::from_duration(elapsed),
            cell_updates_per_sec: cell_update_rate(height * width, turns_run, elapsed),
            turn_latency,
        }
    }
}
