//! Turn latency statistics
//!
//! Records the wall time of every completed generation (partition, scatter,
//! barrier and merge) in an HdrHistogram so a run can report its median and
//! tail turn latency.
//!
//! # Example
//!
//! ```
//! use golnet::stats::TurnStats;
//! use std::time::Duration;
//!
//! let mut stats = TurnStats::new();
//! stats.record(Duration::from_millis(4));
//! stats.record(Duration::from_millis(6));
//!
//! let summary = stats.summary();
//! assert_eq!(summary.turns, 2);
//! ```

use crate::util::time::{format_duration, format_rate};
use crate::Result;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Upper bound of a recordable turn: one hour, in nanoseconds
const MAX_TURN_NANOS: u64 = 3_600_000_000_000;

/// Histogram of per-turn wall time
///
/// Tracks 1ns to 1 hour with 3 significant digits.
#[derive(Debug, Clone)]
pub struct TurnStats {
    histogram: Histogram<u64>,
    total: Duration,
}

impl TurnStats {
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(1, MAX_TURN_NANOS, 3)
            .expect("Failed to create histogram with valid bounds");

        Self {
            histogram,
            total: Duration::ZERO,
        }
    }

    /// Record one completed turn
    #[inline]
    pub fn record(&mut self, elapsed: Duration) {
        let value = (elapsed.as_nanos() as u64).clamp(1, MAX_TURN_NANOS);
        // Saturating record - out of range values were clamped above
        let _ = self.histogram.record(value);
        self.total += elapsed;
    }

    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.len() == 0
    }

    /// Turn time at `percentile` (0.0 - 100.0), `None` when empty
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        if self.is_empty() {
            return None;
        }
        Some(Duration::from_nanos(self.histogram.value_at_percentile(percentile)))
    }

    pub fn max(&self) -> Option<Duration> {
        if self.is_empty() {
            return None;
        }
        Some(Duration::from_nanos(self.histogram.max()))
    }

    /// Fold another run's samples into this one
    pub fn merge(&mut self, other: &TurnStats) -> Result<()> {
        self.histogram
            .add(&other.histogram)
            .map_err(|e| anyhow::anyhow!("Failed to merge histograms: {}", e))?;
        self.total += other.total;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.histogram.reset();
        self.total = Duration::ZERO;
    }

    pub fn summary(&self) -> TurnSummary {
        let nanos = |d: Option<Duration>| d.map(|d| d.as_nanos() as u64).unwrap_or(0);
        let seconds = self.total.as_secs_f64();

        TurnSummary {
            turns: self.len(),
            total_ns: self.total.as_nanos() as u64,
            p50_ns: nanos(self.percentile(50.0)),
            p99_ns: nanos(self.percentile(99.0)),
            max_ns: nanos(self.max()),
            turns_per_sec: if seconds > 0.0 { self.len() as f64 / seconds } else { 0.0 },
        }
    }
}

impl Default for TurnStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable digest of [`TurnStats`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnSummary {
    pub turns: u64,
    pub total_ns: u64,
    pub p50_ns: u64,
    pub p99_ns: u64,
    pub max_ns: u64,
    pub turns_per_sec: f64,
}

impl fmt::Display for TurnSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} turns in {} ({} turns/s), p50 {}, p99 {}, max {}",
            self.turns,
            format_duration(Duration::from_nanos(self.total_ns)),
            format_rate(self.turns_per_sec),
            format_duration(Duration::from_nanos(self.p50_ns)),
            format_duration(Duration::from_nanos(self.p99_ns)),
            format_duration(Duration::from_nanos(self.max_ns)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let stats = TurnStats::new();
        assert!(stats.is_empty());
        assert_eq!(stats.percentile(50.0), None);
        assert_eq!(stats.summary().turns, 0);
        assert_eq!(stats.summary().turns_per_sec, 0.0);
    }

    #[test]
    fn test_percentiles() {
        let mut stats = TurnStats::new();
        for i in 1..=100 {
            stats.record(Duration::from_micros(i * 10));
        }

        let p50 = stats.percentile(50.0).unwrap();
        let p99 = stats.percentile(99.0).unwrap();
        assert!(p50.as_micros() >= 450 && p50.as_micros() <= 550);
        assert!(p99.as_micros() >= 940 && p99.as_micros() <= 1040);
    }

    #[test]
    fn test_merge_and_reset() {
        let mut a = TurnStats::new();
        a.record(Duration::from_millis(1));
        let mut b = TurnStats::new();
        b.record(Duration::from_millis(3));

        a.merge(&b).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a.summary().total_ns, 4_000_000);

        a.reset();
        assert!(a.is_empty());
    }

    #[test]
    fn test_summary_display() {
        let mut stats = TurnStats::new();
        stats.record(Duration::from_millis(2));
        let text = stats.summary().to_string();
        assert!(text.starts_with("1 turns in 2.00ms"));
    }
}
