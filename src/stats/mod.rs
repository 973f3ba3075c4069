//! Turn latency statistics
//!
//! The broker records the wall-clock time of every completed turn (fan-out,
//! barrier and reassembly) and reports a summary with each game result.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest turn the histogram tracks precisely (1 hour, in microseconds)
const MAX_TRACKED_US: u64 = 3_600_000_000;

/// Summary of turn latencies for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnTimings {
    /// Turns measured
    pub turns: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Histogram of turn durations
#[derive(Debug)]
pub struct TurnRecorder {
    histogram: Histogram<u64>,
}

impl Default for TurnRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnRecorder {
    pub fn new() -> Self {
        // 1us to 1h with 3 significant digits
        let histogram = Histogram::new_with_bounds(1, MAX_TRACKED_US, 3)
            .expect("Failed to create histogram with valid bounds");
        Self { histogram }
    }

    /// Record one turn, clamping to the tracked range
    pub fn record(&mut self, elapsed: Duration) {
        let micros = (elapsed.as_micros() as u64).clamp(1, MAX_TRACKED_US);
        // In range after the clamp, so recording cannot fail
        self.histogram.record(micros).ok();
    }

    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    pub fn summary(&self) -> TurnTimings {
        if self.histogram.is_empty() {
            return TurnTimings::default();
        }
        TurnTimings {
            turns: self.histogram.len(),
            mean_us: self.histogram.mean(),
            p50_us: self.histogram.value_at_quantile(0.50),
            p99_us: self.histogram.value_at_quantile(0.99),
            max_us: self.histogram.max(),
        }
    }
}
