// SPDX-License-Identifier: MIT
//! In-process counters exposed as `GET /metrics`.
//!
//! No external library — all counters are `AtomicU64` incremented inline on
//! the frame path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde_json::{json, Value};

/// Frame-path counters shared across all requests.
#[derive(Debug)]
pub struct DaemonMetrics {
    /// Frames that reached the pipeline (decoded successfully).
    pub frames_processed: AtomicU64,
    /// Frames with no detectable pose.
    pub frames_no_pose: AtomicU64,
    /// Frames whose classification fell at or below the threshold.
    pub frames_low_confidence: AtomicU64,
    /// Per-frame classifier errors (non-fatal by contract).
    pub classify_errors: AtomicU64,
    /// Repetitions counted since daemon start, across all sessions.
    pub reps_counted: AtomicU64,
    /// Session resets since daemon start.
    pub resets: AtomicU64,
    /// Daemon start time — used to calculate uptime in the metrics response.
    pub started_at: Instant,
}

impl DaemonMetrics {
    pub fn new() -> Self {
        Self {
            frames_processed: AtomicU64::new(0),
            frames_no_pose: AtomicU64::new(0),
            frames_low_confidence: AtomicU64::new(0),
            classify_errors: AtomicU64::new(0),
            reps_counted: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn inc_frames_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_frames_no_pose(&self) {
        self.frames_no_pose.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_frames_low_confidence(&self) {
        self.frames_low_confidence.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_classify_errors(&self) {
        self.classify_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reps_counted(&self) {
        self.reps_counted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resets(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Value {
        json!({
            "frames_processed": self.frames_processed.load(Ordering::Relaxed),
            "frames_no_pose": self.frames_no_pose.load(Ordering::Relaxed),
            "frames_low_confidence": self.frames_low_confidence.load(Ordering::Relaxed),
            "classify_errors": self.classify_errors.load(Ordering::Relaxed),
            "reps_counted": self.reps_counted.load(Ordering::Relaxed),
            "resets": self.resets.load(Ordering::Relaxed),
            "uptime_secs": self.started_at.elapsed().as_secs(),
        })
    }
}

impl Default for DaemonMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_into_the_snapshot() {
        let metrics = DaemonMetrics::new();
        metrics.inc_frames_processed();
        metrics.inc_frames_processed();
        metrics.inc_reps_counted();

        let snap = metrics.snapshot();
        assert_eq!(snap["frames_processed"], 2);
        assert_eq!(snap["reps_counted"], 1);
        assert_eq!(snap["resets"], 0);
    }
}
