// SPDX-License-Identifier: MIT
//! Stage transition engine — turns per-frame classifications into rep counts.
//!
//! A classification drives the state machine only when its confidence clears
//! the configured threshold (strict `>`). The counter advances on exactly one
//! path: an accepted DOWN → UP edge.
//!
//! # State machine
//!
//! ```text
//!              accepted "down"                accepted "up"
//! Unknown ──────────────────────► Down ──────────────────────► Up
//!    │                             ▲                            │
//!    │ accepted "up" (no count)    └────── accepted "down" ─────┘
//!    └───────────────────────► Up          (no count)
//! ```
//!
//! - **Unknown**: initial state, reachable again only via session reset.
//! - **Down**: bottom of the movement. Repeated accepted "down" frames stay
//!   here without side effects — only the edge matters.
//! - **Up**: top of the movement. Entering Up *from Down* is the sole
//!   increment path, so label flicker around the threshold can never
//!   double-count.

use serde::{Deserialize, Serialize};

use crate::session::SessionState;

/// Default acceptance threshold, matching the deployed model's tuning.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// The two phase labels the engine acts on. Any other label is recorded for
/// display but never drives a transition that counts.
pub const LABEL_DOWN: &str = "down";
pub const LABEL_UP: &str = "up";

/// Detected position within a repetition cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// No accepted classification observed yet (fresh or reset session).
    #[default]
    Unknown,
    /// Top of the movement.
    Up,
    /// Bottom of the movement.
    Down,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Unknown => write!(f, "unknown"),
            Stage::Up => write!(f, "up"),
            Stage::Down => write!(f, "down"),
        }
    }
}

/// One frame's classifier output: the winning label, the probability assigned
/// to it, and optionally the full distribution over classes.
///
/// Created once per frame, consumed by [`advance`], then discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub label: String,
    pub confidence: f32,
    /// Full probability vector in classifier class order. May be empty when
    /// the upstream model only reports the winning probability.
    pub probabilities: Vec<f32>,
}

impl ClassificationResult {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            probabilities: Vec::new(),
        }
    }

    pub fn with_probabilities(mut self, probabilities: Vec<f32>) -> Self {
        self.probabilities = probabilities;
        self
    }

    /// A classification is eligible to drive the state machine only when it
    /// carries a label, reports a sane probability, and strictly clears the
    /// threshold. Exactly-at-threshold is rejected so the boundary is
    /// deterministic.
    fn is_accepted(&self, threshold: f32) -> bool {
        !self.label.is_empty()
            && (0.0..=1.0).contains(&self.confidence)
            && self.confidence > threshold
    }
}

/// Apply one classification to a session's state.
///
/// Returns `true` exactly when a repetition completed (accepted DOWN → UP
/// edge), `false` otherwise. The caller owns atomicity — this function is a
/// pure in-place transformation and must run under the session's lock.
///
/// Unaccepted frames (low confidence, out-of-range probability, empty label)
/// refresh `last_label`/`last_confidence` for observability and change
/// nothing else; noisy upstream output never raises.
pub fn advance(state: &mut SessionState, result: &ClassificationResult, threshold: f32) -> bool {
    state.last_label = Some(result.label.clone());
    state.last_confidence = Some(result.confidence);

    if !result.is_accepted(threshold) {
        return false;
    }

    match result.label.as_str() {
        LABEL_DOWN => {
            state.current_stage = Stage::Down;
            false
        }
        LABEL_UP => {
            let from_down = state.current_stage == Stage::Down;
            state.current_stage = Stage::Up;
            if from_down {
                state.repetition_count += 1;
            }
            from_down
        }
        // Third-class labels update the displayed phase history only; the
        // stage and counter are untouched.
        _ => false,
    }
}
