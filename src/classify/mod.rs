// SPDX-License-Identifier: MIT
//! Phase classifier collaborator seam.
//!
//! The engine only ever sees a [`ClassificationResult`]; where it came from
//! is behind [`PhaseClassifier`]. Two implementations ship with the daemon:
//!
//! - [`LinearClassifier`] — softmax over per-class weight rows loaded once at
//!   startup from a JSON artifact (the "opaque trained model" input).
//! - [`HeuristicClassifier`] — geometry fallback used when no artifact is
//!   configured, so the daemon stays functional end to end.
//!
//! Per-frame classifier failures are non-fatal by contract — the transport
//! layer records them and moves on. Only a missing or corrupt artifact at
//! startup is fatal, and that is surfaced before the server binds.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use serde::Deserialize;
use tracing::info;

use crate::config::DaemonConfig;
use crate::engine::{ClassificationResult, LABEL_DOWN, LABEL_UP};
use crate::skeleton::{self, FEATURE_LEN};

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("feature vector has {got} values, expected {expected}")]
    FeatureShape { got: usize, expected: usize },
    #[error("feature vector contains non-finite values")]
    NonFinite,
}

/// Phase classifier contract: a feature row in, a labeled probability out.
///
/// Implementations may block (model inference); the transport layer always
/// calls this *before* taking the session lock.
pub trait PhaseClassifier: Send + Sync {
    fn classify(&self, features: &[f32]) -> Result<ClassificationResult, ClassifyError>;

    /// Human-readable name for startup logs and doctor output.
    fn name(&self) -> &'static str;
}

// ─── Linear model artifact ────────────────────────────────────────────────────

/// On-disk shape of the trained artifact: one weight row and bias per class.
#[derive(Debug, Deserialize)]
struct ModelArtifact {
    classes: Vec<String>,
    weights: Vec<Vec<f32>>,
    #[serde(default)]
    bias: Vec<f32>,
}

/// Linear softmax classifier over flattened landmark features.
#[derive(Debug)]
pub struct LinearClassifier {
    classes: Vec<String>,
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

impl LinearClassifier {
    /// Load the artifact from disk. Called once at process start; any
    /// inconsistency here is fatal to startup, never to a request.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model artifact '{}'", path.display()))?;
        let artifact: ModelArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse model artifact '{}'", path.display()))?;

        if artifact.classes.is_empty() || artifact.classes.len() != artifact.weights.len() {
            anyhow::bail!(
                "model artifact '{}' is inconsistent: {} classes, {} weight rows",
                path.display(),
                artifact.classes.len(),
                artifact.weights.len()
            );
        }
        for (class, row) in artifact.classes.iter().zip(&artifact.weights) {
            if row.len() != FEATURE_LEN {
                anyhow::bail!(
                    "weight row for class '{class}' has {} values, expected {FEATURE_LEN}",
                    row.len()
                );
            }
        }
        let bias = if artifact.bias.is_empty() {
            vec![0.0; artifact.classes.len()]
        } else if artifact.bias.len() == artifact.classes.len() {
            artifact.bias
        } else {
            anyhow::bail!(
                "model artifact '{}' has {} bias terms for {} classes",
                path.display(),
                artifact.bias.len(),
                artifact.classes.len()
            );
        };

        info!(
            path = %path.display(),
            classes = ?artifact.classes,
            "phase model loaded"
        );
        Ok(Self {
            classes: artifact.classes,
            weights: artifact.weights,
            bias,
        })
    }
}

impl PhaseClassifier for LinearClassifier {
    fn classify(&self, features: &[f32]) -> Result<ClassificationResult, ClassifyError> {
        if features.len() != FEATURE_LEN {
            return Err(ClassifyError::FeatureShape {
                got: features.len(),
                expected: FEATURE_LEN,
            });
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(ClassifyError::NonFinite);
        }

        let scores: Vec<f32> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(features).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect();

        // Softmax with max-shift for numeric stability.
        let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
        let total: f32 = exps.iter().sum();
        let probabilities: Vec<f32> = exps.iter().map(|e| e / total).collect();

        let (best, confidence) = probabilities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, p)| (i, *p))
            .unwrap_or((0, 0.0));

        Ok(ClassificationResult::new(self.classes[best].clone(), confidence)
            .with_probabilities(probabilities))
    }

    fn name(&self) -> &'static str {
        "linear"
    }
}

// ─── Heuristic fallback ───────────────────────────────────────────────────────

/// Model-free up/down classifier from body geometry.
///
/// Compares where the hips sit between shoulders and ankles: a lifter at the
/// bottom of a rep has hips dropped toward the ankles, at lockout hips ride
/// high under the shoulders. Confidence grows with the distance from the
/// midpoint, so ambiguous mid-movement frames stay below the acceptance
/// threshold.
#[derive(Debug, Default)]
pub struct HeuristicClassifier;

/// Logistic steepness for the hip-drop ratio: tuned so a neutral stance and
/// a full crouch both land clear of the default 0.7 acceptance threshold.
const STEEPNESS: f32 = 16.0;

impl HeuristicClassifier {
    fn mean_y(features: &[f32], indices: &[usize]) -> f32 {
        let sum: f32 = indices
            .iter()
            .map(|i| features[i * skeleton::FEATURES_PER_LANDMARK + 1])
            .sum();
        sum / indices.len() as f32
    }
}

impl PhaseClassifier for HeuristicClassifier {
    fn classify(&self, features: &[f32]) -> Result<ClassificationResult, ClassifyError> {
        if features.len() != FEATURE_LEN {
            return Err(ClassifyError::FeatureShape {
                got: features.len(),
                expected: FEATURE_LEN,
            });
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(ClassifyError::NonFinite);
        }

        let shoulder_y = Self::mean_y(features, &[skeleton::LEFT_SHOULDER, skeleton::RIGHT_SHOULDER]);
        let hip_y = Self::mean_y(features, &[skeleton::LEFT_HIP, skeleton::RIGHT_HIP]);
        let ankle_y = Self::mean_y(features, &[skeleton::LEFT_ANKLE, skeleton::RIGHT_ANKLE]);

        let span = ankle_y - shoulder_y;
        if span <= f32::EPSILON {
            // Degenerate geometry (all joints collapsed): unambiguously noise.
            return Ok(ClassificationResult::new(LABEL_UP, 0.0).with_probabilities(vec![0.5, 0.5]));
        }

        // 0 = hips at the shoulders (lockout), 1 = hips at the ankles. A
        // standing lifter sits around 0.4, the bottom of a rep above 0.6;
        // the logistic keeps mid-movement frames low-confidence.
        let drop_ratio = ((hip_y - shoulder_y) / span).clamp(0.0, 1.0);
        let p_down = 1.0 / (1.0 + (-(drop_ratio - 0.5) * STEEPNESS).exp());
        let (label, confidence) = if p_down >= 0.5 {
            (LABEL_DOWN, p_down)
        } else {
            (LABEL_UP, 1.0 - p_down)
        };

        Ok(ClassificationResult::new(label, confidence)
            .with_probabilities(vec![p_down, 1.0 - p_down]))
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

/// Build the classifier the daemon was configured with: the trained artifact
/// when `model_path` is set, the geometry heuristic otherwise.
pub fn from_config(config: &DaemonConfig) -> anyhow::Result<Arc<dyn PhaseClassifier>> {
    match &config.model_path {
        Some(path) => Ok(Arc::new(LinearClassifier::load(path)?)),
        None => {
            info!("no model artifact configured — using geometry heuristic classifier");
            Ok(Arc::new(HeuristicClassifier))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::test_support::{crouched_pose, standing_pose};
    use std::io::Write as _;

    #[test]
    fn heuristic_separates_standing_from_crouched() {
        let classifier = HeuristicClassifier;

        let up = classifier
            .classify(&standing_pose().feature_vector())
            .unwrap();
        assert_eq!(up.label, "up");
        assert!(up.confidence > 0.5);

        let down = classifier
            .classify(&crouched_pose().feature_vector())
            .unwrap();
        assert_eq!(down.label, "down");
        assert!(down.confidence > 0.7, "confidence {}", down.confidence);
    }

    #[test]
    fn heuristic_rejects_wrong_shape() {
        let err = HeuristicClassifier.classify(&[0.0; 8]).unwrap_err();
        assert!(matches!(err, ClassifyError::FeatureShape { got: 8, .. }));
    }

    #[test]
    fn linear_classifier_loads_and_predicts() {
        // Weight the "down" class on hip height: positive hip-y weight means
        // lower hips (larger y) score as down.
        let mut down_row = vec![0.0f32; FEATURE_LEN];
        let mut up_row = vec![0.0f32; FEATURE_LEN];
        for idx in [skeleton::LEFT_HIP, skeleton::RIGHT_HIP] {
            down_row[idx * skeleton::FEATURES_PER_LANDMARK + 1] = 8.0;
            up_row[idx * skeleton::FEATURES_PER_LANDMARK + 1] = -8.0;
        }
        let artifact = serde_json::json!({
            "classes": ["down", "up"],
            "weights": [down_row, up_row],
            "bias": [0.0, 0.0],
        });

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{artifact}").unwrap();

        let classifier = LinearClassifier::load(file.path()).unwrap();
        let result = classifier
            .classify(&crouched_pose().feature_vector())
            .unwrap();
        assert_eq!(result.label, "down");
        assert!(result.confidence > 0.9);
        assert_eq!(result.probabilities.len(), 2);
        let total: f32 = result.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn inconsistent_artifact_fails_at_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"classes": ["down", "up"], "weights": [[0.0]]}}"#
        )
        .unwrap();
        assert!(LinearClassifier::load(file.path()).is_err());
    }
}
