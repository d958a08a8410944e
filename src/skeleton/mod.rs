// SPDX-License-Identifier: MIT
//! Pose skeleton types shared by the extractor seam, the classifier feature
//! layer, and the frame annotator.
//!
//! The layout follows the 33-landmark body model used by the upstream pose
//! extractor: normalized `[0,1]` image coordinates plus a per-landmark
//! visibility score. Feature vectors are the flattened
//! `[x, y, z, visibility]` row per landmark, in index order — the exact shape
//! the trained phase model was fitted on.

use serde::{Deserialize, Serialize};

/// Number of landmarks in a full body skeleton.
pub const LANDMARK_COUNT: usize = 33;

/// Values contributed per landmark to a feature vector.
pub const FEATURES_PER_LANDMARK: usize = 4;

/// Length of a flattened feature vector.
pub const FEATURE_LEN: usize = LANDMARK_COUNT * FEATURES_PER_LANDMARK;

// Landmark indices the crate addresses by name.
pub const NOSE: usize = 0;
pub const LEFT_SHOULDER: usize = 11;
pub const RIGHT_SHOULDER: usize = 12;
pub const LEFT_ELBOW: usize = 13;
pub const RIGHT_ELBOW: usize = 14;
pub const LEFT_WRIST: usize = 15;
pub const RIGHT_WRIST: usize = 16;
pub const LEFT_HIP: usize = 23;
pub const RIGHT_HIP: usize = 24;
pub const LEFT_KNEE: usize = 25;
pub const RIGHT_KNEE: usize = 26;
pub const LEFT_ANKLE: usize = 27;
pub const RIGHT_ANKLE: usize = 28;

/// Bone connections drawn by the annotator (torso, arms, legs).
pub const POSE_CONNECTIONS: &[(usize, usize)] = &[
    (LEFT_SHOULDER, RIGHT_SHOULDER),
    (LEFT_SHOULDER, LEFT_ELBOW),
    (LEFT_ELBOW, LEFT_WRIST),
    (RIGHT_SHOULDER, RIGHT_ELBOW),
    (RIGHT_ELBOW, RIGHT_WRIST),
    (LEFT_SHOULDER, LEFT_HIP),
    (RIGHT_SHOULDER, RIGHT_HIP),
    (LEFT_HIP, RIGHT_HIP),
    (LEFT_HIP, LEFT_KNEE),
    (LEFT_KNEE, LEFT_ANKLE),
    (RIGHT_HIP, RIGHT_KNEE),
    (RIGHT_KNEE, RIGHT_ANKLE),
];

/// One detected body landmark in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    #[serde(default)]
    pub visibility: f32,
}

/// A full body pose for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    pub landmarks: Vec<Landmark>,
}

impl Skeleton {
    /// Build a skeleton from a landmark list. Returns `None` unless the list
    /// carries the full 33-landmark body model — partial detections are
    /// treated as "no pose this frame".
    pub fn from_landmarks(landmarks: Vec<Landmark>) -> Option<Self> {
        if landmarks.len() == LANDMARK_COUNT {
            Some(Self { landmarks })
        } else {
            None
        }
    }

    /// Flatten into the classifier's input row: `[x, y, z, visibility]` per
    /// landmark, in index order.
    pub fn feature_vector(&self) -> Vec<f32> {
        let mut row = Vec::with_capacity(FEATURE_LEN);
        for lm in &self.landmarks {
            row.extend_from_slice(&[lm.x, lm.y, lm.z, lm.visibility]);
        }
        row
    }

    pub fn landmark(&self, index: usize) -> Option<&Landmark> {
        self.landmarks.get(index)
    }
}

/// Pose extraction collaborator: skeleton out of a raw frame, or `None` when
/// no body is in view. The real extractor (a landmark model) lives outside
/// this crate; callers surface `None` as `landmarks_detected = false`.
pub trait PoseExtractor: Send + Sync {
    fn extract(&self, image: &image::RgbImage) -> Option<Skeleton>;
}

/// Extractor used when no pose model is wired in: detects nothing. Frames
/// must then carry pre-extracted landmarks in the request body.
#[derive(Debug, Default)]
pub struct NullExtractor;

impl PoseExtractor for NullExtractor {
    fn extract(&self, _image: &image::RgbImage) -> Option<Skeleton> {
        None
    }
}
