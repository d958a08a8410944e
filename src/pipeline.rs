// SPDX-License-Identifier: MIT
//! Frame pipeline: decode → extract → classify → atomic session update →
//! annotate.
//!
//! Ordering matters for the concurrency contract: classification (which may
//! block on model inference) happens *before* the session lock is taken, so
//! the critical section is just the pure state transformation. A malformed
//! frame is rejected before any state is touched.

use base64::Engine as _;
use tracing::{debug, warn};

use crate::annotate::{self, AnnotateError};
use crate::engine;
use crate::session::SessionState;
use crate::skeleton::{Landmark, Skeleton};
use crate::AppContext;

/// Errors that reject a frame before it reaches the session store.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("invalid base64 image payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("undecodable image: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Annotate(#[from] AnnotateError),
}

impl DetectError {
    /// Whether the caller sent something unusable (vs. a server-side fault).
    pub fn is_bad_request(&self) -> bool {
        matches!(self, DetectError::Base64(_) | DetectError::Image(_))
    }
}

/// One frame's worth of transport input, already merged with config defaults
/// by the route layer.
#[derive(Debug)]
pub struct FrameRequest {
    pub image_b64: String,
    pub session: String,
    /// Pre-extracted landmarks supplied by the client. When present they take
    /// precedence over the server-side extractor.
    pub landmarks: Option<Vec<Landmark>>,
    pub return_image: bool,
    pub max_width: u32,
    pub jpeg_quality: u8,
}

/// Everything a response needs after one frame.
#[derive(Debug)]
pub struct FrameOutcome {
    pub state: SessionState,
    pub rep_completed: bool,
    pub landmarks_detected: bool,
    pub skeleton: Option<Skeleton>,
    pub annotated_jpeg: Option<Vec<u8>>,
}

/// Run one frame through the full pipeline.
pub async fn process_frame(ctx: &AppContext, req: FrameRequest) -> Result<FrameOutcome, DetectError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(&req.image_b64)?;
    let frame = annotate::decode(&bytes)?;
    let frame = annotate::downscale(frame, req.max_width);

    ctx.metrics.inc_frames_processed();

    let skeleton = match req.landmarks {
        Some(landmarks) => {
            let skeleton = Skeleton::from_landmarks(landmarks);
            if skeleton.is_none() {
                debug!(session = %req.session, "request landmarks were not a full skeleton");
            }
            skeleton
        }
        None => ctx.extractor.extract(&frame),
    };

    let (state, rep_completed) = match &skeleton {
        Some(skeleton) => {
            // Classification runs outside the session lock by design.
            match ctx.classifier.classify(&skeleton.feature_vector()) {
                Ok(result) => {
                    if result.confidence <= ctx.config.detection.threshold {
                        ctx.metrics.inc_frames_low_confidence();
                    }
                    let threshold = ctx.config.detection.threshold;
                    let reps_per_set = ctx.config.detection.reps_per_set;
                    ctx.store
                        .update(&req.session, |s| {
                            let fired = engine::advance(s, &result, threshold);
                            if fired {
                                s.roll_set(reps_per_set);
                            }
                            fired
                        })
                        .await
                }
                Err(e) => {
                    // Non-fatal per frame; the session state is untouched.
                    warn!(session = %req.session, err = %e, "classifier error — frame skipped");
                    ctx.metrics.inc_classify_errors();
                    (ctx.store.get(&req.session).await, false)
                }
            }
        }
        None => {
            ctx.metrics.inc_frames_no_pose();
            (ctx.store.get(&req.session).await, false)
        }
    };

    if rep_completed {
        ctx.metrics.inc_reps_counted();
        debug!(
            session = %req.session,
            counter = state.repetition_count,
            "repetition completed"
        );
    }

    let annotated_jpeg = if req.return_image {
        let rendered = annotate::annotate(&frame, skeleton.as_ref(), state.current_stage);
        Some(annotate::encode_jpeg(&rendered, req.jpeg_quality)?)
    } else {
        None
    };

    Ok(FrameOutcome {
        landmarks_detected: skeleton.is_some(),
        state,
        rep_completed,
        skeleton,
        annotated_jpeg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::HeuristicClassifier;
    use crate::config::DaemonConfig;
    use crate::engine::Stage;
    use crate::metrics::DaemonMetrics;
    use crate::session::SessionStore;
    use crate::skeleton::test_support::{crouched_pose, standing_pose};
    use crate::skeleton::NullExtractor;
    use std::sync::Arc;

    fn test_ctx() -> AppContext {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::new(None, Some(dir.path().to_path_buf()), None, None, None, None);
        AppContext {
            config: Arc::new(config),
            store: Arc::new(SessionStore::new()),
            classifier: Arc::new(HeuristicClassifier),
            extractor: Arc::new(NullExtractor),
            metrics: Arc::new(DaemonMetrics::new()),
            started_at: std::time::Instant::now(),
        }
    }

    fn frame_b64() -> String {
        let img = image::RgbImage::from_pixel(32, 24, image::Rgb([8, 8, 8]));
        let jpeg = crate::annotate::encode_jpeg(&img, 80).unwrap();
        base64::engine::general_purpose::STANDARD.encode(jpeg)
    }

    fn request(landmarks: Option<Vec<Landmark>>) -> FrameRequest {
        FrameRequest {
            image_b64: frame_b64(),
            session: "test".to_string(),
            landmarks,
            return_image: false,
            max_width: 640,
            jpeg_quality: 70,
        }
    }

    #[tokio::test]
    async fn garbage_base64_is_rejected_before_state_changes() {
        let ctx = test_ctx();
        let mut req = request(None);
        req.image_b64 = "!!!not base64!!!".to_string();
        let err = process_frame(&ctx, req).await.unwrap_err();
        assert!(err.is_bad_request());
        assert!(ctx.store.is_empty().await);
    }

    #[tokio::test]
    async fn no_pose_leaves_state_untouched() {
        let ctx = test_ctx();
        let outcome = process_frame(&ctx, request(None)).await.unwrap();
        assert!(!outcome.landmarks_detected);
        assert!(!outcome.rep_completed);
        assert_eq!(outcome.state.current_stage, Stage::Unknown);
        assert_eq!(ctx.metrics.snapshot()["frames_no_pose"], 1);
    }

    #[tokio::test]
    async fn down_then_up_frames_complete_a_rep() {
        let ctx = test_ctx();

        let down = process_frame(&ctx, request(Some(crouched_pose().landmarks)))
            .await
            .unwrap();
        assert!(down.landmarks_detected);
        assert!(!down.rep_completed);
        assert_eq!(down.state.current_stage, Stage::Down);

        let up = process_frame(&ctx, request(Some(standing_pose().landmarks)))
            .await
            .unwrap();
        assert!(up.rep_completed);
        assert_eq!(up.state.current_stage, Stage::Up);
        assert_eq!(up.state.repetition_count, 1);
        assert_eq!(ctx.metrics.snapshot()["reps_counted"], 1);
    }

    #[tokio::test]
    async fn annotated_frame_is_returned_on_request() {
        let ctx = test_ctx();
        let mut req = request(Some(standing_pose().landmarks));
        req.return_image = true;
        let outcome = process_frame(&ctx, req).await.unwrap();
        let jpeg = outcome.annotated_jpeg.expect("annotated frame");
        assert!(!jpeg.is_empty());

        let mut req = request(Some(standing_pose().landmarks));
        req.return_image = false;
        let outcome = process_frame(&ctx, req).await.unwrap();
        assert!(outcome.annotated_jpeg.is_none());
    }

    #[tokio::test]
    async fn partial_landmarks_count_as_no_pose() {
        let ctx = test_ctx();
        let few = standing_pose().landmarks[..5].to_vec();
        let outcome = process_frame(&ctx, request(Some(few))).await.unwrap();
        assert!(!outcome.landmarks_detected);
        assert_eq!(outcome.state.current_stage, Stage::Unknown);
    }
}
