// rest/routes/detect.rs — frame ingestion routes (/detect, /stream).

use axum::{extract::State, http::StatusCode, Json};
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::pipeline::{self, DetectError, FrameRequest};
use crate::session::DEFAULT_SESSION;
use crate::skeleton::{Landmark, Skeleton};
use crate::AppContext;

#[derive(Deserialize)]
pub struct DetectRequest {
    /// Base64-encoded image.
    pub image: Option<String>,
    /// Session key; omitted means the single-user default session.
    pub session: Option<String>,
    /// Pre-extracted landmarks, for clients that run the pose model locally.
    pub landmarks: Option<Vec<Landmark>>,
    pub return_image: Option<bool>,
    pub max_width: Option<u32>,
    pub jpeg_quality: Option<u8>,
}

#[derive(Deserialize)]
pub struct StreamRequest {
    /// Base64-encoded video frame.
    pub frame: Option<String>,
    pub session: Option<String>,
    pub landmarks: Option<Vec<Landmark>>,
}

type RouteError = (StatusCode, Json<Value>);

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> RouteError {
    (status, Json(json!({ "error": message.to_string() })))
}

fn map_detect_error(e: DetectError) -> RouteError {
    if e.is_bad_request() {
        error_response(StatusCode::BAD_REQUEST, e)
    } else {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
    }
}

fn landmarks_json(skeleton: Option<&Skeleton>) -> Vec<Value> {
    skeleton
        .map(|s| {
            s.landmarks
                .iter()
                .enumerate()
                .map(|(i, lm)| {
                    json!({
                        "index": i,
                        "x": lm.x, "y": lm.y, "z": lm.z, "visibility": lm.visibility
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

pub async fn detect(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<DetectRequest>,
) -> Result<Json<Value>, RouteError> {
    let Some(image) = body.image else {
        return Err(error_response(StatusCode::BAD_REQUEST, "No image provided"));
    };

    let req = FrameRequest {
        image_b64: image,
        session: body.session.unwrap_or_else(|| DEFAULT_SESSION.to_string()),
        landmarks: body.landmarks,
        return_image: body.return_image.unwrap_or(ctx.config.annotate.return_image),
        max_width: body.max_width.unwrap_or(ctx.config.annotate.max_width),
        jpeg_quality: body.jpeg_quality.unwrap_or(ctx.config.annotate.jpeg_quality),
    };

    let outcome = pipeline::process_frame(&ctx, req)
        .await
        .map_err(map_detect_error)?;

    let annotated = outcome
        .annotated_jpeg
        .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes));

    Ok(Json(json!({
        "stage": outcome.state.current_stage.to_string(),
        "class": outcome.state.last_label.clone().unwrap_or_default(),
        "probability": outcome.state.probability(),
        "counter": outcome.state.repetition_count,
        "rep_completed": outcome.rep_completed,
        "annotated_image": annotated,
        "landmarks_detected": outcome.landmarks_detected,
        "landmarks": landmarks_json(outcome.skeleton.as_ref()),
    })))
}

pub async fn stream(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<StreamRequest>,
) -> Result<Json<Value>, RouteError> {
    let Some(frame) = body.frame else {
        return Err(error_response(StatusCode::BAD_REQUEST, "No frame provided"));
    };

    let req = FrameRequest {
        image_b64: frame,
        session: body.session.unwrap_or_else(|| DEFAULT_SESSION.to_string()),
        landmarks: body.landmarks,
        return_image: true,
        max_width: ctx.config.annotate.max_width,
        jpeg_quality: ctx.config.annotate.jpeg_quality,
    };

    let outcome = pipeline::process_frame(&ctx, req)
        .await
        .map_err(map_detect_error)?;

    let annotated = outcome
        .annotated_jpeg
        .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes));

    Ok(Json(json!({
        "frame": annotated,
        "stage": outcome.state.current_stage.to_string(),
        "class": outcome.state.last_label.clone().unwrap_or_default(),
        "probability": outcome.state.probability(),
        "counter": outcome.state.repetition_count,
        "landmarks_detected": outcome.landmarks_detected,
    })))
}
