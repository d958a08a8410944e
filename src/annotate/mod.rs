// SPDX-License-Identifier: MIT
//! Frame annotator — draws the detected skeleton and stage over a frame.
//!
//! Pure functions over pixel buffers: no shared state, and the only
//! "failure" is an absent skeleton, in which case the base image comes back
//! unchanged and the caller reports `landmarks_detected = false`.

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, ExtendedColorType, Rgb, RgbImage};

use crate::engine::Stage;
use crate::skeleton::{Skeleton, POSE_CONNECTIONS};

/// Joint dot color (red) and bone color (magenta) — the palette of the
/// original overlay.
const JOINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BONE_COLOR: Rgb<u8> = Rgb([250, 44, 250]);

const JOINT_RADIUS: i32 = 3;
/// Height of the stage banner strip at the top of the frame.
const BANNER_HEIGHT: u32 = 8;

#[derive(Debug, thiserror::Error)]
pub enum AnnotateError {
    #[error("failed to encode annotated frame: {0}")]
    Encode(#[from] image::ImageError),
}

/// Overlay skeleton and stage onto `image`, returning a new buffer.
///
/// With no skeleton the frame is returned as-is — not even the banner is
/// drawn, so clients can display the raw camera feed while out of frame.
pub fn annotate(image: &RgbImage, skeleton: Option<&Skeleton>, stage: Stage) -> RgbImage {
    let Some(skeleton) = skeleton else {
        return image.clone();
    };

    let mut out = image.clone();

    for (a, b) in POSE_CONNECTIONS {
        if let (Some(from), Some(to)) = (skeleton.landmark(*a), skeleton.landmark(*b)) {
            let (from, to) = (project(from, image), project(to, image));
            draw_line(&mut out, from, to, BONE_COLOR);
        }
    }
    for lm in &skeleton.landmarks {
        let (cx, cy) = project(lm, image);
        draw_disc(&mut out, cx, cy, JOINT_RADIUS, JOINT_COLOR);
    }
    draw_banner(&mut out, stage);
    out
}

/// Downscale to at most `max_width` pixels wide, preserving aspect ratio.
/// Frames already narrow enough pass through untouched.
pub fn downscale(image: RgbImage, max_width: u32) -> RgbImage {
    if max_width == 0 || image.width() <= max_width {
        return image;
    }
    let scale = max_width as f32 / image.width() as f32;
    let height = ((image.height() as f32 * scale) as u32).max(1);
    imageops::resize(&image, max_width, height, imageops::FilterType::Triangle)
}

/// JPEG-encode a frame at the given quality (1-100).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, AnnotateError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}

/// Decode any supported image format into an RGB buffer.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, image::ImageError> {
    image::load_from_memory(bytes).map(DynamicImage::into_rgb8)
}

/// Color-coded stage strip along the top edge: green at lockout, red at the
/// bottom, gray before any accepted classification. Stands in for the text
/// overlay the desktop UI renders.
fn draw_banner(image: &mut RgbImage, stage: Stage) {
    let color = match stage {
        Stage::Up => Rgb([40, 200, 40]),
        Stage::Down => Rgb([200, 40, 40]),
        Stage::Unknown => Rgb([120, 120, 120]),
    };
    let height = BANNER_HEIGHT.min(image.height());
    for y in 0..height {
        for x in 0..image.width() {
            image.put_pixel(x, y, color);
        }
    }
}

/// Project a normalized landmark onto pixel coordinates, clamped to just
/// outside the frame's bounding box. Wire landmarks are not range-validated:
/// an unclamped cast saturates to `i32::MIN`/`MAX` and overflows the
/// line-walk arithmetic in `draw_line`.
fn project(lm: &crate::skeleton::Landmark, image: &RgbImage) -> (i32, i32) {
    let w = image.width() as f32;
    let h = image.height() as f32;
    let x = (lm.x * w).clamp(-1.0, w);
    let y = (lm.y * h).clamp(-1.0, h);
    // NaN survives clamp and casts to 0, which stays on-frame.
    (x as i32, y as i32)
}

fn put_pixel_checked(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

/// Bresenham line between two pixel coordinates.
fn draw_line(image: &mut RgbImage, (x0, y0): (i32, i32), (x1, y1): (i32, i32), color: Rgb<u8>) {
    let (mut x, mut y) = (x0, y0);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put_pixel_checked(image, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn draw_disc(image: &mut RgbImage, cx: i32, cy: i32, radius: i32, color: Rgb<u8>) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_checked(image, cx + dx, cy + dy, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::test_support::standing_pose;

    fn blank(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([0, 0, 0]))
    }

    #[test]
    fn absent_skeleton_returns_base_image_unchanged() {
        let base = blank(64, 48);
        let out = annotate(&base, None, Stage::Unknown);
        assert_eq!(out, base);
    }

    #[test]
    fn skeleton_overlay_changes_pixels() {
        let base = blank(64, 48);
        let skeleton = standing_pose();
        let out = annotate(&base, Some(&skeleton), Stage::Up);
        assert_ne!(out, base);
        // Banner strip reflects the stage color.
        assert_eq!(*out.get_pixel(0, 0), Rgb([40, 200, 40]));
    }

    #[test]
    fn downscale_preserves_aspect_ratio() {
        let base = blank(800, 400);
        let out = downscale(base, 640);
        assert_eq!(out.width(), 640);
        assert_eq!(out.height(), 320);
    }

    #[test]
    fn downscale_leaves_narrow_frames_alone() {
        let base = blank(320, 240);
        let out = downscale(base.clone(), 640);
        assert_eq!(out, base);
    }

    #[test]
    fn jpeg_roundtrip_decodes_to_same_dimensions() {
        let base = blank(32, 24);
        let bytes = encode_jpeg(&base, 70).unwrap();
        assert!(!bytes.is_empty());
        let decoded = decode(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn undecodable_bytes_are_an_error() {
        assert!(decode(b"definitely not an image").is_err());
    }

    #[test]
    fn off_frame_landmarks_do_not_panic() {
        let base = blank(16, 16);
        let mut skeleton = standing_pose();
        for lm in &mut skeleton.landmarks {
            lm.x = 4.5; // far outside the frame
        }
        let _ = annotate(&base, Some(&skeleton), Stage::Down);
    }

    #[test]
    fn extreme_landmark_magnitudes_draw_safely() {
        // Unvalidated wire input: coordinates that would saturate an i32
        // cast. Endpoints must clamp to the frame's bounding box instead of
        // overflowing the line walk.
        let base = blank(32, 32);
        let mut skeleton = standing_pose();
        skeleton.landmarks[crate::skeleton::LEFT_SHOULDER].x = -1e12;
        skeleton.landmarks[crate::skeleton::RIGHT_SHOULDER].x = 1e12;
        skeleton.landmarks[crate::skeleton::LEFT_HIP].y = f32::INFINITY;
        skeleton.landmarks[crate::skeleton::RIGHT_HIP].y = f32::NEG_INFINITY;
        skeleton.landmarks[crate::skeleton::LEFT_KNEE].x = f32::NAN;
        skeleton.landmarks[crate::skeleton::LEFT_KNEE].y = f32::NAN;
        let _ = annotate(&base, Some(&skeleton), Stage::Down);
    }

    #[test]
    fn projection_clamps_to_the_frame_box() {
        let base = blank(32, 32);
        let lm = |x: f32, y: f32| crate::skeleton::Landmark {
            x,
            y,
            z: 0.0,
            visibility: 1.0,
        };
        assert_eq!(project(&lm(-1e12, 1e12), &base), (-1, 32));
        assert_eq!(project(&lm(f32::NAN, 0.5), &base), (0, 16));
        assert_eq!(project(&lm(0.5, 0.5), &base), (16, 16));
    }
}
