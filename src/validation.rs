//! Frame validation utilities for captured streams.
//!
//! Delivered [`FrameBuffer`]s are recycled by the driver, so validation works
//! on [`CapturedFrame`] snapshots taken inside the frame callback. The checks
//! are used by the integration tests against vivid virtual cameras.

use crate::frame::{FrameBuffer, Timestamp};
use crate::pixel::Encoding;
use crate::traits::{CameraError, Result};

/// Expected RGB values for 100% color bars (8 bars).
///
/// Colors in order: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
const COLOR_BARS: [(u8, u8, u8); 8] = [
    (235, 235, 235),
    (235, 235, 16),
    (16, 235, 235),
    (16, 235, 16),
    (235, 16, 235),
    (235, 16, 16),
    (16, 16, 235),
    (16, 16, 16),
];

/// Tolerance for RGB color matching (accounts for YUV->RGB conversion errors).
const COLOR_TOLERANCE: u32 = 20;

/// Minimum luminance change across a gradient frame.
const MIN_GRADIENT_RANGE: f32 = 50.0;

/// Owned copy of one delivered frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Driver sequence id.
    pub frame_id: u64,
    /// Capture time.
    pub stamp: Timestamp,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes per row.
    pub step: usize,
    /// Image encoding.
    pub encoding: Encoding,
    /// Image bytes.
    pub data: Vec<u8>,
}

impl CapturedFrame {
    /// Snapshot the header and image of a delivered buffer.
    pub fn from_buffer(frame: &FrameBuffer) -> Self {
        Self {
            frame_id: frame.frame_id(),
            stamp: frame.stamp(),
            width: frame.width(),
            height: frame.height(),
            step: frame.step(),
            encoding: frame.encoding(),
            data: frame.to_vec(),
        }
    }

    /// RGB value of a pixel for 8-bit RGB, BGR, mono and packed YUV 4:2:2 images.
    ///
    /// Returns `None` when out of bounds or for other encodings.
    pub fn pixel_rgb(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let row = (y as usize).checked_mul(self.step)?;
        let x = x as usize;
        let byte = |offset: usize| self.data.get(row + offset).copied();

        match self.encoding {
            Encoding::Mono8 => byte(x).map(|v| (v, v, v)),
            Encoding::Rgb8 => Some((byte(x * 3)?, byte(x * 3 + 1)?, byte(x * 3 + 2)?)),
            Encoding::Bgr8 => Some((byte(x * 3 + 2)?, byte(x * 3 + 1)?, byte(x * 3)?)),
            Encoding::Yuv422Yuy2 => {
                // [Y0 U Y1 V], each pair of pixels shares U and V
                let pair = (x & !1) * 2;
                let luma = if x % 2 == 0 { byte(pair)? } else { byte(pair + 2)? };
                Some(yuv_to_rgb(luma, byte(pair + 1)?, byte(pair + 3)?))
            }
            Encoding::Yuv422 => {
                // [U Y0 V Y1]
                let pair = (x & !1) * 2;
                let luma = if x % 2 == 0 { byte(pair + 1)? } else { byte(pair + 3)? };
                Some(yuv_to_rgb(luma, byte(pair)?, byte(pair + 2)?))
            }
            _ => None,
        }
    }
}

/// Convert YUV values to RGB using ITU-R BT.601.
#[must_use]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    // Clamped to 0..=255 first
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamp = |val: f32| val.round().clamp(0.0, 255.0) as u8;

    (clamp(r), clamp(g), clamp(b))
}

fn luminance((r, g, b): (u8, u8, u8)) -> f32 {
    0.114f32.mul_add(
        f32::from(b),
        0.587f32.mul_add(f32::from(g), 0.299 * f32::from(r)),
    )
}

fn colors_match(actual: (u8, u8, u8), expected: (u8, u8, u8), tolerance: u32) -> bool {
    let (ar, ag, ab) = actual;
    let (er, eg, eb) = expected;

    u32::from(ar.abs_diff(er)) <= tolerance
        && u32::from(ag.abs_diff(eg)) <= tolerance
        && u32::from(ab.abs_diff(eb)) <= tolerance
}

/// Check that a frame holds exactly `step * height` bytes and that each row
/// fits the image width.
pub fn validate_geometry(frame: &CapturedFrame) -> Result<()> {
    let expected = frame.step * frame.height as usize;
    if frame.data.len() != expected {
        return Err(CameraError::Validation(format!(
            "frame {} holds {} bytes, expected {expected}",
            frame.frame_id,
            frame.data.len()
        )));
    }
    if frame.step < frame.width as usize {
        return Err(CameraError::Validation(format!(
            "frame {} row of {} bytes is narrower than {} pixels",
            frame.frame_id, frame.step, frame.width
        )));
    }
    Ok(())
}

/// Check that a frame contains 100% color bars.
///
/// Samples the center of each of the 8 vertical bars on the middle row.
pub fn validate_color_bars(frame: &CapturedFrame) -> Result<()> {
    let bar_width = frame.width / 8;
    let center_y = frame.height / 2;

    for (bar, expected) in (0u32..).zip(COLOR_BARS) {
        let sample_x = bar * bar_width + bar_width / 2;

        let actual = frame.pixel_rgb(sample_x, center_y).ok_or_else(|| {
            CameraError::Validation(format!(
                "no {:?} pixel at ({sample_x}, {center_y})",
                frame.encoding
            ))
        })?;

        if !colors_match(actual, expected, COLOR_TOLERANCE) {
            return Err(CameraError::Validation(format!(
                "color bar {bar} at ({sample_x}, {center_y}): \
                 expected RGB{expected:?}, got RGB{actual:?}"
            )));
        }
    }

    Ok(())
}

/// Check that luminance rises from left to right along the middle row.
pub fn validate_gradient(frame: &CapturedFrame) -> Result<()> {
    let center_y = frame.height / 2;
    let mut first = None;
    let mut prev: Option<f32> = None;

    for x in (0..frame.width).step_by(10) {
        let rgb = frame.pixel_rgb(x, center_y).ok_or_else(|| {
            CameraError::Validation(format!("no {:?} pixel at ({x}, {center_y})", frame.encoding))
        })?;
        let luma = luminance(rgb);

        // Allow small decreases due to rounding
        if prev.is_some_and(|prev| luma < prev - 1.0) {
            return Err(CameraError::Validation(format!(
                "gradient falls at x={x}: luminance {luma}"
            )));
        }
        first.get_or_insert(luma);
        prev = Some(luma);
    }

    let range = prev.zip(first).map_or(0.0, |(last, first)| last - first);
    if range < MIN_GRADIENT_RANGE {
        return Err(CameraError::Validation(format!(
            "luminance only changes by {range} across the frame"
        )));
    }
    Ok(())
}

/// Check that frame ids strictly increase.
///
/// Gaps are allowed: a delivery that found no queued buffer or arrived
/// incomplete never reaches the consumer.
pub fn validate_frame_sequence(frames: &[CapturedFrame]) -> Result<()> {
    if frames.is_empty() {
        return Err(CameraError::Validation(
            "cannot validate an empty frame sequence".to_owned(),
        ));
    }

    for (index, pair) in frames.windows(2).enumerate() {
        if let [prev, curr] = pair {
            if curr.frame_id <= prev.frame_id {
                return Err(CameraError::Validation(format!(
                    "frame id went from {} to {} at index {}",
                    prev.frame_id,
                    curr.frame_id,
                    index + 1
                )));
            }
        }
    }

    Ok(())
}

/// Number of frame ids skipped between the first and last frame.
pub fn dropped_frames(frames: &[CapturedFrame]) -> u64 {
    match (frames.first(), frames.last()) {
        (Some(first), Some(last)) => {
            let span = last.frame_id.saturating_sub(first.frame_id) + 1;
            span.saturating_sub(frames.len() as u64)
        }
        _ => 0,
    }
}

/// Check that capture timestamps never go backwards.
pub fn validate_timestamps(frames: &[CapturedFrame]) -> Result<()> {
    for pair in frames.windows(2) {
        if let [prev, curr] = pair {
            if curr.stamp < prev.stamp {
                return Err(CameraError::Validation(format!(
                    "timestamp of frame {} ({:?}) precedes frame {} ({:?})",
                    curr.frame_id,
                    curr.stamp.as_duration(),
                    prev.frame_id,
                    prev.stamp.as_duration()
                )));
            }
        }
    }
    Ok(())
}
