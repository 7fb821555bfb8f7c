// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Calibration tiling and heatmap-to-image coordinate mapping.
//!
//! Heatmap coordinates are mapped back into the original image with a
//! per-image center and scale. The serving model uses one calibration for the
//! whole batch, so the configured vectors are tiled to one row per image.

use ndarray::{Array2, ArrayView2, ArrayViewMut2, Axis};

use crate::error::{InferenceError, Result};

/// Repeat a 2-vector once per batch element.
///
/// # Arguments
///
/// * `value` - Calibration vector (`[x, y]` center or `[w, h]` scale).
/// * `batch` - Number of rows to produce.
///
/// # Returns
///
/// Array with shape `(batch, 2)`.
#[must_use]
pub fn tile_calibration(value: [f32; 2], batch: usize) -> Array2<f32> {
    Array2::from_shape_fn((batch, 2), |(_, j)| value[j])
}

/// Map one image's keypoints from heatmap space into image space, in place.
///
/// With `s = scale * pixel_std`, each coordinate becomes
/// `x * s.x / W + c.x - s.x / 2` (and likewise for y). Under UDP the divisor
/// is `W - 1` / `H - 1` so heatmap corners land on image corners.
///
/// # Arguments
///
/// * `coords` - Keypoints with shape `(joints, 2)`, updated in place.
/// * `center` - Calibration center `[x, y]`.
/// * `scale` - Calibration scale `[w, h]`.
/// * `pixel_std` - Multiplier applied to `scale`.
/// * `heatmap_size` - Heatmap size as (width, height).
/// * `use_udp` - Use the unbiased corner-aligned mapping.
#[allow(clippy::similar_names)]
pub fn transform_preds(
    mut coords: ArrayViewMut2<'_, f32>,
    center: [f32; 2],
    scale: [f32; 2],
    pixel_std: f32,
    heatmap_size: (usize, usize),
    use_udp: bool,
) {
    let (width, height) = heatmap_size;
    let scale_px = [scale[0] * pixel_std, scale[1] * pixel_std];

    let (scale_x, scale_y) = if use_udp {
        (
            scale_px[0] / (width as f32 - 1.0),
            scale_px[1] / (height as f32 - 1.0),
        )
    } else {
        (scale_px[0] / width as f32, scale_px[1] / height as f32)
    };

    for mut point in coords.axis_iter_mut(Axis(0)) {
        point[0] = point[0] * scale_x + center[0] - scale_px[0] * 0.5;
        point[1] = point[1] * scale_y + center[1] - scale_px[1] * 0.5;
    }
}

/// Check that per-image calibration arrays match the batch size.
///
/// # Errors
///
/// Returns [`InferenceError::ShapeError`] if either array is not `(batch, 2)`.
pub fn check_calibration(
    center: ArrayView2<'_, f32>,
    scale: ArrayView2<'_, f32>,
    batch: usize,
) -> Result<()> {
    for (name, arr) in [("center", center.reborrow()), ("scale", scale.reborrow())] {
        if arr.dim() != (batch, 2) {
            return Err(InferenceError::ShapeError(format!(
                "{name} must have shape ({batch}, 2), got {:?}",
                arr.shape()
            )));
        }
    }
    Ok(())
}
