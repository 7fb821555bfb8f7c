// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Heatmap-to-keypoint decoding.
//!
//! Top-down pose networks emit one probability map per joint. Decoding takes
//! the argmax of each map, refines it to sub-pixel accuracy, and maps the
//! result back into original image coordinates with the per-image center and
//! scale.
//!
//! Refinement strategies:
//!
//! | `use_udp` | `target_type` | `post_process` | Refinement |
//! |-----------|---------------|----------------|------------|
//! | `true` | `GaussianHeatmap` | any | DARK on the blurred log-map, edge-padded |
//! | `true` | `CombinedTarget` | any | argmax + learned offset maps |
//! | `false` | `GaussianHeatmap` | `Unbiased` | Taylor step on the blurred log-map |
//! | `false` | `GaussianHeatmap` | `Default` / `Megvii` | quarter-pixel shift |
//! | `false` | `GaussianHeatmap` | `None` | none |

use ndarray::{Array2, Array3, Array4, ArrayView2, ArrayView4, ArrayViewMut1, Axis, s};

use crate::config::{DecodeConfig, PostProcess, TargetType};
use crate::error::{InferenceError, Result};
use crate::results::Keypoints;
use crate::transform::{check_calibration, transform_preds};
use crate::utils::{gaussian_blur, gaussian_blur_preserve_max, solve_2x2};

/// Lower clamp before taking the log in UDP refinement.
const UDP_LOG_MIN: f32 = 0.001;

/// Upper clamp before taking the log in UDP refinement.
const UDP_LOG_MAX: f32 = 50.0;

/// Lower clamp before taking the log in Taylor refinement.
const TAYLOR_LOG_MIN: f32 = 1e-10;

/// Decode a batch of heatmaps into image-space keypoints.
///
/// # Arguments
///
/// * `heatmaps` - Heatmaps with shape (N, K, H, W), or (N, 3K, H, W) for combined targets.
/// * `center` - Per-image calibration centers with shape (N, 2).
/// * `scale` - Per-image calibration scales with shape (N, 2).
/// * `config` - Decoding options.
///
/// # Returns
///
/// Keypoints with coordinates (N, K, 2) and confidences (N, K).
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the heatmaps have a zero
/// spatial size (or a side shorter than 2 under UDP), the calibration rows do
/// not match the batch, or a combined target does not have a multiple of three
/// channels.
pub fn keypoints_from_heatmaps(
    heatmaps: ArrayView4<'_, f32>,
    center: ArrayView2<'_, f32>,
    scale: ArrayView2<'_, f32>,
    config: &DecodeConfig,
) -> Result<Keypoints> {
    config.validate()?;

    let (batch, channels, height, width) = heatmaps.dim();
    if height == 0 || width == 0 {
        return Err(InferenceError::ShapeError(format!(
            "heatmaps must have a non-empty spatial size, got {height}x{width}"
        )));
    }
    if config.use_udp && (height < 2 || width < 2) {
        return Err(InferenceError::ShapeError(format!(
            "UDP decoding needs heatmaps of at least 2x2, got {height}x{width}"
        )));
    }
    check_calibration(center, scale, batch)?;

    // Megvii decoding runs every other step on the smoothed maps.
    let smoothed;
    let heatmaps = if config.post_process == PostProcess::Megvii {
        smoothed = blur_maps(heatmaps, |_| config.kernel, true);
        smoothed.view()
    } else {
        heatmaps.reborrow()
    };

    let (mut coords, mut maxvals) = if config.use_udp {
        match config.target_type {
            TargetType::GaussianHeatmap => {
                let (mut coords, maxvals) = get_max_preds(heatmaps);
                refine_dark_udp(&mut coords, heatmaps, config.kernel);
                (coords, maxvals)
            }
            TargetType::CombinedTarget => {
                let per_joint = config.target_type.channels_per_joint();
                if channels % per_joint != 0 {
                    return Err(InferenceError::ShapeError(format!(
                        "combined target needs a multiple of {per_joint} channels, got {channels}"
                    )));
                }
                decode_combined_target(heatmaps, config.kernel, config.valid_radius_factor)
            }
        }
    } else {
        let (mut coords, maxvals) = get_max_preds(heatmaps);
        match config.post_process {
            PostProcess::Unbiased => refine_taylor(&mut coords, heatmaps, config.kernel),
            PostProcess::Default => refine_quarter_offset(&mut coords, heatmaps, false),
            PostProcess::Megvii => refine_quarter_offset(&mut coords, heatmaps, true),
            PostProcess::None => {}
        }
        (coords, maxvals)
    };

    for (n, image_coords) in coords.axis_iter_mut(Axis(0)).enumerate() {
        transform_preds(
            image_coords,
            [center[[n, 0]], center[[n, 1]]],
            [scale[[n, 0]], scale[[n, 1]]],
            config.pixel_std,
            (width, height),
            config.use_udp,
        );
    }

    if config.post_process == PostProcess::Megvii {
        maxvals.mapv_inplace(|v| v / 255.0 + 0.5);
    }

    Ok(Keypoints::new(coords, maxvals))
}

/// Locate the maximum of every heatmap.
///
/// Coordinates are the integer `(x, y)` of the first maximum in row-major
/// order; maps whose maximum is not positive get `(-1, -1)`. NaN never wins.
///
/// # Returns
///
/// Coordinates with shape (N, K, 2) and maxima with shape (N, K).
#[must_use]
pub fn get_max_preds(heatmaps: ArrayView4<'_, f32>) -> (Array3<f32>, Array2<f32>) {
    let (batch, joints, _, width) = heatmaps.dim();
    let mut coords = Array3::<f32>::zeros((batch, joints, 2));
    let mut maxvals = Array2::<f32>::zeros((batch, joints));

    for n in 0..batch {
        for k in 0..joints {
            let map = heatmaps.slice(s![n, k, .., ..]);
            let (idx, maxval) = map.iter().enumerate().fold(
                (0_usize, f32::NEG_INFINITY),
                |(best_idx, best), (i, &v)| if v > best { (i, v) } else { (best_idx, best) },
            );

            maxvals[[n, k]] = maxval;
            if maxval > 0.0 {
                coords[[n, k, 0]] = (idx % width) as f32;
                coords[[n, k, 1]] = (idx / width) as f32;
            } else {
                coords[[n, k, 0]] = -1.0;
                coords[[n, k, 1]] = -1.0;
            }
        }
    }

    (coords, maxvals)
}

/// Blur every map of the batch, choosing the kernel size per channel.
fn blur_maps(
    heatmaps: ArrayView4<'_, f32>,
    kernel_for_channel: impl Fn(usize) -> usize,
    preserve_max: bool,
) -> Array4<f32> {
    let mut out = heatmaps.to_owned();
    for mut image in out.axis_iter_mut(Axis(0)) {
        for (c, mut map) in image.axis_iter_mut(Axis(0)).enumerate() {
            let ksize = kernel_for_channel(c);
            let blurred = if preserve_max {
                gaussian_blur_preserve_max(map.view(), ksize)
            } else {
                gaussian_blur(map.view(), ksize)
            };
            map.assign(&blurred);
        }
    }
    out
}

/// Integer pixel position of a decoded keypoint, `None` for invalid ones.
fn pixel_of(point: &ArrayViewMut1<'_, f32>) -> Option<(usize, usize)> {
    let (x, y) = (point[0], point[1]);
    (x >= 0.0 && y >= 0.0).then_some((x as usize, y as usize))
}

/// Shift each keypoint a quarter pixel toward its higher neighbour.
///
/// Applies only to maxima at least two pixels away from the border; `megvii`
/// also adds half a pixel to refined keypoints.
fn refine_quarter_offset(coords: &mut Array3<f32>, heatmaps: ArrayView4<'_, f32>, megvii: bool) {
    let (_, _, height, width) = heatmaps.dim();

    for (n, mut image_coords) in coords.axis_iter_mut(Axis(0)).enumerate() {
        for (k, mut point) in image_coords.axis_iter_mut(Axis(0)).enumerate() {
            let Some((px, py)) = pixel_of(&point) else {
                continue;
            };
            if !(px > 1 && px + 1 < width && py > 1 && py + 1 < height) {
                continue;
            }

            let map = heatmaps.slice(s![n, k, .., ..]);
            let diff = [
                map[[py, px + 1]] - map[[py, px - 1]],
                map[[py + 1, px]] - map[[py - 1, px]],
            ];
            point[0] += sign(diff[0]) * 0.25;
            point[1] += sign(diff[1]) * 0.25;
            if megvii {
                point[0] += 0.5;
                point[1] += 0.5;
            }
        }
    }
}

/// Distribution-aware refinement: a second-order Taylor step on the log of
/// the blurred heatmap around the argmax.
fn refine_taylor(coords: &mut Array3<f32>, heatmaps: ArrayView4<'_, f32>, kernel: usize) {
    let (_, _, height, width) = heatmaps.dim();
    let mut log_maps = blur_maps(heatmaps, |_| kernel, true);
    log_maps.mapv_inplace(|v| v.max(TAYLOR_LOG_MIN).ln());

    for (n, mut image_coords) in coords.axis_iter_mut(Axis(0)).enumerate() {
        for (k, mut point) in image_coords.axis_iter_mut(Axis(0)).enumerate() {
            let Some((px, py)) = pixel_of(&point) else {
                continue;
            };
            if !(px > 1 && px + 2 < width && py > 1 && py + 2 < height) {
                continue;
            }

            let hm = log_maps.slice(s![n, k, .., ..]);
            let dx = 0.5 * (hm[[py, px + 1]] - hm[[py, px - 1]]);
            let dy = 0.5 * (hm[[py + 1, px]] - hm[[py - 1, px]]);
            let dxx = 0.25 * (hm[[py, px + 2]] - 2.0 * hm[[py, px]] + hm[[py, px - 2]]);
            let dxy = 0.25
                * (hm[[py + 1, px + 1]] - hm[[py - 1, px + 1]] - hm[[py + 1, px - 1]]
                    + hm[[py - 1, px - 1]]);
            let dyy = 0.25 * (hm[[py + 2, px]] - 2.0 * hm[[py, px]] + hm[[py - 2, px]]);

            if let Some(step) = solve_2x2([[dxx, dxy], [dxy, dyy]], [dx, dy]) {
                point[0] -= step[0];
                point[1] -= step[1];
            }
        }
    }
}

/// DARK refinement for UDP-encoded heatmaps.
///
/// Each map is blurred, clamped to `[0.001, 50]` and log-transformed;
/// derivatives are taken with edge replication at the border.
fn refine_dark_udp(coords: &mut Array3<f32>, heatmaps: ArrayView4<'_, f32>, kernel: usize) {
    let (_, _, height, width) = heatmaps.dim();
    let mut log_maps = blur_maps(heatmaps, |_| kernel, false);
    log_maps.mapv_inplace(|v| v.clamp(UDP_LOG_MIN, UDP_LOG_MAX).ln());

    for (n, mut image_coords) in coords.axis_iter_mut(Axis(0)).enumerate() {
        for (k, mut point) in image_coords.axis_iter_mut(Axis(0)).enumerate() {
            let Some((px, py)) = pixel_of(&point) else {
                continue;
            };

            let hm = log_maps.slice(s![n, k, .., ..]);
            let at = |ox: isize, oy: isize| {
                let x = (px as isize + ox).clamp(0, width as isize - 1) as usize;
                let y = (py as isize + oy).clamp(0, height as isize - 1) as usize;
                hm[[y, x]]
            };

            let i = at(0, 0);
            let ix1 = at(1, 0);
            let iy1 = at(0, 1);
            let ix1y1 = at(1, 1);
            let ix1_y1_ = at(-1, -1);
            let ix1_ = at(-1, 0);
            let iy1_ = at(0, -1);

            let dx = 0.5 * (ix1 - ix1_);
            let dy = 0.5 * (iy1 - iy1_);
            let dxx = ix1 - 2.0 * i + ix1_;
            let dyy = iy1 - 2.0 * i + iy1_;
            let dxy = 0.5 * (ix1y1 - ix1 - iy1 + i + i - ix1_ - iy1_ + ix1_y1_);

            let hessian = [[dxx + f32::EPSILON, dxy], [dxy, dyy + f32::EPSILON]];
            if let Some(step) = solve_2x2(hessian, [dx, dy]) {
                point[0] -= step[0];
                point[1] -= step[1];
            }
        }
    }
}

/// Decode combined targets: channel triples of (heatmap, x offset, y offset).
///
/// Heatmaps are blurred with `2 * kernel + 1`, offsets with `kernel`; the
/// offset maps are read at the heatmap argmax and scaled by
/// `valid_radius_factor * H`.
fn decode_combined_target(
    heatmaps: ArrayView4<'_, f32>,
    kernel: usize,
    valid_radius_factor: f32,
) -> (Array3<f32>, Array2<f32>) {
    let (_, _, height, _) = heatmaps.dim();
    let blurred = blur_maps(
        heatmaps,
        |c| if c % 3 == 0 { 2 * kernel + 1 } else { kernel },
        false,
    );
    let valid_radius = valid_radius_factor * height as f32;

    let heat = blurred.slice(s![.., ..;3, .., ..]);
    let offset_x = blurred.slice(s![.., 1..;3, .., ..]);
    let offset_y = blurred.slice(s![.., 2..;3, .., ..]);

    let (mut coords, maxvals) = get_max_preds(heat);
    for (n, mut image_coords) in coords.axis_iter_mut(Axis(0)).enumerate() {
        for (k, mut point) in image_coords.axis_iter_mut(Axis(0)).enumerate() {
            let Some((px, py)) = pixel_of(&point) else {
                continue;
            };
            point[0] += offset_x[[n, k, py, px]] * valid_radius;
            point[1] += offset_y[[n, k, py, px]] * valid_radius;
        }
    }

    (coords, maxvals)
}

/// `numpy.sign` for a single value.
fn sign(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}
