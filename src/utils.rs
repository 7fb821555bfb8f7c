// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Numerical helpers for heatmap refinement

use ndarray::{Array2, ArrayView2, s};

/// Fixed binomial kernels used for small apertures when sigma is derived from
/// the kernel size.
const SMALL_GAUSSIAN_KERNELS: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[0.031_25, 0.109_375, 0.218_75, 0.281_25, 0.218_75, 0.109_375, 0.031_25],
];

/// Build a normalized 1-D Gaussian kernel of odd size `ksize`.
///
/// Sigma is derived from the size as `0.3 * ((ksize - 1) * 0.5 - 1) + 0.8`;
/// sizes up to 7 use the fixed binomial tables instead.
///
/// # Arguments
///
/// * `ksize` - Odd kernel size.
///
/// # Returns
///
/// Kernel weights summing to 1.
#[must_use]
pub fn gaussian_kernel(ksize: usize) -> Vec<f32> {
    if ksize % 2 == 1 && ksize <= 7 {
        return SMALL_GAUSSIAN_KERNELS[ksize / 2].to_vec();
    }

    let sigma = 0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let scale = -0.5 / (sigma * sigma);
    let center = (ksize as f64 - 1.0) * 0.5;

    let weights: Vec<f64> = (0..ksize)
        .map(|i| {
            let x = i as f64 - center;
            (scale * x * x).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();

    weights.iter().map(|w| (w / sum) as f32).collect()
}

/// Map an out-of-range index back into `0..len` using reflect-101 borders
/// (`gfedcb|abcdefgh|gfedcba`).
fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let len = len as isize;
    let mut i = index;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= len {
            i = 2 * (len - 1) - i;
        } else {
            return i as usize;
        }
    }
}

/// Separable Gaussian blur with reflect-101 border handling.
///
/// # Arguments
///
/// * `map` - 2-D map (height, width).
/// * `ksize` - Odd kernel size.
///
/// # Returns
///
/// Blurred map with the same shape.
#[must_use]
pub fn gaussian_blur(map: ArrayView2<'_, f32>, ksize: usize) -> Array2<f32> {
    let (height, width) = map.dim();
    if height == 0 || width == 0 || ksize <= 1 {
        return map.to_owned();
    }

    let kernel = gaussian_kernel(ksize);
    let radius = (ksize / 2) as isize;

    let mut horizontal = Array2::<f32>::zeros((height, width));
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0_f32;
            for (k, w) in kernel.iter().enumerate() {
                let sx = reflect_101(x as isize + k as isize - radius, width);
                acc += w * map[[y, sx]];
            }
            horizontal[[y, x]] = acc;
        }
    }

    let mut out = Array2::<f32>::zeros((height, width));
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0_f32;
            for (k, w) in kernel.iter().enumerate() {
                let sy = reflect_101(y as isize + k as isize - radius, height);
                acc += w * horizontal[[sy, x]];
            }
            out[[y, x]] = acc;
        }
    }

    out
}

/// Gaussian blur on a zero-padded copy of the map, rescaled so the blurred
/// map keeps the original maximum.
///
/// A map whose blurred maximum is not positive is returned blurred but
/// unscaled.
#[must_use]
pub fn gaussian_blur_preserve_max(map: ArrayView2<'_, f32>, ksize: usize) -> Array2<f32> {
    let (height, width) = map.dim();
    let border = ksize.saturating_sub(1) / 2;
    let origin_max = max_value(map);

    let mut padded = Array2::<f32>::zeros((height + 2 * border, width + 2 * border));
    padded
        .slice_mut(s![border..border + height, border..border + width])
        .assign(&map);

    let blurred = gaussian_blur(padded.view(), ksize);
    let mut out = blurred
        .slice(s![border..border + height, border..border + width])
        .to_owned();

    let blurred_max = max_value(out.view());
    if blurred_max > 0.0 && blurred_max.is_finite() {
        let ratio = origin_max / blurred_max;
        out.mapv_inplace(|v| v * ratio);
    }
    out
}

/// Maximum of a map, ignoring NaN. Returns negative infinity for an empty or all-NaN map.
#[must_use]
pub fn max_value(map: ArrayView2<'_, f32>) -> f32 {
    map.iter()
        .fold(f32::NEG_INFINITY, |acc, &v| if v > acc { v } else { acc })
}

/// Solve `h * x = g` for a symmetric 2x2 system.
///
/// # Arguments
///
/// * `h` - Matrix `[[a, b], [c, d]]`.
/// * `g` - Right-hand side.
///
/// # Returns
///
/// `None` if the matrix is singular or the solution is not finite.
#[must_use]
pub fn solve_2x2(h: [[f32; 2]; 2], g: [f32; 2]) -> Option<[f32; 2]> {
    let det = h[0][0] * h[1][1] - h[0][1] * h[1][0];
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let x = (h[1][1] * g[0] - h[0][1] * g[1]) / det;
    let y = (h[0][0] * g[1] - h[1][0] * g[0]) / det;
    (x.is_finite() && y.is_finite()).then_some([x, y])
}
