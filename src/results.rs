// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Decoded keypoint output.

use ndarray::{Array2, Array3, s};

/// Keypoints decoded from a batch of heatmaps.
#[derive(Debug, Clone, PartialEq)]
pub struct Keypoints {
    /// Image-space coordinates with shape (N, K, 2).
    pub coords: Array3<f32>,
    /// Per-joint confidence (heatmap maximum) with shape (N, K).
    pub maxvals: Array2<f32>,
}

impl Keypoints {
    /// Create a new `Keypoints` instance.
    ///
    /// # Arguments
    ///
    /// * `coords` - Coordinates with shape (N, K, 2).
    /// * `maxvals` - Confidences with shape (N, K).
    #[must_use]
    pub const fn new(coords: Array3<f32>, maxvals: Array2<f32>) -> Self {
        Self { coords, maxvals }
    }

    /// Number of images in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.coords.shape()[0]
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of joints per image.
    #[must_use]
    pub fn num_joints(&self) -> usize {
        self.coords.shape()[1]
    }

    /// Build the output tensor layout: (N, K, 2), or (N, K, 3) with the
    /// confidence as the last channel.
    #[must_use]
    pub fn to_output(&self, include_confidence: bool) -> Array3<f32> {
        if !include_confidence {
            return self.coords.clone();
        }
        let (n, k, _) = self.coords.dim();
        let mut out = Array3::<f32>::zeros((n, k, 3));
        out.slice_mut(s![.., .., 0..2]).assign(&self.coords);
        out.slice_mut(s![.., .., 2]).assign(&self.maxvals);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Keypoints {
        let coords = Array3::from_shape_fn((2, 3, 2), |(n, k, c)| (n * 100 + k * 10 + c) as f32);
        let maxvals = Array2::from_shape_fn((2, 3), |(n, k)| (n * 3 + k) as f32 / 10.0);
        Keypoints::new(coords, maxvals)
    }

    #[test]
    fn test_len_and_joints() {
        let kpts = sample();
        assert_eq!(kpts.len(), 2);
        assert_eq!(kpts.num_joints(), 3);
        assert!(!kpts.is_empty());
    }

    #[test]
    fn test_output_without_confidence() {
        let out = sample().to_output(false);
        assert_eq!(out.shape(), &[2, 3, 2]);
        assert_eq!(out[[1, 2, 1]], 121.0);
    }

    #[test]
    fn test_output_with_confidence() {
        let out = sample().to_output(true);
        assert_eq!(out.shape(), &[2, 3, 3]);
        assert_eq!(out[[1, 2, 0]], 120.0);
        assert!((out[[1, 2, 2]] - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_empty() {
        let kpts = Keypoints::new(Array3::zeros((0, 17, 2)), Array2::zeros((0, 17)));
        assert!(kpts.is_empty());
        assert_eq!(kpts.to_output(true).shape(), &[0, 17, 3]);
    }
}
