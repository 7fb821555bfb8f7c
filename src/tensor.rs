// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Named tensors exchanged with the serving host.

use half::f16;
use ndarray::{Array4, ArrayD, Ix4};

use crate::error::{InferenceError, Result};

/// Tensor payload in one of the element types the host can deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    /// 16-bit floating point tensor.
    Float16(ArrayD<f16>),
    /// 32-bit floating point tensor.
    Float32(ArrayD<f32>),
    /// 64-bit floating point tensor.
    Float64(ArrayD<f64>),
}

impl TensorData {
    /// Get the shape of the tensor.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Float16(t) => t.shape(),
            Self::Float32(t) => t.shape(),
            Self::Float64(t) => t.shape(),
        }
    }

    /// Host data type name (`TYPE_FP16`, `TYPE_FP32`, `TYPE_FP64`).
    #[must_use]
    pub const fn data_type(&self) -> &'static str {
        match self {
            Self::Float16(_) => "TYPE_FP16",
            Self::Float32(_) => "TYPE_FP32",
            Self::Float64(_) => "TYPE_FP64",
        }
    }

    /// Convert to a rank-4 `f32` array `(batch, channels, height, width)`.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ShapeError`] if the tensor is not rank 4.
    pub fn to_f32_nchw(&self) -> Result<Array4<f32>> {
        let dynamic = match self {
            Self::Float16(t) => t.mapv(f16::to_f32),
            Self::Float32(t) => t.clone(),
            Self::Float64(t) => t.mapv(|v| v as f32),
        };
        let shape = dynamic.shape().to_vec();
        dynamic.into_dimensionality::<Ix4>().map_err(|_| {
            InferenceError::ShapeError(format!(
                "expected heatmaps with shape (batch, joints, height, width), got {shape:?}"
            ))
        })
    }
}

impl From<ArrayD<f32>> for TensorData {
    fn from(data: ArrayD<f32>) -> Self {
        Self::Float32(data)
    }
}

impl From<ArrayD<f16>> for TensorData {
    fn from(data: ArrayD<f16>) -> Self {
        Self::Float16(data)
    }
}

impl From<ArrayD<f64>> for TensorData {
    fn from(data: ArrayD<f64>) -> Self {
        Self::Float64(data)
    }
}

/// A tensor with the name the host addresses it by.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    name: String,
    data: TensorData,
}

impl Tensor {
    /// Create a named tensor.
    pub fn new(name: impl Into<String>, data: impl Into<TensorData>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Tensor name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tensor payload.
    #[must_use]
    pub const fn data(&self) -> &TensorData {
        &self.data
    }

    /// Borrow the payload as `f32`, if that is its element type.
    #[must_use]
    pub const fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match &self.data {
            TensorData::Float32(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_f16_conversion() {
        let data = ArrayD::from_elem(IxDyn(&[1, 2, 3, 4]), f16::from_f32(0.5));
        let tensor = TensorData::from(data);
        assert_eq!(tensor.data_type(), "TYPE_FP16");

        let nchw = tensor.to_f32_nchw().unwrap();
        assert_eq!(nchw.shape(), &[1, 2, 3, 4]);
        assert!(nchw.iter().all(|&v| (v - 0.5).abs() < f32::EPSILON));
    }

    #[test]
    fn test_f64_conversion() {
        let data = ArrayD::from_elem(IxDyn(&[2, 1, 2, 2]), 0.25_f64);
        let nchw = TensorData::from(data).to_f32_nchw().unwrap();
        assert_eq!(nchw.dim(), (2, 1, 2, 2));
    }

    #[test]
    fn test_wrong_rank_rejected() {
        let data = ArrayD::<f32>::zeros(IxDyn(&[2, 3, 4]));
        let err = TensorData::from(data).to_f32_nchw().unwrap_err();
        assert!(matches!(err, InferenceError::ShapeError(_)));
    }

    #[test]
    fn test_named_tensor() {
        let tensor = Tensor::new("post_input", ArrayD::<f32>::zeros(IxDyn(&[1, 1, 1, 1])));
        assert_eq!(tensor.name(), "post_input");
        assert!(tensor.as_f32().is_some());
        assert_eq!(tensor.data().shape(), &[1, 1, 1, 1]);
    }
}
