// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]

//! # Heatmap Post-processing Model
//!
//! Serving-side post-processing for top-down pose estimation. The pose network
//! emits one heatmap per joint; this model turns a batch of heatmaps into
//! keypoint coordinates in original image space.
//!
//! ## Serving Lifecycle
//!
//! The host drives the model through [`ServingModel`]:
//!
//! 1. `initialize(args)` parses the JSON model configuration and device placement.
//! 2. `execute(requests)` decodes each request's `post_input` heatmaps
//!    `(batch, joints, height, width)` into a `post_output` tensor
//!    `(batch, joints, 2)` (or `3` with confidence).
//! 3. `finalize()` logs and returns.
//!
//! ```rust
//! use std::collections::HashMap;
//!
//! use heatmap_postprocess::{HeatmapPostprocessor, InferenceRequest, ServingModel, Tensor};
//! use ndarray::{ArrayD, IxDyn};
//!
//! let args = HashMap::from([
//!     ("model_config".to_string(), r#"{"name": "postprocess"}"#.to_string()),
//!     ("model_instance_kind".to_string(), "KIND_CPU".to_string()),
//!     ("model_instance_device_id".to_string(), "0".to_string()),
//! ]);
//! let model = HeatmapPostprocessor::initialize(&args)?;
//!
//! let heatmaps = ArrayD::<f32>::zeros(IxDyn(&[4, 17, 64, 48]));
//! let request = InferenceRequest::new(vec![Tensor::new("post_input", heatmaps)]);
//! let responses = model.execute(&[request])?;
//! assert_eq!(responses.len(), 1);
//!
//! model.finalize();
//! # Ok::<(), heatmap_postprocess::InferenceError>(())
//! ```
//!
//! ## Decoding
//!
//! [`keypoints_from_heatmaps`] can be used directly with per-image
//! calibration:
//!
//! ```rust
//! use heatmap_postprocess::{DecodeConfig, keypoints_from_heatmaps, tile_calibration};
//! use ndarray::Array4;
//!
//! let mut heatmaps = Array4::<f32>::zeros((1, 1, 64, 48));
//! heatmaps[[0, 0, 32, 24]] = 1.0;
//!
//! let center = tile_calibration([96.0, 128.0], 1);
//! let scale = tile_calibration([192.0, 256.0], 1);
//! let config = DecodeConfig::new().with_udp(false);
//!
//! let keypoints = keypoints_from_heatmaps(heatmaps.view(), center.view(), scale.view(), &config)?;
//! assert_eq!(keypoints.coords[[0, 0, 0]], 96.0);
//! assert_eq!(keypoints.coords[[0, 0, 1]], 128.0);
//! # Ok::<(), heatmap_postprocess::InferenceError>(())
//! ```
//!
//! ## Model Parameters
//!
//! | Parameter | Description | Default |
//! |-----------|-------------|---------|
//! | `center` | Calibration center `x,y` | `128,96` |
//! | `scale` | Calibration scale `w,h` | `192,256` |
//! | `pixel_std` | Multiplier applied to `scale` | `1.0` |
//! | `use_udp` | Unbiased data processing | `true` |
//! | `post_process` | `default`, `unbiased`, `megvii`, `none` | `default` |
//! | `kernel` | Odd Gaussian kernel size | `11` |
//! | `valid_radius_factor` | Combined-target offset radius | `0.0546875` |
//! | `target_type` | `gaussian_heatmap`, `combined_target` | `gaussian_heatmap` |
//! | `include_confidence` | Append confidence to the output | `false` |
//! | `verbose` | Verbose logging | `false` |
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`backend`] | [`HeatmapPostprocessor`] and the [`ServingModel`] lifecycle |
//! | [`decode`] | Heatmap argmax, sub-pixel refinement, back-projection |
//! | [`config`] | [`DecodeConfig`] builder |
//! | [`model_config`] | Host JSON configuration parsing |
//! | [`tensor`] | Named FP16/FP32/FP64 tensors |
//! | [`results`] | [`Keypoints`] output |
//! | [`error`] | Error types ([`InferenceError`], [`Result`]) |

// Modules
pub mod backend;
pub mod config;
pub mod decode;
pub mod device;
pub mod error;
pub mod logging;
pub mod model_config;
pub mod results;
pub mod tensor;
pub mod transform;
pub mod utils;

// Re-export main types for convenience
pub use backend::{HeatmapPostprocessor, InferenceRequest, InferenceResponse, ServingModel};
pub use config::{DecodeConfig, PostProcess, TargetType};
pub use decode::{get_max_preds, keypoints_from_heatmaps};
pub use device::Device;
pub use error::{InferenceError, Result};
pub use model_config::ModelConfig;
pub use results::Keypoints;
pub use tensor::{Tensor, TensorData};
pub use transform::{tile_calibration, transform_preds};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "heatmap-postprocess");
    }
}
