// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Decoding configuration and common types.
//!
//! This module defines [`DecodeConfig`], which controls how heatmaps are turned
//! into keypoints: the calibration constants used to map heatmap pixels back to
//! image space, the sub-pixel refinement strategy, and the output layout.

use std::fmt;
use std::str::FromStr;

use crate::error::{InferenceError, Result};

/// Default calibration center `[x, y]` for the bundled pose model.
pub const DEFAULT_CENTER: [f32; 2] = [128.0, 96.0];

/// Default calibration scale `[w, h]` for the bundled pose model.
///
/// Expressed in pixels with `pixel_std = 1.0`. Decoders that follow the
/// 200-pixel convention multiply the scale by 200 instead, so their
/// coordinates differ from these defaults unless `pixel_std` is set to 200.
pub const DEFAULT_SCALE: [f32; 2] = [192.0, 256.0];

/// Default Gaussian kernel size used by blur-based refinement.
pub const DEFAULT_KERNEL: usize = 11;

/// Largest accepted Gaussian kernel size.
pub const MAX_KERNEL: usize = 255;

/// Default radius factor for combined-target offset maps.
pub const DEFAULT_VALID_RADIUS_FACTOR: f32 = 0.054_687_5;

/// Sub-pixel refinement applied after the argmax when UDP is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PostProcess {
    /// Quarter-pixel shift toward the higher neighbour.
    #[default]
    Default,
    /// Distribution-aware Taylor refinement on the blurred log-heatmap.
    Unbiased,
    /// Quarter-pixel shift plus a half-pixel offset, with rescaled confidences.
    Megvii,
    /// Raw integer argmax.
    None,
}

impl PostProcess {
    /// Returns the string representation used in model parameters.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Unbiased => "unbiased",
            Self::Megvii => "megvii",
            Self::None => "none",
        }
    }
}

impl fmt::Display for PostProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PostProcess {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "unbiased" | "dark" => Ok(Self::Unbiased),
            "megvii" => Ok(Self::Megvii),
            "none" | "" => Ok(Self::None),
            _ => Err(InferenceError::ConfigError(format!(
                "invalid post_process '{s}', expected one of: default, unbiased, megvii, none"
            ))),
        }
    }
}

/// Heatmap target encoding the network was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TargetType {
    /// One Gaussian heatmap per joint.
    #[default]
    GaussianHeatmap,
    /// Three channels per joint: heatmap, x offset, y offset.
    CombinedTarget,
}

impl TargetType {
    /// Returns the string representation used in model parameters.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GaussianHeatmap => "gaussian_heatmap",
            Self::CombinedTarget => "combined_target",
        }
    }

    /// Number of input channels consumed per joint.
    #[must_use]
    pub const fn channels_per_joint(&self) -> usize {
        match self {
            Self::GaussianHeatmap => 1,
            Self::CombinedTarget => 3,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "gaussianheatmap" | "heatmap" => Ok(Self::GaussianHeatmap),
            "combinedtarget" | "combined" => Ok(Self::CombinedTarget),
            _ => Err(InferenceError::ConfigError(format!(
                "invalid target_type '{s}', expected one of: gaussian_heatmap, combined_target"
            ))),
        }
    }
}

/// Configuration for heatmap decoding.
///
/// Uses a builder pattern for convenient construction.
///
/// # Example
///
/// ```rust
/// use heatmap_postprocess::{DecodeConfig, PostProcess};
///
/// let config = DecodeConfig::new()
///     .with_center(96.0, 128.0)
///     .with_scale(192.0, 256.0)
///     .with_udp(false)
///     .with_post_process(PostProcess::Unbiased)
///     .with_kernel(11);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeConfig {
    /// Calibration center `[x, y]` in original image pixels.
    pub center: [f32; 2],
    /// Calibration scale `[w, h]`, multiplied by `pixel_std` before use.
    pub scale: [f32; 2],
    /// Multiplier applied to `scale` (200.0 for scales in 200-pixel units).
    pub pixel_std: f32,
    /// Use unbiased data processing for refinement and back-projection.
    pub use_udp: bool,
    /// Refinement strategy when `use_udp` is false.
    pub post_process: PostProcess,
    /// Odd Gaussian kernel size for blur-based refinement.
    pub kernel: usize,
    /// Offset radius as a fraction of heatmap height (combined targets only).
    pub valid_radius_factor: f32,
    /// Heatmap encoding.
    pub target_type: TargetType,
    /// Append the confidence as a third channel of the output tensor.
    pub include_confidence: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            center: DEFAULT_CENTER,
            scale: DEFAULT_SCALE,
            pixel_std: 1.0,
            use_udp: true,
            post_process: PostProcess::Default,
            kernel: DEFAULT_KERNEL,
            valid_radius_factor: DEFAULT_VALID_RADIUS_FACTOR,
            target_type: TargetType::GaussianHeatmap,
            include_confidence: false,
        }
    }
}

impl DecodeConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the calibration center.
    #[must_use]
    pub const fn with_center(mut self, x: f32, y: f32) -> Self {
        self.center = [x, y];
        self
    }

    /// Set the calibration scale.
    #[must_use]
    pub const fn with_scale(mut self, w: f32, h: f32) -> Self {
        self.scale = [w, h];
        self
    }

    /// Set the pixel standard multiplier applied to the scale.
    #[must_use]
    pub const fn with_pixel_std(mut self, pixel_std: f32) -> Self {
        self.pixel_std = pixel_std;
        self
    }

    /// Enable or disable unbiased data processing.
    #[must_use]
    pub const fn with_udp(mut self, use_udp: bool) -> Self {
        self.use_udp = use_udp;
        self
    }

    /// Set the refinement strategy used when UDP is disabled.
    #[must_use]
    pub const fn with_post_process(mut self, post_process: PostProcess) -> Self {
        self.post_process = post_process;
        self
    }

    /// Set the Gaussian kernel size.
    #[must_use]
    pub const fn with_kernel(mut self, kernel: usize) -> Self {
        self.kernel = kernel;
        self
    }

    /// Set the combined-target offset radius factor.
    #[must_use]
    pub const fn with_valid_radius_factor(mut self, factor: f32) -> Self {
        self.valid_radius_factor = factor;
        self
    }

    /// Set the heatmap target encoding.
    #[must_use]
    pub const fn with_target_type(mut self, target_type: TargetType) -> Self {
        self.target_type = target_type;
        self
    }

    /// Include confidences in the output tensor.
    #[must_use]
    pub const fn with_confidence(mut self, include: bool) -> Self {
        self.include_confidence = include;
        self
    }

    /// Check the configuration for values the decoder cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ConfigError`] for an even, zero or oversized
    /// kernel, non-finite calibration values, a non-positive scale, a combined
    /// target without UDP, or megvii post-processing with UDP.
    pub fn validate(&self) -> Result<()> {
        if self.kernel == 0 || self.kernel % 2 == 0 {
            return Err(InferenceError::ConfigError(format!(
                "kernel must be a positive odd integer, got {}",
                self.kernel
            )));
        }
        if self.kernel > MAX_KERNEL {
            return Err(InferenceError::ConfigError(format!(
                "kernel must be at most {MAX_KERNEL}, got {}",
                self.kernel
            )));
        }
        if !self.center.iter().all(|v| v.is_finite()) {
            return Err(InferenceError::ConfigError(format!(
                "center must be finite, got {:?}",
                self.center
            )));
        }
        if !self.scale.iter().all(|v| v.is_finite() && *v > 0.0) {
            return Err(InferenceError::ConfigError(format!(
                "scale must be positive, got {:?}",
                self.scale
            )));
        }
        if self.target_type == TargetType::CombinedTarget && !self.use_udp {
            return Err(InferenceError::ConfigError(
                "combined_target decoding requires use_udp".to_string(),
            ));
        }
        if self.post_process == PostProcess::Megvii && self.use_udp {
            return Err(InferenceError::ConfigError(
                "megvii post-processing cannot be combined with use_udp".to_string(),
            ));
        }
        if !(self.pixel_std.is_finite() && self.pixel_std > 0.0) {
            return Err(InferenceError::ConfigError(format!(
                "pixel_std must be positive, got {}",
                self.pixel_std
            )));
        }
        Ok(())
    }

    /// Width of the last output axis: 2 for `(x, y)`, 3 with confidence.
    #[must_use]
    pub const fn output_dim(&self) -> usize {
        if self.include_confidence { 3 } else { 2 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = DecodeConfig::default();
        assert_eq!(config.center, [128.0, 96.0]);
        assert_eq!(config.scale, [192.0, 256.0]);
        assert!(config.use_udp);
        assert_eq!(config.kernel, 11);
        assert_eq!(config.output_dim(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = DecodeConfig::new()
            .with_center(10.0, 20.0)
            .with_scale(30.0, 40.0)
            .with_pixel_std(200.0)
            .with_udp(false)
            .with_post_process(PostProcess::Megvii)
            .with_kernel(3)
            .with_target_type(TargetType::CombinedTarget)
            .with_confidence(true);

        assert_eq!(config.center, [10.0, 20.0]);
        assert_eq!(config.scale, [30.0, 40.0]);
        assert!((config.pixel_std - 200.0).abs() < f32::EPSILON);
        assert!(!config.use_udp);
        assert_eq!(config.post_process, PostProcess::Megvii);
        assert_eq!(config.kernel, 3);
        assert_eq!(config.target_type, TargetType::CombinedTarget);
        assert_eq!(config.output_dim(), 3);
    }

    #[test]
    fn test_validate_rejects_even_kernel() {
        assert!(DecodeConfig::new().with_kernel(4).validate().is_err());
        assert!(DecodeConfig::new().with_kernel(0).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_scale() {
        assert!(DecodeConfig::new().with_scale(0.0, 10.0).validate().is_err());
        assert!(DecodeConfig::new().with_pixel_std(-1.0).validate().is_err());
        assert!(DecodeConfig::new().with_center(f32::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_kernel() {
        assert!(DecodeConfig::new().with_kernel(MAX_KERNEL).validate().is_ok());
        assert!(DecodeConfig::new().with_kernel(MAX_KERNEL + 2).validate().is_err());
        let err = DecodeConfig::new()
            .with_target_type(TargetType::CombinedTarget)
            .with_kernel(usize::MAX)
            .validate()
            .unwrap_err();
        assert!(matches!(err, InferenceError::ConfigError(_)));
    }

    #[test]
    fn test_validate_megvii_excludes_udp() {
        let config = DecodeConfig::new().with_post_process(PostProcess::Megvii);
        assert!(matches!(config.validate(), Err(InferenceError::ConfigError(_))));
        assert!(config.with_udp(false).validate().is_ok());
    }

    #[test]
    fn test_validate_combined_target_needs_udp() {
        let config = DecodeConfig::new().with_target_type(TargetType::CombinedTarget);
        assert!(config.validate().is_ok());
        assert!(config.with_udp(false).validate().is_err());
    }

    #[test]
    fn test_post_process_from_str() {
        assert_eq!("default".parse::<PostProcess>().unwrap(), PostProcess::Default);
        assert_eq!("Unbiased".parse::<PostProcess>().unwrap(), PostProcess::Unbiased);
        assert_eq!("megvii".parse::<PostProcess>().unwrap(), PostProcess::Megvii);
        assert_eq!("none".parse::<PostProcess>().unwrap(), PostProcess::None);
        assert!("bilinear".parse::<PostProcess>().is_err());
    }

    #[test]
    fn test_target_type_from_str() {
        assert_eq!(
            "GaussianHeatmap".parse::<TargetType>().unwrap(),
            TargetType::GaussianHeatmap
        );
        assert_eq!(
            "combined_target".parse::<TargetType>().unwrap(),
            TargetType::CombinedTarget
        );
        assert!("offsets".parse::<TargetType>().is_err());
        assert_eq!(TargetType::CombinedTarget.channels_per_joint(), 3);
    }

    #[test]
    fn test_display_round_trip() {
        assert_eq!(PostProcess::Unbiased.to_string(), "unbiased");
        assert_eq!(TargetType::GaussianHeatmap.to_string(), "gaussian_heatmap");
    }
}
