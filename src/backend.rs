// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Serving-host lifecycle and the heatmap post-processing model.
//!
//! The host loads the model once through [`ServingModel::initialize`], calls
//! [`ServingModel::execute`] with every (possibly dynamically batched) group
//! of requests, and calls [`ServingModel::finalize`] on unload.

use std::collections::HashMap;
use std::time::Instant;

use ndarray::Array3;

use crate::config::DecodeConfig;
use crate::decode::keypoints_from_heatmaps;
use crate::device::Device;
use crate::error::{InferenceError, Result};
use crate::model_config::{DEFAULT_INPUT_NAME, DEFAULT_OUTPUT_NAME, ModelConfig};
use crate::tensor::Tensor;
use crate::transform::tile_calibration;
use crate::{info, logging, section, verbose, warn};

/// An inference request: the named input tensors of one client call.
#[derive(Debug, Clone, Default)]
pub struct InferenceRequest {
    inputs: Vec<Tensor>,
}

impl InferenceRequest {
    /// Create a request from its input tensors.
    #[must_use]
    pub const fn new(inputs: Vec<Tensor>) -> Self {
        Self { inputs }
    }

    /// Look up an input tensor by name.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&Tensor> {
        self.inputs.iter().find(|t| t.name() == name)
    }

    /// All input tensors.
    #[must_use]
    pub fn inputs(&self) -> &[Tensor] {
        &self.inputs
    }
}

/// An inference response: the named output tensors for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceResponse {
    outputs: Vec<Tensor>,
}

impl InferenceResponse {
    /// Create a response from its output tensors.
    #[must_use]
    pub const fn new(outputs: Vec<Tensor>) -> Self {
        Self { outputs }
    }

    /// Look up an output tensor by name.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&Tensor> {
        self.outputs.iter().find(|t| t.name() == name)
    }

    /// All output tensors.
    #[must_use]
    pub fn outputs(&self) -> &[Tensor] {
        &self.outputs
    }
}

/// Lifecycle hooks a serving host drives.
pub trait ServingModel: Sized {
    /// Load the model from the host's argument map.
    ///
    /// # Errors
    ///
    /// Returns an error if required arguments are missing or malformed.
    fn initialize(args: &HashMap<String, String>) -> Result<Self>;

    /// Produce exactly one response per request, in request order.
    ///
    /// # Errors
    ///
    /// Any failing request fails the whole call.
    fn execute(&self, requests: &[InferenceRequest]) -> Result<Vec<InferenceResponse>>;

    /// Release resources before unload.
    fn finalize(&self);
}

/// Converts heatmap batches into keypoint batches.
///
/// # Example
///
/// ```rust
/// use heatmap_postprocess::{
///     DecodeConfig, HeatmapPostprocessor, InferenceRequest, ServingModel, Tensor,
/// };
/// use ndarray::{ArrayD, IxDyn};
///
/// let model = HeatmapPostprocessor::from_config(DecodeConfig::default())?;
/// let heatmaps = ArrayD::<f32>::zeros(IxDyn(&[2, 17, 64, 48]));
/// let request = InferenceRequest::new(vec![Tensor::new("post_input", heatmaps)]);
///
/// let responses = model.execute(&[request])?;
/// let keypoints = responses[0].output("post_output").unwrap();
/// assert_eq!(keypoints.data().shape(), &[2, 17, 2]);
/// # Ok::<(), heatmap_postprocess::InferenceError>(())
/// ```
#[derive(Debug, Clone)]
pub struct HeatmapPostprocessor {
    /// Parsed model configuration.
    config: ModelConfig,
    /// Device the host placed this instance on.
    device: Device,
}

impl HeatmapPostprocessor {
    /// Build a processor from decoding options, using the default tensor names.
    ///
    /// # Errors
    ///
    /// Returns a config error if the decoding options are invalid.
    pub fn from_config(decode: DecodeConfig) -> Result<Self> {
        decode.validate()?;
        Ok(Self {
            config: ModelConfig {
                input_name: DEFAULT_INPUT_NAME.to_string(),
                output_name: DEFAULT_OUTPUT_NAME.to_string(),
                decode,
                ..ModelConfig::default()
            },
            device: Device::Cpu,
        })
    }

    /// Build a processor from an already parsed model configuration.
    ///
    /// # Errors
    ///
    /// Returns a config error if the decoding options are invalid.
    pub fn from_model_config(config: ModelConfig, device: Device) -> Result<Self> {
        config.decode.validate()?;
        Ok(Self { config, device })
    }

    /// Model configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Device this instance was placed on.
    #[must_use]
    pub const fn device(&self) -> Device {
        self.device
    }

    /// Decode one request's heatmaps into the output array.
    ///
    /// # Errors
    ///
    /// Returns an error if the input tensor is missing or malformed.
    pub fn process(&self, request: &InferenceRequest) -> Result<Array3<f32>> {
        let input_name = &self.config.input_name;
        let input = request
            .input(input_name)
            .ok_or_else(|| InferenceError::MissingTensor(input_name.clone()))?;

        let heatmaps = input.data().to_f32_nchw()?;
        let batch_size = heatmaps.shape()[0];

        let decode = &self.config.decode;
        let center = tile_calibration(decode.center, batch_size);
        let scale = tile_calibration(decode.scale, batch_size);

        let start = Instant::now();
        let keypoints =
            keypoints_from_heatmaps(heatmaps.view(), center.view(), scale.view(), decode)?;
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;

        verbose!(
            "{}: decoded {} x {} keypoints from {:?} {} in {elapsed:.2}ms",
            self.config.name,
            keypoints.len(),
            keypoints.num_joints(),
            input.data().shape(),
            input.data().data_type(),
        );

        Ok(keypoints.to_output(decode.include_confidence))
    }
}

impl ServingModel for HeatmapPostprocessor {
    fn initialize(args: &HashMap<String, String>) -> Result<Self> {
        let model_config = args.get("model_config").ok_or_else(|| {
            InferenceError::ConfigError("missing model_config argument".to_string())
        })?;
        let config = ModelConfig::from_json(model_config)?;

        let device = Device::from_instance(
            args.get("model_instance_kind").map(String::as_str),
            args.get("model_instance_device_id").map(String::as_str),
        )?;

        if let Some(verbose) = config.verbose {
            logging::set_verbose(verbose);
        }
        if let Device::Cuda(_) = device {
            warn!("{}: placed on {device}, heatmaps are decoded on the CPU", config.name);
        }

        section!("Heatmap post-processing");
        verbose!("Model: {} (version {})", config.name, args.get("model_version").map_or("-", String::as_str));
        verbose!("Device: {device}");
        verbose!("Tensors: {} -> {}", config.input_name, config.output_name);
        verbose!(
            "Decode: center={:?} scale={:?} pixel_std={} udp={} post_process={} kernel={} target={}",
            config.decode.center,
            config.decode.scale,
            config.decode.pixel_std,
            config.decode.use_udp,
            config.decode.post_process,
            config.decode.kernel,
            config.decode.target_type,
        );

        Self::from_model_config(config, device)
    }

    fn execute(&self, requests: &[InferenceRequest]) -> Result<Vec<InferenceResponse>> {
        requests
            .iter()
            .map(|request| {
                let keypoints = self.process(request)?;
                let output = Tensor::new(self.config.output_name.clone(), keypoints.into_dyn());
                Ok(InferenceResponse::new(vec![output]))
            })
            .collect()
    }

    fn finalize(&self) {
        info!("Cleaning..");
    }
}
