// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Host model configuration parsing.
//!
//! The serving host hands the model its configuration as a JSON document at
//! initialization. Tensor names come from the `input` / `output` entries and
//! decoding options from the `parameters` map, where every value is wrapped as
//! `{"string_value": "..."}`:
//!
//! ```json
//! {
//!   "name": "postprocess",
//!   "max_batch_size": 8,
//!   "input": [{"name": "post_input", "data_type": "TYPE_FP32", "dims": [17, 64, 48]}],
//!   "output": [{"name": "post_output", "data_type": "TYPE_FP32", "dims": [17, 2]}],
//!   "parameters": {
//!     "center": {"string_value": "128,96"},
//!     "scale": {"string_value": "192,256"},
//!     "use_udp": {"string_value": "true"}
//!   }
//! }
//! ```

use std::collections::HashMap;

use serde::Deserialize;

use crate::config::DecodeConfig;
use crate::error::{InferenceError, Result};

/// Default input tensor name.
pub const DEFAULT_INPUT_NAME: &str = "post_input";

/// Default output tensor name.
pub const DEFAULT_OUTPUT_NAME: &str = "post_output";

#[derive(Debug, Deserialize)]
struct RawModelConfig {
    #[serde(default)]
    name: String,
    #[serde(default)]
    max_batch_size: i64,
    #[serde(default)]
    input: Vec<RawTensorConfig>,
    #[serde(default)]
    output: Vec<RawTensorConfig>,
    #[serde(default)]
    parameters: HashMap<String, RawParameter>,
}

#[derive(Debug, Deserialize)]
struct RawTensorConfig {
    name: String,
    #[serde(default)]
    data_type: String,
}

#[derive(Debug, Deserialize)]
struct RawParameter {
    #[serde(default)]
    string_value: String,
}

/// Model configuration extracted from the host's JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Model name as registered with the host.
    pub name: String,
    /// Maximum batch size the host may form (0 = batching disabled).
    pub max_batch_size: i64,
    /// Name of the heatmap input tensor.
    pub input_name: String,
    /// Name of the keypoint output tensor.
    pub output_name: String,
    /// Decoding options.
    pub decode: DecodeConfig,
    /// Verbose logging override, if the `verbose` parameter was given.
    pub verbose: Option<bool>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_batch_size: 0,
            input_name: DEFAULT_INPUT_NAME.to_string(),
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
            decode: DecodeConfig::default(),
            verbose: None,
        }
    }
}

impl ModelConfig {
    /// Parse the host's JSON model configuration.
    ///
    /// # Arguments
    ///
    /// * `json` - The model configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed, the output is declared with
    /// a type other than `TYPE_FP32`, or a parameter value cannot be parsed.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawModelConfig = serde_json::from_str(json)?;

        if let Some(output) = raw.output.first() {
            if !output.data_type.is_empty() && output.data_type != "TYPE_FP32" {
                return Err(InferenceError::ConfigError(format!(
                    "output '{}' must be TYPE_FP32, got {}",
                    output.name, output.data_type
                )));
            }
        }

        let parameters: HashMap<String, String> = raw
            .parameters
            .into_iter()
            .map(|(key, value)| (key, value.string_value))
            .collect();

        let verbose = parameters
            .get("verbose")
            .map(|v| parse_bool("verbose", v))
            .transpose()?;

        Ok(Self {
            name: raw.name,
            max_batch_size: raw.max_batch_size,
            input_name: raw
                .input
                .first()
                .map_or_else(|| DEFAULT_INPUT_NAME.to_string(), |t| t.name.clone()),
            output_name: raw
                .output
                .first()
                .map_or_else(|| DEFAULT_OUTPUT_NAME.to_string(), |t| t.name.clone()),
            decode: decode_config_from_parameters(&parameters)?,
            verbose,
        })
    }
}

/// Build a [`DecodeConfig`] from string parameters, starting from the defaults.
///
/// Unknown keys are ignored.
///
/// # Errors
///
/// Returns a config error for unparsable values or an invalid resulting configuration.
pub fn decode_config_from_parameters(parameters: &HashMap<String, String>) -> Result<DecodeConfig> {
    let mut config = DecodeConfig::default();

    for (key, value) in parameters {
        match key.as_str() {
            "center" => {
                let [x, y] = parse_pair(key, value)?;
                config = config.with_center(x, y);
            }
            "scale" => {
                let [w, h] = parse_pair(key, value)?;
                config = config.with_scale(w, h);
            }
            "pixel_std" => config = config.with_pixel_std(parse_number(key, value)?),
            "use_udp" => config = config.with_udp(parse_bool(key, value)?),
            "post_process" => config = config.with_post_process(value.parse()?),
            "kernel" => {
                let kernel = value.trim().parse::<usize>().map_err(|_| {
                    InferenceError::ConfigError(format!("Invalid kernel value: {value}"))
                })?;
                config = config.with_kernel(kernel);
            }
            "valid_radius_factor" => {
                config = config.with_valid_radius_factor(parse_number(key, value)?);
            }
            "target_type" => config = config.with_target_type(value.parse()?),
            "include_confidence" => config = config.with_confidence(parse_bool(key, value)?),
            _ => {}
        }
    }

    config.validate()?;
    Ok(config)
}

/// Parse `"x,y"`, `"[x, y]"` or `"x y"` into two floats.
fn parse_pair(key: &str, value: &str) -> Result<[f32; 2]> {
    let values: Vec<f32> = value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| InferenceError::ConfigError(format!("Invalid {key} value: {value}")))?;

    match values.as_slice() {
        [a, b] => Ok([*a, *b]),
        _ => Err(InferenceError::ConfigError(format!(
            "{key} needs exactly two values, got {value}"
        ))),
    }
}

fn parse_number(key: &str, value: &str) -> Result<f32> {
    value
        .trim()
        .parse::<f32>()
        .map_err(|_| InferenceError::ConfigError(format!("Invalid {key} value: {value}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(InferenceError::ConfigError(format!("Invalid {key} value: {value}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PostProcess, TargetType};

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ModelConfig::from_json("{}").unwrap();
        assert_eq!(config.input_name, "post_input");
        assert_eq!(config.output_name, "post_output");
        assert_eq!(config.decode, DecodeConfig::default());
        assert_eq!(config.verbose, None);
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "name": "postprocess",
            "max_batch_size": 8,
            "backend": "python",
            "input": [{"name": "heatmaps", "data_type": "TYPE_FP16", "dims": [17, 64, 48]}],
            "output": [{"name": "keypoints", "data_type": "TYPE_FP32", "dims": [17, 3]}],
            "parameters": {
                "center": {"string_value": "[96, 128]"},
                "scale": {"string_value": "1.2 1.6"},
                "pixel_std": {"string_value": "200"},
                "use_udp": {"string_value": "false"},
                "post_process": {"string_value": "unbiased"},
                "kernel": {"string_value": "17"},
                "include_confidence": {"string_value": "true"},
                "verbose": {"string_value": "no"},
                "unrelated": {"string_value": "ignored"}
            }
        }"#;
        let config = ModelConfig::from_json(json).unwrap();

        assert_eq!(config.name, "postprocess");
        assert_eq!(config.max_batch_size, 8);
        assert_eq!(config.input_name, "heatmaps");
        assert_eq!(config.output_name, "keypoints");
        assert_eq!(config.decode.center, [96.0, 128.0]);
        assert_eq!(config.decode.scale, [1.2, 1.6]);
        assert!((config.decode.pixel_std - 200.0).abs() < f32::EPSILON);
        assert!(!config.decode.use_udp);
        assert_eq!(config.decode.post_process, PostProcess::Unbiased);
        assert_eq!(config.decode.kernel, 17);
        assert_eq!(config.decode.target_type, TargetType::GaussianHeatmap);
        assert!(config.decode.include_confidence);
        assert_eq!(config.verbose, Some(false));
    }

    #[test]
    fn test_malformed_json() {
        let err = ModelConfig::from_json("{\"name\": ").unwrap_err();
        assert!(matches!(err, InferenceError::Json(_)));
    }

    #[test]
    fn test_bad_parameter_values() {
        let bad = [
            r#"{"parameters": {"center": {"string_value": "1,2,3"}}}"#,
            r#"{"parameters": {"scale": {"string_value": "wide,tall"}}}"#,
            r#"{"parameters": {"use_udp": {"string_value": "maybe"}}}"#,
            r#"{"parameters": {"kernel": {"string_value": "4"}}}"#,
            r#"{"parameters": {"post_process": {"string_value": "bilinear"}}}"#,
        ];
        for json in bad {
            let err = ModelConfig::from_json(json).unwrap_err();
            assert!(matches!(err, InferenceError::ConfigError(_)), "{json}");
        }
    }

    #[test]
    fn test_non_fp32_output_rejected() {
        let json = r#"{"output": [{"name": "post_output", "data_type": "TYPE_FP16"}]}"#;
        assert!(ModelConfig::from_json(json).is_err());
    }

    #[test]
    fn test_parse_pair_formats() {
        assert_eq!(parse_pair("center", "128,96").unwrap(), [128.0, 96.0]);
        assert_eq!(parse_pair("center", " [128., 96.] ").unwrap(), [128.0, 96.0]);
        assert_eq!(parse_pair("center", "128 96").unwrap(), [128.0, 96.0]);
        assert!(parse_pair("center", "128").is_err());
    }
}
