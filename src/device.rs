// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Device placement reported by the serving host.
//!
//! Decoding always runs on the host CPU; the device is recorded so logs and
//! diagnostics show where the model instance was placed.

use std::fmt;

use crate::error::{InferenceError, Result};

/// Hardware device a model instance is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    /// CPU instance.
    #[default]
    Cpu,
    /// CUDA GPU instance with its device index.
    Cuda(usize),
    /// Placement left to the model itself (host `KIND_MODEL`).
    Model,
}

impl Device {
    /// Build a device from the host's instance kind and device id strings.
    ///
    /// # Arguments
    ///
    /// * `kind` - Instance kind such as `KIND_CPU`, `KIND_GPU`, `KIND_MODEL`
    ///   (a missing kind means CPU).
    /// * `device_id` - Device index as a decimal string (a missing id means 0).
    ///
    /// # Errors
    ///
    /// Returns a config error if the device id is not an integer or the kind is unknown.
    pub fn from_instance(kind: Option<&str>, device_id: Option<&str>) -> Result<Self> {
        let index = match device_id.map(str::trim) {
            None | Some("") => 0,
            Some(id) => id.parse::<usize>().map_err(|_| {
                InferenceError::ConfigError(format!("Invalid model_instance_device_id: {id}"))
            })?,
        };

        match kind.map(|k| k.trim().to_uppercase()).as_deref() {
            None | Some("" | "KIND_CPU" | "CPU") => Ok(Self::Cpu),
            Some("KIND_GPU" | "GPU") => Ok(Self::Cuda(index)),
            Some("KIND_MODEL" | "MODEL" | "KIND_AUTO" | "AUTO") => Ok(Self::Model),
            Some(other) => Err(InferenceError::ConfigError(format!(
                "Unknown model_instance_kind: {other}"
            ))),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(i) => write!(f, "cuda:{i}"),
            Self::Model => write!(f, "model"),
        }
    }
}
