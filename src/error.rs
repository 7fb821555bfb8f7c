// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for the post-processing model.

use std::fmt;

/// Result type alias for post-processing operations.
pub type Result<T> = std::result::Result<T, InferenceError>;

/// Main error type for the post-processing model.
#[derive(Debug)]
pub enum InferenceError {
    /// Invalid or missing configuration.
    ConfigError(String),
    /// A request did not carry the expected input tensor.
    MissingTensor(String),
    /// Tensor has an unexpected rank or shape.
    ShapeError(String),
    /// Wrapped `serde_json::Error` from model configuration parsing.
    Json(serde_json::Error),
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "Config error: {msg}"),
            Self::MissingTensor(name) => write!(f, "Missing input tensor: {name}"),
            Self::ShapeError(msg) => write!(f, "Shape error: {msg}"),
            Self::Json(err) => write!(f, "JSON error: {err}"),
        }
    }
}

impl std::error::Error for InferenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for InferenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InferenceError::ConfigError("test".to_string());
        assert_eq!(err.to_string(), "Config error: test");

        let err = InferenceError::MissingTensor("post_input".to_string());
        assert_eq!(err.to_string(), "Missing input tensor: post_input");

        let err = InferenceError::ShapeError("rank 3".to_string());
        assert_eq!(err.to_string(), "Shape error: rank 3");
    }

    #[test]
    fn test_json_error_source() {
        use std::error::Error;

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = InferenceError::from(json_err);
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("JSON error:"));
    }
}
