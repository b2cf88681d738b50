//! Error types for inference and the calibration pipeline

use crate::collector::{ClusterId, ClusterRow};
use crate::onnx_utils::OnnxError;
use calo_cluster_imaging::ImagingError;
use thiserror::Error;

/// Errors raised by the inference client and its backends
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("ONNX Runtime error: {0}")]
    OrtError(#[from] ort::Error),

    #[error("Model load error: {0}")]
    ModelLoad(#[from] OnnxError),

    #[error("Model has no input named {name:?} (available: {available:?})")]
    MissingInput { name: String, available: Vec<String> },

    #[error("Model has no output named {name:?} (available: {available:?})")]
    MissingOutput { name: String, available: Vec<String> },

    #[error("Input {name} declares shape {declared:?}, packed tensor has {actual:?}")]
    InputShape {
        name: String,
        declared: Vec<i64>,
        actual: Vec<i64>,
    },

    #[error("Output {name} has shape {shape:?} ({values} values) for {expected} submitted examples")]
    OutputCount {
        name: String,
        shape: Vec<i64>,
        values: usize,
        expected: usize,
    },

    #[error("Invalid tensor: {0}")]
    InvalidTensor(String),

    #[error("Backend failure: {0}")]
    Backend(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors surfaced by the per-cluster pipeline
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tensor packing failed: {0}")]
    Imaging(#[from] ImagingError),

    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Some inference calls of a flushed group failed. Rows of the calls
    /// that succeeded are carried along.
    #[error("{} cluster(s) failed: {source}", .failed.len())]
    BatchFailed {
        completed: Vec<ClusterRow>,
        failed: Vec<ClusterId>,
        source: Box<CalibrationError>,
    },
}

impl CalibrationError {
    /// Move out the rows finished despite the error
    pub fn take_completed(&mut self) -> Vec<ClusterRow> {
        match self {
            CalibrationError::BatchFailed { completed, .. } => std::mem::take(completed),
            _ => Vec::new(),
        }
    }
}
