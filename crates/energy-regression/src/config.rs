//! Calibration run configuration

use crate::error::ConfigError;
use calo_cluster_imaging::ModelInput;
use calo_common::Cluster;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Cluster and cell acceptance cuts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectionConfig {
    /// Minimum accepted cluster energy
    pub cluster_e_min: f32,
    /// Maximum accepted cluster energy
    pub cluster_e_max: f32,
    /// Maximum accepted |η| of the cluster direction
    pub cluster_eta_abs_max: f32,
    /// Cells below this energy are not imaged
    pub cell_e_thres: f32,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            cluster_e_min: 0.0,
            cluster_e_max: 1e8,
            cluster_eta_abs_max: 0.7,
            cell_e_thres: 0.005,
        }
    }
}

impl SelectionConfig {
    /// Whether `cluster` passes the energy and η cuts
    #[must_use]
    pub fn accepts(&self, cluster: &Cluster) -> bool {
        cluster.e >= self.cluster_e_min
            && cluster.e <= self.cluster_e_max
            && cluster.eta.abs() <= self.cluster_eta_abs_max
    }
}

/// What to do with clusters left over when the input ends mid-batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PartialBatchPolicy {
    /// Fill the batch with all-zero images and discard their predictions
    #[default]
    Pad,
    /// Submit a short batch; the model must accept a dynamic batch size
    Flush,
}

/// Batched inference settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub enabled: bool,
    /// Inference calls issued per flush
    pub number_of_batches: usize,
    /// Clusters per inference call
    pub size_of_batch: usize,
    pub partial_batch: PartialBatchPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            number_of_batches: 1,
            size_of_batch: 1,
            partial_batch: PartialBatchPolicy::Pad,
        }
    }
}

impl BatchConfig {
    /// Examples per inference call (1 when batching is off)
    #[must_use]
    pub fn batch_size(&self) -> usize {
        if self.enabled {
            self.size_of_batch
        } else {
            1
        }
    }

    /// Clusters accumulated before a flush
    #[must_use]
    pub fn clusters_per_flush(&self) -> usize {
        if self.enabled {
            self.number_of_batches * self.size_of_batch
        } else {
            1
        }
    }
}

/// Model input tensor names
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputNames {
    pub emb1: String,
    pub emb23: String,
    pub tiles: String,
}

impl Default for InputNames {
    fn default() -> Self {
        Self {
            emb1: ModelInput::Emb1.as_str().to_string(),
            emb23: ModelInput::Emb23.as_str().to_string(),
            tiles: ModelInput::Tiles.as_str().to_string(),
        }
    }
}

impl InputNames {
    #[must_use]
    pub fn name(&self, input: ModelInput) -> &str {
        match input {
            ModelInput::Emb1 => &self.emb1,
            ModelInput::Emb23 => &self.emb23,
            ModelInput::Tiles => &self.tiles,
        }
    }
}

/// Complete configuration of a calibration run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Path to the ONNX regression model
    pub model_path: PathBuf,
    pub selection: SelectionConfig,
    pub batching: BatchConfig,
    pub inputs: InputNames,
    /// Prediction output name; the first model output when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/energy-regression/cluster_calib.onnx"),
            selection: SelectionConfig::default(),
            batching: BatchConfig::default(),
            inputs: InputNames::default(),
            output: None,
        }
    }
}

impl CalibrationConfig {
    /// Load and validate a YAML configuration file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Parse and validate YAML configuration text
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let selection = &self.selection;
        if selection.cluster_e_min > selection.cluster_e_max {
            return Err(ConfigError::Invalid(format!(
                "cluster_e_min ({}) exceeds cluster_e_max ({})",
                selection.cluster_e_min, selection.cluster_e_max
            )));
        }
        if selection.cluster_eta_abs_max < 0.0 || selection.cell_e_thres < 0.0 {
            return Err(ConfigError::Invalid(
                "cluster_eta_abs_max and cell_e_thres must be non-negative".to_string(),
            ));
        }
        if self.batching.size_of_batch == 0 {
            return Err(ConfigError::Invalid(
                "size_of_batch must be at least 1".to_string(),
            ));
        }
        if self.batching.number_of_batches == 0 {
            return Err(ConfigError::Invalid(
                "number_of_batches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
