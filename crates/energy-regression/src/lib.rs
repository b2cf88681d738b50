//! Calibrated cluster energy regression via ONNX Runtime
//!
//! Drives a convolutional regression model over the cluster images built
//! by `calo-cluster-imaging` and produces one output row per cluster.
//!
//! # Features
//! - Single-cluster or batched inference with an explicit trailing-batch policy
//! - Model metadata validation at load time (input names and shapes)
//! - Strict output decoding: exactly one prediction per submitted cluster
//! - Cluster selection cuts and per-cell energy threshold
//! - JSON-lines output rows with a stable schema
//!
//! # Example
//! ```no_run
//! use calo_cluster_imaging::GridDefinition;
//! use calo_common::load_events;
//! use calo_energy_regression::{
//!     CalibrationConfig, ClusterCalibrator, ClusterId, EnergyRegressor, OrtBackend,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CalibrationConfig::from_yaml("config/calibration.yaml")?;
//! let grid = GridDefinition::default();
//! let backend = OrtBackend::load(&config.model_path)?;
//! let regressor = EnergyRegressor::new(backend, &config.inputs, config.output.as_deref(), &grid)?;
//! let mut calibrator = ClusterCalibrator::new(&grid, regressor, &config)?;
//!
//! for event in load_events("events.json")? {
//!     for (index, cluster) in event.clusters.iter().enumerate() {
//!         let id = ClusterId {
//!             run_number: event.run_number,
//!             event_number: event.event_number,
//!             cluster_index: index,
//!         };
//!         for row in calibrator.process_cluster(id, cluster)? {
//!             println!("{} -> {:.2}", row.cluster_e, row.cluster_eng_pred);
//!         }
//!     }
//! }
//! calibrator.finish()?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod onnx_utils;
pub mod pipeline;

pub use backend::{InferenceBackend, NamedTensor, OrtBackend, TensorSpec};
pub use client::EnergyRegressor;
pub use collector::{ClusterId, ClusterRow, DuplicateCounts, JsonLinesSink, RowSink};
pub use config::{BatchConfig, CalibrationConfig, InputNames, PartialBatchPolicy, SelectionConfig};
pub use error::{CalibrationError, ConfigError, InferenceError};
pub use pipeline::{ClusterCalibrator, RunStats};
