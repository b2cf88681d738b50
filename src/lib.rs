//! Calorimeter cluster calibration
//!
//! Umbrella crate over the workspace:
//! - [`common`]: events, clusters, cells and calorimeter samplings
//! - [`imaging`]: per-sampling images, combined model inputs, batch packing
//! - [`regression`]: ONNX inference, batching pipeline and output rows

pub use calo_cluster_imaging as imaging;
pub use calo_common as common;
pub use calo_energy_regression as regression;
