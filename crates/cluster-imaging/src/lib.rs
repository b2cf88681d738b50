//! Cluster imaging for calorimeter energy regression
//!
//! Turns the irregular set of cells belonging to a calorimeter cluster into
//! fixed-shape energy images, one per barrel sampling, stitches them into the
//! multi-channel images consumed by the regression model and packs them into
//! contiguous model input buffers.
//!
//! # Pipeline
//! - [`GridDefinition`]: per-sampling image shape and the common η × φ window
//! - [`GeometryBinner`]: cell position relative to the cluster → `(row, col)`
//! - [`SamplingImage`]: per-bin energy sums and duplicate counts
//! - [`ImageAssembler`]: all cells of a cluster → [`ClusterImages`]
//! - [`CombinedImage`]: channel-stacked images per [`ModelInput`]
//! - [`TensorPacker`]: one or many clusters → [`PackedBatch`]
//!
//! # Example
//! ```
//! use calo_cluster_imaging::{GridDefinition, ImageAssembler, ModelInputs, TensorPacker};
//! use calo_common::{Cell, Cluster, Sampling};
//!
//! let grid = GridDefinition::default();
//! let assembler = ImageAssembler::new(&grid, 0.005);
//!
//! let cluster = Cluster::new(8.0, 0.3, 1.0)
//!     .with_cells(vec![Cell::new(Sampling::Emb2, 8.0, 0.3, 1.0)]);
//! let assembled = assembler.assemble(&cluster);
//! assert_eq!(assembled.images.get(Sampling::Emb2).sum(), 8.0);
//!
//! let inputs = ModelInputs::build(&assembled.images, &grid).unwrap();
//! let packed = TensorPacker::new(&grid).pack(&[inputs], 1).unwrap();
//! assert_eq!(packed.examples(), 1);
//! ```

pub mod assembler;
pub mod binner;
pub mod combined;
pub mod grid;
pub mod image;
pub mod packer;
pub mod summary;

pub use assembler::{AssembledCluster, CellStats, ImageAssembler};
pub use binner::{wrap_phi, Bin, GeometryBinner};
pub use combined::{CombinedImage, ModelInput, ModelInputs};
pub use grid::{GridDefinition, GridShape, Window};
pub use image::{ClusterImages, SamplingImage};
pub use packer::{PackedBatch, PackedTensor, TensorPacker};
pub use summary::{CellSummary, CenterCell};

use thiserror::Error;

/// Errors raised while shaping images into tensors.
///
/// These are integrity failures: they indicate an inconsistent grid or an
/// incorrect number of examples, never a property of the cell data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImagingError {
    #[error("Shape mismatch for {input}: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        input: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Batch size mismatch: declared {declared} examples, got {actual}")]
    BatchSizeMismatch { declared: usize, actual: usize },

    #[error("Sampling {sampling} ({rows}x{cols}) cannot be stacked into {input} ({target_rows}x{target_cols})")]
    IncompatibleShape {
        input: &'static str,
        sampling: &'static str,
        rows: usize,
        cols: usize,
        target_rows: usize,
        target_cols: usize,
    },

    #[error("Invalid batch size: {0}")]
    InvalidBatchSize(usize),
}
