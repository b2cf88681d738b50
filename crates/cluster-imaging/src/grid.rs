//! Static image geometry of the imaged samplings

use calo_common::Sampling;
use serde::{Deserialize, Serialize};

/// Image shape of one sampling: rows along η, columns along φ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    #[must_use]
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows * self.cols
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Angular extent of the image window around the cluster direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub d_eta: f32,
    pub d_phi: f32,
}

impl Window {
    #[must_use]
    pub fn half_eta(&self) -> f32 {
        self.d_eta / 2.0
    }

    #[must_use]
    pub fn half_phi(&self) -> f32 {
        self.d_phi / 2.0
    }
}

/// Barrel image shapes, indexed in [`Sampling::ALL`] order
const BARREL_SHAPES: [GridShape; Sampling::COUNT] = [
    GridShape::new(16, 4),
    GridShape::new(128, 4),
    GridShape::new(16, 16),
    GridShape::new(8, 16),
    GridShape::new(4, 4),
    GridShape::new(4, 4),
    GridShape::new(2, 4),
];

/// Immutable grid geometry shared by the binner, assembler and packer.
///
/// Built once at startup and passed by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDefinition {
    shapes: [GridShape; Sampling::COUNT],
    window: Window,
}

impl GridDefinition {
    /// Geometry of the barrel image model: 0.4 × 0.4 window for every sampling
    #[must_use]
    pub fn barrel() -> Self {
        Self {
            shapes: BARREL_SHAPES,
            window: Window {
                d_eta: 0.4,
                d_phi: 0.4,
            },
        }
    }

    #[must_use]
    pub fn shape(&self, sampling: Sampling) -> GridShape {
        self.shapes[sampling.index()]
    }

    #[must_use]
    pub fn window(&self) -> Window {
        self.window
    }
}

impl Default for GridDefinition {
    fn default() -> Self {
        Self::barrel()
    }
}
