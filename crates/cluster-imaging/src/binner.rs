//! Cell position → image bin

use crate::grid::{GridDefinition, GridShape};
use calo_common::Sampling;
use std::f32::consts::PI;

/// Integer image coordinates: `row` along η, `col` along φ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bin {
    pub row: usize,
    pub col: usize,
}

/// Normalize an azimuthal difference into `(-π, π]`
#[must_use]
pub fn wrap_phi(d_phi: f32) -> f32 {
    let d = d_phi % (2.0 * PI);
    if d > PI {
        d - 2.0 * PI
    } else if d <= -PI {
        d + 2.0 * PI
    } else {
        d
    }
}

/// Maps cells into the grid of their sampling.
///
/// All arithmetic is done in `f32` with a fixed operation order, so the same
/// `(η, φ, η₀, φ₀)` always yields the same bin.
#[derive(Debug, Clone, Copy)]
pub struct GeometryBinner<'g> {
    grid: &'g GridDefinition,
}

impl<'g> GeometryBinner<'g> {
    #[must_use]
    pub fn new(grid: &'g GridDefinition) -> Self {
        Self { grid }
    }

    /// Bin of a cell at `(eta, phi)` in `sampling`, for a cluster centred on
    /// `(eta0, phi0)`. Returns `None` when the cell is outside the window.
    #[must_use]
    pub fn bin(&self, sampling: Sampling, eta: f32, phi: f32, eta0: f32, phi0: f32) -> Option<Bin> {
        let window = self.grid.window();
        let d_eta = eta - eta0;
        let d_phi = wrap_phi(phi - phi0);

        // NaN and infinite offsets fail both comparisons
        let inside = d_eta.abs() <= window.half_eta() && d_phi.abs() <= window.half_phi();
        if !inside {
            return None;
        }

        let GridShape { rows, cols } = self.grid.shape(sampling);
        Some(Bin {
            row: scale_to_index(d_eta, window.half_eta(), window.d_eta, rows),
            col: scale_to_index(d_phi, window.half_phi(), window.d_phi, cols),
        })
    }
}

/// Rescale `delta` from `[-half, half]` onto `[0, bins)`.
/// The upper window edge lands in the last bin.
fn scale_to_index(delta: f32, half: f32, width: f32, bins: usize) -> usize {
    let scaled = ((delta + half) / width * bins as f32).floor();
    // `as` saturates at 0 for any negative rounding residue
    (scaled as usize).min(bins - 1)
}
