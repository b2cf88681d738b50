//! Per-sampling energy images with duplicate resolution

use crate::binner::Bin;
use crate::grid::{GridDefinition, GridShape};
use calo_common::Sampling;
use ndarray::Array2;

/// Dense energy image of one sampling for one cluster.
///
/// Energies landing in an occupied bin are added, never overwritten, and
/// the bin's duplicate counter goes up by one for every extra cell.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingImage {
    energy: Array2<f32>,
    duplicates: Array2<u32>,
    occupied: Array2<bool>,
}

impl SamplingImage {
    #[must_use]
    pub fn zeros(shape: GridShape) -> Self {
        let dims = (shape.rows, shape.cols);
        Self {
            energy: Array2::zeros(dims),
            duplicates: Array2::zeros(dims),
            occupied: Array2::from_elem(dims, false),
        }
    }

    #[must_use]
    pub fn shape(&self) -> GridShape {
        let (rows, cols) = self.energy.dim();
        GridShape::new(rows, cols)
    }

    /// Fold a cell's energy into `bin`. Returns `true` when the bin was
    /// already occupied.
    pub fn deposit(&mut self, bin: Bin, e: f32) -> bool {
        let idx = [bin.row, bin.col];
        self.energy[idx] += e;
        if self.occupied[idx] {
            self.duplicates[idx] += 1;
            true
        } else {
            self.occupied[idx] = true;
            false
        }
    }

    #[must_use]
    pub fn energy(&self) -> &Array2<f32> {
        &self.energy
    }

    #[must_use]
    pub fn duplicates(&self) -> &Array2<u32> {
        &self.duplicates
    }

    #[must_use]
    pub fn sum(&self) -> f32 {
        self.energy.sum()
    }

    /// Number of bins that received more than one cell
    #[must_use]
    pub fn duplicate_bins(&self) -> usize {
        self.duplicates.iter().filter(|&&d| d > 0).count()
    }

    pub fn reset(&mut self) {
        self.energy.fill(0.0);
        self.duplicates.fill(0);
        self.occupied.fill(false);
    }
}

/// One image per imaged sampling, iterated in [`Sampling::ALL`] order
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterImages {
    images: Vec<SamplingImage>,
}

impl ClusterImages {
    /// All-zero images shaped by `grid`
    #[must_use]
    pub fn zeros(grid: &GridDefinition) -> Self {
        Self {
            images: Sampling::ALL
                .iter()
                .map(|s| SamplingImage::zeros(grid.shape(*s)))
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, sampling: Sampling) -> &SamplingImage {
        &self.images[sampling.index()]
    }

    pub fn get_mut(&mut self, sampling: Sampling) -> &mut SamplingImage {
        &mut self.images[sampling.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Sampling, &SamplingImage)> {
        Sampling::ALL.iter().copied().zip(self.images.iter())
    }

    /// Duplicate-bin count per sampling, in [`Sampling::ALL`] order
    #[must_use]
    pub fn duplicate_counts(&self) -> [usize; Sampling::COUNT] {
        let mut counts = [0; Sampling::COUNT];
        for (count, image) in counts.iter_mut().zip(&self.images) {
            *count = image.duplicate_bins();
        }
        counts
    }

    /// Total energy over all samplings
    #[must_use]
    pub fn total(&self) -> f32 {
        self.images.iter().map(SamplingImage::sum).sum()
    }

    pub fn reset(&mut self) {
        for image in &mut self.images {
            image.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_cells_same_bin() {
        let mut image = SamplingImage::zeros(GridShape::new(16, 16));
        let bin = Bin { row: 2, col: 3 };
        assert!(!image.deposit(bin, 5.0));
        assert!(image.deposit(bin, 3.0));
        image.deposit(Bin { row: 0, col: 0 }, 1.0);

        assert_eq!(image.energy()[[2, 3]], 8.0);
        assert_eq!(image.duplicates()[[2, 3]], 1);
        assert_eq!(image.energy()[[0, 0]], 1.0);
        assert_eq!(image.duplicates()[[0, 0]], 0);
        assert_eq!(image.sum(), 9.0);
        assert_eq!(image.duplicate_bins(), 1);
    }

    #[test]
    fn test_three_cells_same_bin() {
        let mut image = SamplingImage::zeros(GridShape::new(4, 4));
        let bin = Bin { row: 1, col: 1 };
        image.deposit(bin, 1.0);
        image.deposit(bin, 1.0);
        image.deposit(bin, 1.0);
        assert_eq!(image.duplicates()[[1, 1]], 2);
        assert_eq!(image.duplicate_bins(), 1);
    }

    #[test]
    fn test_zero_energy_cell_still_occupies() {
        let mut image = SamplingImage::zeros(GridShape::new(4, 4));
        let bin = Bin { row: 3, col: 0 };
        image.deposit(bin, 0.0);
        assert!(image.deposit(bin, 2.0));
        assert_eq!(image.duplicates()[[3, 0]], 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let grid = GridDefinition::barrel();
        let mut images = ClusterImages::zeros(&grid);
        let bin = Bin { row: 0, col: 1 };
        images.get_mut(Sampling::TileBar1).deposit(bin, 2.0);
        images.get_mut(Sampling::TileBar1).deposit(bin, 2.0);
        assert_eq!(images.total(), 4.0);
        assert_eq!(images.duplicate_counts()[Sampling::TileBar1.index()], 1);

        images.reset();
        assert_eq!(images, ClusterImages::zeros(&grid));
    }

    #[test]
    fn test_iteration_order_and_shapes() {
        let grid = GridDefinition::barrel();
        let images = ClusterImages::zeros(&grid);
        let order: Vec<Sampling> = images.iter().map(|(s, _)| s).collect();
        assert_eq!(order, Sampling::ALL.to_vec());
        for (sampling, image) in images.iter() {
            assert_eq!(image.shape(), grid.shape(sampling));
        }
    }
}
