//! Cluster cells → per-sampling images

use crate::binner::GeometryBinner;
use crate::grid::GridDefinition;
use crate::image::ClusterImages;
use calo_common::Cluster;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// What happened to the cells of one cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellStats {
    /// Cells folded into an image
    pub admitted: usize,
    /// Cells under the per-cell energy threshold
    pub below_threshold: usize,
    /// Cells of an imaged sampling that fell outside the window
    pub outside_window: usize,
    /// Cells in samplings that have no image
    pub unimaged_sampling: usize,
}

impl CellStats {
    pub fn merge(&mut self, other: &CellStats) {
        self.admitted += other.admitted;
        self.below_threshold += other.below_threshold;
        self.outside_window += other.outside_window;
        self.unimaged_sampling += other.unimaged_sampling;
    }
}

/// Images of one cluster together with the cell bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledCluster {
    pub images: ClusterImages,
    pub stats: CellStats,
}

/// Builds the per-sampling images of a cluster
#[derive(Debug, Clone, Copy)]
pub struct ImageAssembler<'g> {
    grid: &'g GridDefinition,
    binner: GeometryBinner<'g>,
    cell_e_thres: f32,
}

impl<'g> ImageAssembler<'g> {
    /// Cells with `e < cell_e_thres` are dropped before binning.
    #[must_use]
    pub fn new(grid: &'g GridDefinition, cell_e_thres: f32) -> Self {
        Self {
            grid,
            binner: GeometryBinner::new(grid),
            cell_e_thres,
        }
    }

    /// Build fresh images for `cluster`
    #[must_use]
    pub fn assemble(&self, cluster: &Cluster) -> AssembledCluster {
        let mut images = ClusterImages::zeros(self.grid);
        let stats = self.assemble_into(cluster, &mut images);
        AssembledCluster { images, stats }
    }

    /// Reset `images` and fill them from `cluster`, reusing the buffers
    pub fn assemble_into(&self, cluster: &Cluster, images: &mut ClusterImages) -> CellStats {
        images.reset();
        let mut stats = CellStats::default();

        for cell in &cluster.cells {
            if cell.e < self.cell_e_thres {
                stats.below_threshold += 1;
                continue;
            }
            let Some(sampling) = cell.imaged_sampling() else {
                stats.unimaged_sampling += 1;
                continue;
            };
            match self
                .binner
                .bin(sampling, cell.eta, cell.phi, cluster.eta, cluster.phi)
            {
                Some(bin) => {
                    if images.get_mut(sampling).deposit(bin, cell.e) {
                        trace!("{} bin ({}, {}) hit again", sampling, bin.row, bin.col);
                    }
                    stats.admitted += 1;
                }
                None => stats.outside_window += 1,
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calo_common::{Cell, Sampling};

    #[test]
    fn test_emb2_scenario() {
        let grid = GridDefinition::barrel();
        let assembler = ImageAssembler::new(&grid, 0.0);
        let cluster = Cluster::new(9.0, 0.0, 0.0).with_cells(vec![
            Cell::new(Sampling::Emb2, 5.0, -0.14, -0.11),
            Cell::new(Sampling::Emb2, 3.0, -0.14, -0.11),
            Cell::new(Sampling::Emb2, 1.0, -0.19, -0.19),
        ]);

        let assembled = assembler.assemble(&cluster);
        let image = assembled.images.get(Sampling::Emb2);
        assert_eq!(image.energy()[[2, 3]], 8.0);
        assert_eq!(image.duplicates()[[2, 3]], 1);
        assert_eq!(image.energy()[[0, 0]], 1.0);
        assert_eq!(image.sum(), 9.0);
        let nonzero = image.energy().iter().filter(|&&e| e != 0.0).count();
        assert_eq!(nonzero, 2);
        assert_eq!(assembled.stats.admitted, 3);
        assert_eq!(assembled.images.duplicate_counts()[Sampling::Emb2.index()], 1);
    }

    #[test]
    fn test_out_of_window_cell_excluded() {
        let grid = GridDefinition::barrel();
        let assembler = ImageAssembler::new(&grid, 0.0);
        let cluster = Cluster::new(7.0, 0.0, 0.0).with_cells(vec![
            Cell::new(Sampling::Emb2, 4.0, 0.21, 0.0),
            Cell::new(Sampling::Emb2, 3.0, 0.1, 0.0),
        ]);

        let assembled = assembler.assemble(&cluster);
        assert_eq!(assembled.images.get(Sampling::Emb2).sum(), 3.0);
        assert_eq!(assembled.stats.outside_window, 1);
        assert_eq!(assembled.stats.admitted, 1);
    }

    #[test]
    fn test_non_finite_cell_contributes_nothing() {
        let grid = GridDefinition::barrel();
        let assembler = ImageAssembler::new(&grid, 0.0);
        let cluster = Cluster::new(5.0, 0.0, 0.0).with_cells(vec![
            Cell::new(Sampling::Emb2, 4.0, f32::NAN, 0.0),
            Cell::new(Sampling::Emb2, 2.0, 0.0, f32::INFINITY),
            Cell::new(Sampling::Emb2, 1.0, 0.0, 0.0),
        ]);

        let assembled = assembler.assemble(&cluster);
        assert_eq!(assembled.images.total(), 1.0);
        assert_eq!(assembled.stats.outside_window, 2);
        assert_eq!(assembled.stats.admitted, 1);
    }

    #[test]
    fn test_threshold_and_unimaged_samplings() {
        let grid = GridDefinition::barrel();
        let assembler = ImageAssembler::new(&grid, 0.5);
        let cluster = Cluster::new(3.0, 0.2, 0.2).with_cells(vec![
            Cell::new(Sampling::TileBar0, 0.1, 0.2, 0.2),
            Cell {
                sampling: 5, // EME1
                e: 2.0,
                eta: 0.2,
                phi: 0.2,
            },
            Cell::new(Sampling::TileBar0, 1.0, 0.2, 0.2),
        ]);

        let assembled = assembler.assemble(&cluster);
        assert_eq!(assembled.stats.below_threshold, 1);
        assert_eq!(assembled.stats.unimaged_sampling, 1);
        assert_eq!(assembled.stats.admitted, 1);
        assert_eq!(assembled.images.total(), 1.0);
    }

    #[test]
    fn test_empty_cluster_produces_zero_images() {
        let grid = GridDefinition::barrel();
        let assembler = ImageAssembler::new(&grid, 0.005);
        let assembled = assembler.assemble(&Cluster::new(1.0, 0.3, 0.3));
        assert_eq!(assembled.images, ClusterImages::zeros(&grid));
        assert_eq!(assembled.stats, CellStats::default());
    }

    #[test]
    fn test_assemble_into_resets_previous_cluster() {
        let grid = GridDefinition::barrel();
        let assembler = ImageAssembler::new(&grid, 0.0);
        let mut images = ClusterImages::zeros(&grid);

        let first = Cluster::new(2.0, 0.0, 0.0)
            .with_cells(vec![Cell::new(Sampling::Emb1, 2.0, 0.0, 0.0)]);
        assembler.assemble_into(&first, &mut images);
        assert_eq!(images.total(), 2.0);

        let second = Cluster::new(1.0, 0.0, 0.0)
            .with_cells(vec![Cell::new(Sampling::Emb3, 1.0, 0.0, 0.0)]);
        assembler.assemble_into(&second, &mut images);
        assert_eq!(images.get(Sampling::Emb1).sum(), 0.0);
        assert_eq!(images.total(), 1.0);
    }

    #[test]
    fn test_image_sum_matches_admitted_energy() {
        let grid = GridDefinition::barrel();
        let assembler = ImageAssembler::new(&grid, 0.0);
        let mut cells = Vec::new();
        for (k, sampling) in Sampling::ALL.iter().enumerate() {
            for i in 0..10 {
                let offset = -0.25 + 0.05 * i as f32;
                cells.push(Cell::new(*sampling, 0.25 * (k + 1) as f32, 0.5 + offset, 1.0 - offset));
            }
        }
        let cluster = Cluster::new(10.0, 0.5, 1.0).with_cells(cells.clone());
        let assembled = assembler.assemble(&cluster);

        for sampling in Sampling::ALL {
            let expected: f32 = cells
                .iter()
                .filter(|c| c.imaged_sampling() == Some(sampling))
                .filter(|c| {
                    GeometryBinner::new(&grid)
                        .bin(sampling, c.eta, c.phi, cluster.eta, cluster.phi)
                        .is_some()
                })
                .map(|c| c.e)
                .sum();
            let got = assembled.images.get(sampling).sum();
            assert!((got - expected).abs() < 1e-5, "{sampling}: {got} != {expected}");
        }
    }
}
