//! Per-cluster cell scalars recorded next to the prediction

use crate::binner::wrap_phi;
use calo_common::Cluster;
use serde::{Deserialize, Serialize};

/// Highest-energy admitted cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CenterCell {
    pub eta: f32,
    pub phi: f32,
    /// `CaloSampling` id
    pub layer: u8,
}

/// Cell-distance extrema and energy sums over the cells above threshold.
///
/// Distances are measured from the cluster direction; `d_phi` is wrapped.
/// With no admitted cells every extremum is zero and `center` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSummary {
    pub n_cells: usize,
    pub sum_cell_e: f32,
    pub d_eta_min: f32,
    pub d_eta_max: f32,
    pub d_phi_min: f32,
    pub d_phi_max: f32,
    pub d_r_min: f32,
    pub d_r_max: f32,
    pub center: Option<CenterCell>,
    /// Cell energies divided by `sum_cell_e`, in cell order
    pub cell_e_norm: Vec<f32>,
}

impl CellSummary {
    #[must_use]
    pub fn compute(cluster: &Cluster, cell_e_thres: f32) -> Self {
        let mut summary = Self {
            n_cells: 0,
            sum_cell_e: 0.0,
            d_eta_min: f32::INFINITY,
            d_eta_max: f32::NEG_INFINITY,
            d_phi_min: f32::INFINITY,
            d_phi_max: f32::NEG_INFINITY,
            d_r_min: f32::INFINITY,
            d_r_max: f32::NEG_INFINITY,
            center: None,
            cell_e_norm: Vec::new(),
        };
        let mut center_e = f32::NEG_INFINITY;

        let admitted: Vec<_> = cluster
            .cells
            .iter()
            .filter(|c| c.e >= cell_e_thres)
            .collect();

        for cell in &admitted {
            let d_eta = cell.eta - cluster.eta;
            let d_phi = wrap_phi(cell.phi - cluster.phi);
            let d_r = d_eta.hypot(d_phi);

            summary.n_cells += 1;
            summary.sum_cell_e += cell.e;
            summary.d_eta_min = summary.d_eta_min.min(d_eta);
            summary.d_eta_max = summary.d_eta_max.max(d_eta);
            summary.d_phi_min = summary.d_phi_min.min(d_phi);
            summary.d_phi_max = summary.d_phi_max.max(d_phi);
            summary.d_r_min = summary.d_r_min.min(d_r);
            summary.d_r_max = summary.d_r_max.max(d_r);

            if cell.e > center_e {
                center_e = cell.e;
                summary.center = Some(CenterCell {
                    eta: cell.eta,
                    phi: cell.phi,
                    layer: cell.sampling,
                });
            }
        }

        if summary.n_cells == 0 {
            summary.d_eta_min = 0.0;
            summary.d_eta_max = 0.0;
            summary.d_phi_min = 0.0;
            summary.d_phi_max = 0.0;
            summary.d_r_min = 0.0;
            summary.d_r_max = 0.0;
            return summary;
        }

        summary.cell_e_norm = admitted
            .iter()
            .map(|c| {
                if summary.sum_cell_e != 0.0 {
                    c.e / summary.sum_cell_e
                } else {
                    0.0
                }
            })
            .collect();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calo_common::{Cell, Sampling};

    #[test]
    fn test_summary_extrema() {
        let cluster = Cluster::new(10.0, 0.5, 0.0).with_cells(vec![
            Cell::new(Sampling::Emb2, 6.0, 0.5, 0.0),
            Cell::new(Sampling::Emb1, 3.0, 0.25, 0.0),
            Cell::new(Sampling::TileBar0, 1.0, 0.5, 0.75),
            Cell::new(Sampling::Emb3, 0.001, 2.0, 2.0),
        ]);
        let summary = CellSummary::compute(&cluster, 0.005);

        assert_eq!(summary.n_cells, 3);
        assert_eq!(summary.sum_cell_e, 10.0);
        assert_eq!(summary.d_eta_min, -0.25);
        assert_eq!(summary.d_eta_max, 0.0);
        assert_eq!(summary.d_phi_min, 0.0);
        assert_eq!(summary.d_phi_max, 0.75);
        assert_eq!(summary.d_r_min, 0.0);
        assert_eq!(summary.d_r_max, 0.75);
        assert_eq!(
            summary.center,
            Some(CenterCell {
                eta: 0.5,
                phi: 0.0,
                layer: 2
            })
        );
        assert_eq!(summary.cell_e_norm, vec![0.6, 0.3, 0.1]);
    }

    #[test]
    fn test_summary_without_cells() {
        let summary = CellSummary::compute(&Cluster::new(1.0, 0.0, 0.0), 0.005);
        assert_eq!(summary.n_cells, 0);
        assert_eq!(summary.d_r_max, 0.0);
        assert!(summary.center.is_none());
        assert!(summary.cell_e_norm.is_empty());
    }
}
