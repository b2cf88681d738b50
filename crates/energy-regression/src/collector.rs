//! Per-cluster output rows and their sinks

use crate::error::CalibrationError;
use calo_cluster_imaging::{CellSummary, ClusterImages};
use calo_common::{Cluster, Sampling};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Identifies a cluster within the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterId {
    pub run_number: u32,
    pub event_number: u64,
    pub cluster_index: usize,
}

/// Bins hit by more than one cell, per sampling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateCounts {
    #[serde(rename = "PSB")]
    pub psb: usize,
    #[serde(rename = "EMB1")]
    pub emb1: usize,
    #[serde(rename = "EMB2")]
    pub emb2: usize,
    #[serde(rename = "EMB3")]
    pub emb3: usize,
    #[serde(rename = "TileBar0")]
    pub tile_bar0: usize,
    #[serde(rename = "TileBar1")]
    pub tile_bar1: usize,
    #[serde(rename = "TileBar2")]
    pub tile_bar2: usize,
}

impl DuplicateCounts {
    #[must_use]
    pub fn from_images(images: &ClusterImages) -> Self {
        let counts = images.duplicate_counts();
        Self {
            psb: counts[Sampling::PreSamplerB.index()],
            emb1: counts[Sampling::Emb1.index()],
            emb2: counts[Sampling::Emb2.index()],
            emb3: counts[Sampling::Emb3.index()],
            tile_bar0: counts[Sampling::TileBar0.index()],
            tile_bar1: counts[Sampling::TileBar1.index()],
            tile_bar2: counts[Sampling::TileBar2.index()],
        }
    }

    #[must_use]
    pub fn get(&self, sampling: Sampling) -> usize {
        match sampling {
            Sampling::PreSamplerB => self.psb,
            Sampling::Emb1 => self.emb1,
            Sampling::Emb2 => self.emb2,
            Sampling::Emb3 => self.emb3,
            Sampling::TileBar0 => self.tile_bar0,
            Sampling::TileBar1 => self.tile_bar1,
            Sampling::TileBar2 => self.tile_bar2,
        }
    }
}

/// One output row. The field set never depends on cluster content:
/// missing truth, calibration hits and moments are written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRow {
    pub run_number: u32,
    pub event_number: u64,
    pub cluster_index: usize,

    pub cluster_n_cells: usize,
    pub cluster_e: f32,
    pub cluster_pt: f32,
    pub cluster_eta: f32,
    pub cluster_phi: f32,
    pub cluster_sum_cell_e: f32,
    pub cluster_eng_calib_tot: Option<f32>,
    pub cluster_eng_calib_out_t: Option<f32>,
    pub cluster_eng_calib_dead_tot: Option<f32>,
    pub cluster_e_calib: Option<f32>,
    pub cluster_eng_pred: f32,

    pub cluster_em_probability: Option<f32>,
    pub cluster_had_weight: Option<f32>,
    pub cluster_ooc_weight: Option<f32>,
    pub cluster_dm_weight: Option<f32>,
    pub cluster_center_mag: Option<f32>,
    pub cluster_first_eng_dens: Option<f32>,
    pub cluster_center_lambda: Option<f32>,
    pub cluster_isolation: Option<f32>,
    pub cluster_energy_digi_hs_truth: Option<f32>,

    pub cluster_truth_e: Option<f32>,
    pub cluster_truth_pt: Option<f32>,
    pub cluster_truth_eta: Option<f32>,
    pub cluster_truth_phi: Option<f32>,

    pub cell_d_eta_min: f32,
    pub cell_d_eta_max: f32,
    pub cell_d_phi_min: f32,
    pub cell_d_phi_max: f32,
    pub cell_d_r_min: f32,
    pub cell_d_r_max: f32,

    pub center_cell_eta: Option<f32>,
    pub center_cell_phi: Option<f32>,
    pub center_cell_layer: Option<u8>,

    pub cell_e_norm: Vec<f32>,
    pub duplicates: DuplicateCounts,
}

impl ClusterRow {
    /// Gather everything but the prediction, which starts as NaN
    #[must_use]
    pub fn collect(
        id: ClusterId,
        cluster: &Cluster,
        summary: CellSummary,
        duplicates: DuplicateCounts,
    ) -> Self {
        let center = summary.center;
        let moments = cluster.moments;
        Self {
            run_number: id.run_number,
            event_number: id.event_number,
            cluster_index: id.cluster_index,
            cluster_n_cells: summary.n_cells,
            cluster_e: cluster.e,
            cluster_pt: cluster.pt,
            cluster_eta: cluster.eta,
            cluster_phi: cluster.phi,
            cluster_sum_cell_e: summary.sum_cell_e,
            cluster_eng_calib_tot: cluster.eng_calib_tot,
            cluster_eng_calib_out_t: cluster.eng_calib_out_t,
            cluster_eng_calib_dead_tot: cluster.eng_calib_dead_tot,
            cluster_e_calib: cluster.e_calib,
            cluster_eng_pred: f32::NAN,
            cluster_em_probability: moments.em_probability,
            cluster_had_weight: moments.had_weight,
            cluster_ooc_weight: moments.ooc_weight,
            cluster_dm_weight: moments.dm_weight,
            cluster_center_mag: moments.center_mag,
            cluster_first_eng_dens: moments.first_eng_dens,
            cluster_center_lambda: moments.center_lambda,
            cluster_isolation: moments.isolation,
            cluster_energy_digi_hs_truth: moments.energy_digi_hs_truth,
            cluster_truth_e: cluster.truth.map(|t| t.e),
            cluster_truth_pt: cluster.truth.map(|t| t.pt),
            cluster_truth_eta: cluster.truth.map(|t| t.eta),
            cluster_truth_phi: cluster.truth.map(|t| t.phi),
            cell_d_eta_min: summary.d_eta_min,
            cell_d_eta_max: summary.d_eta_max,
            cell_d_phi_min: summary.d_phi_min,
            cell_d_phi_max: summary.d_phi_max,
            cell_d_r_min: summary.d_r_min,
            cell_d_r_max: summary.d_r_max,
            center_cell_eta: center.map(|c| c.eta),
            center_cell_phi: center.map(|c| c.phi),
            center_cell_layer: center.map(|c| c.layer),
            cell_e_norm: summary.cell_e_norm,
            duplicates,
        }
    }

    #[must_use]
    pub fn id(&self) -> ClusterId {
        ClusterId {
            run_number: self.run_number,
            event_number: self.event_number,
            cluster_index: self.cluster_index,
        }
    }
}

/// Destination for finished rows
pub trait RowSink {
    fn write_row(&mut self, row: &ClusterRow) -> Result<(), CalibrationError>;

    /// Flush buffered rows
    fn finish(&mut self) -> Result<(), CalibrationError> {
        Ok(())
    }
}

impl RowSink for Vec<ClusterRow> {
    fn write_row(&mut self, row: &ClusterRow) -> Result<(), CalibrationError> {
        self.push(row.clone());
        Ok(())
    }
}

/// Writes one JSON object per line
pub struct JsonLinesSink<W: Write> {
    writer: BufWriter<W>,
    rows: usize,
}

impl JsonLinesSink<File> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let file = File::create(path.as_ref())?;
        debug!("Writing cluster rows to {}", path.as_ref().display());
        Ok(Self::new(file))
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            rows: 0,
        }
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }
}

impl<W: Write> RowSink for JsonLinesSink<W> {
    fn write_row(&mut self, row: &ClusterRow) -> Result<(), CalibrationError> {
        serde_json::to_writer(&mut self.writer, row)?;
        self.writer.write_all(b"\n")?;
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CalibrationError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calo_cluster_imaging::{GridDefinition, ImageAssembler};
    use calo_common::{Cell, ClusterMoments, TruthParticle};

    fn sample_row(with_truth: bool) -> ClusterRow {
        let grid = GridDefinition::barrel();
        let mut cluster = Cluster::new(9.0, 0.0, 0.0).with_cells(vec![
            Cell::new(Sampling::Emb2, 5.0, -0.14, -0.11),
            Cell::new(Sampling::Emb2, 3.0, -0.14, -0.11),
            Cell::new(Sampling::TileBar0, 1.0, 0.05, 0.05),
        ]);
        if with_truth {
            cluster.eng_calib_tot = Some(11.0);
            cluster.eng_calib_out_t = Some(0.4);
            cluster.eng_calib_dead_tot = Some(0.9);
            cluster.e_calib = Some(10.5);
            cluster.moments = ClusterMoments {
                em_probability: Some(0.75),
                center_lambda: Some(310.0),
                isolation: Some(0.5),
                ..ClusterMoments::default()
            };
            cluster.truth = Some(TruthParticle {
                e: 12.0,
                pt: 11.5,
                eta: 0.01,
                phi: 0.02,
            });
        }
        let images = ImageAssembler::new(&grid, 0.005).assemble(&cluster).images;
        let id = ClusterId {
            run_number: 7,
            event_number: 99,
            cluster_index: 3,
        };
        ClusterRow::collect(
            id,
            &cluster,
            CellSummary::compute(&cluster, 0.005),
            DuplicateCounts::from_images(&images),
        )
    }

    #[test]
    fn test_collect_fields() {
        let row = sample_row(true);
        assert_eq!(row.cluster_n_cells, 3);
        assert_eq!(row.cluster_sum_cell_e, 9.0);
        assert_eq!(row.duplicates.get(Sampling::Emb2), 1);
        assert_eq!(row.duplicates.get(Sampling::TileBar0), 0);
        assert_eq!(row.center_cell_layer, Some(2));
        assert_eq!(row.cluster_truth_e, Some(12.0));
        assert_eq!(row.cluster_eng_calib_out_t, Some(0.4));
        assert_eq!(row.cluster_eng_calib_dead_tot, Some(0.9));
        assert_eq!(row.cluster_e_calib, Some(10.5));
        assert_eq!(row.cluster_em_probability, Some(0.75));
        assert_eq!(row.cluster_center_lambda, Some(310.0));
        assert_eq!(row.cluster_isolation, Some(0.5));
        assert_eq!(row.cluster_had_weight, None);
        assert!(row.cluster_eng_pred.is_nan());
        assert_eq!(row.id().cluster_index, 3);
    }

    #[test]
    fn test_schema_is_stable() {
        let mut with_truth = sample_row(true);
        let mut without_truth = sample_row(false);
        with_truth.cluster_eng_pred = 10.0;
        without_truth.cluster_eng_pred = 10.0;

        let keys = |row: &ClusterRow| -> Vec<String> {
            let value = serde_json::to_value(row).unwrap();
            value.as_object().unwrap().keys().cloned().collect()
        };
        assert_eq!(keys(&with_truth), keys(&without_truth));

        let value = serde_json::to_value(&without_truth).unwrap();
        assert!(value["cluster_truth_e"].is_null());
        assert!(value["cluster_e_calib"].is_null());
        assert!(value["cluster_eng_calib_dead_tot"].is_null());
        assert!(value["cluster_em_probability"].is_null());
        assert!(value["cluster_energy_digi_hs_truth"].is_null());

        let value = serde_json::to_value(&with_truth).unwrap();
        assert_eq!(value["cluster_em_probability"], 0.75);
        assert!(value["cluster_ooc_weight"].is_null());
        assert_eq!(value["duplicates"]["EMB2"], 1);
    }

    #[test]
    fn test_json_lines_sink() {
        let mut buffer = Vec::new();
        {
            let mut sink = JsonLinesSink::new(&mut buffer);
            let mut row = sample_row(false);
            row.cluster_eng_pred = 8.5;
            sink.write_row(&row).unwrap();
            sink.write_row(&row).unwrap();
            assert_eq!(sink.rows(), 2);
            sink.finish().unwrap();
        }
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let row: ClusterRow = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(row.cluster_eng_pred, 8.5);
        assert_eq!(row.event_number, 99);
    }

    #[test]
    fn test_json_lines_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        let mut sink = JsonLinesSink::create(&path).unwrap();
        let mut row = sample_row(true);
        row.cluster_eng_pred = 1.0;
        sink.write_row(&row).unwrap();
        sink.finish().unwrap();
        drop(sink);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
