//! Common types for calorimeter cluster imaging and calibration
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Input data errors
#[derive(Debug, Error)]
pub enum DataError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed event data: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Result type for input data operations
pub type Result<T> = std::result::Result<T, DataError>;

/// Imaged calorimeter sampling layers, in the fixed order used everywhere
/// images are iterated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sampling {
    #[serde(rename = "PSB")]
    PreSamplerB,
    #[serde(rename = "EMB1")]
    Emb1,
    #[serde(rename = "EMB2")]
    Emb2,
    #[serde(rename = "EMB3")]
    Emb3,
    TileBar0,
    TileBar1,
    TileBar2,
}

impl Sampling {
    pub const COUNT: usize = 7;

    /// Iteration order for all per-sampling tables
    pub const ALL: [Sampling; Self::COUNT] = [
        Sampling::PreSamplerB,
        Sampling::Emb1,
        Sampling::Emb2,
        Sampling::Emb3,
        Sampling::TileBar0,
        Sampling::TileBar1,
        Sampling::TileBar2,
    ];

    /// Position of this sampling in [`Sampling::ALL`]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Map an ATLAS `CaloSampling` id to an imaged sampling.
    ///
    /// Endcap, HEC, FCal and extended/gap tile layers are not imaged and
    /// return `None`.
    #[must_use]
    pub fn from_calo_sampling(id: u8) -> Option<Self> {
        match id {
            0 => Some(Sampling::PreSamplerB),
            1 => Some(Sampling::Emb1),
            2 => Some(Sampling::Emb2),
            3 => Some(Sampling::Emb3),
            12 => Some(Sampling::TileBar0),
            13 => Some(Sampling::TileBar1),
            14 => Some(Sampling::TileBar2),
            _ => None,
        }
    }

    /// The `CaloSampling` id of this layer
    #[must_use]
    pub fn calo_sampling(self) -> u8 {
        match self {
            Sampling::PreSamplerB => 0,
            Sampling::Emb1 => 1,
            Sampling::Emb2 => 2,
            Sampling::Emb3 => 3,
            Sampling::TileBar0 => 12,
            Sampling::TileBar1 => 13,
            Sampling::TileBar2 => 14,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Sampling::PreSamplerB => "PSB",
            Sampling::Emb1 => "EMB1",
            Sampling::Emb2 => "EMB2",
            Sampling::Emb3 => "EMB3",
            Sampling::TileBar0 => "TileBar0",
            Sampling::TileBar1 => "TileBar1",
            Sampling::TileBar2 => "TileBar2",
        }
    }
}

impl fmt::Display for Sampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One calorimeter cell energy deposit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// `CaloSampling` id of the layer holding the cell
    pub sampling: u8,
    pub e: f32,
    pub eta: f32,
    pub phi: f32,
}

impl Cell {
    #[must_use]
    pub fn new(sampling: Sampling, e: f32, eta: f32, phi: f32) -> Self {
        Self {
            sampling: sampling.calo_sampling(),
            e,
            eta,
            phi,
        }
    }

    /// Imaged sampling of this cell, if any
    #[must_use]
    pub fn imaged_sampling(&self) -> Option<Sampling> {
        Sampling::from_calo_sampling(self.sampling)
    }
}

/// Truth particle matched to a cluster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruthParticle {
    pub e: f32,
    pub pt: f32,
    pub eta: f32,
    pub phi: f32,
}

/// Cluster moments computed upstream, carried to the output row unchanged
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterMoments {
    pub em_probability: Option<f32>,
    pub had_weight: Option<f32>,
    pub ooc_weight: Option<f32>,
    pub dm_weight: Option<f32>,
    pub center_mag: Option<f32>,
    pub first_eng_dens: Option<f32>,
    pub center_lambda: Option<f32>,
    pub isolation: Option<f32>,
    pub energy_digi_hs_truth: Option<f32>,
}

/// A calorimeter cluster: member cells and the reference direction used as
/// the image centre
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub e: f32,
    pub pt: f32,
    pub eta: f32,
    pub phi: f32,
    /// Calibration-hit truth energy (`ENG_CALIB_TOT`), when simulated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eng_calib_tot: Option<f32>,
    /// Calibration-hit energy outside the cluster (`ENG_CALIB_OUT_T`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eng_calib_out_t: Option<f32>,
    /// Calibration-hit energy in dead material (`ENG_CALIB_DEAD_TOT`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eng_calib_dead_tot: Option<f32>,
    /// Energy at the calibrated scale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_calib: Option<f32>,
    #[serde(default)]
    pub moments: ClusterMoments,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truth: Option<TruthParticle>,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

impl Cluster {
    /// Cluster with no cells centred on `(eta, phi)`
    #[must_use]
    pub fn new(e: f32, eta: f32, phi: f32) -> Self {
        Self {
            e,
            pt: e / eta.cosh(),
            eta,
            phi,
            eng_calib_tot: None,
            eng_calib_out_t: None,
            eng_calib_dead_tot: None,
            e_calib: None,
            moments: ClusterMoments::default(),
            truth: None,
            cells: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_cells(mut self, cells: Vec<Cell>) -> Self {
        self.cells = cells;
        self
    }
}

/// One event as supplied by the host: identifiers plus its clusters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub run_number: u32,
    pub event_number: u64,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
}

/// Load a JSON array of events
pub fn load_events<P: AsRef<Path>>(path: P) -> Result<Vec<Event>> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let events = serde_json::from_str(&contents)?;
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_order_and_ids() {
        for (i, s) in Sampling::ALL.iter().enumerate() {
            assert_eq!(s.index(), i);
            assert_eq!(Sampling::from_calo_sampling(s.calo_sampling()), Some(*s));
            assert_eq!(s.to_string(), s.as_str());
        }
        // EME1 and HEC0 are not imaged
        assert_eq!(Sampling::from_calo_sampling(5), None);
        assert_eq!(Sampling::from_calo_sampling(8), None);
    }

    #[test]
    fn test_load_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(
            &path,
            r#"[{"run_number": 1, "event_number": 42, "clusters": [
                {"e": 10.0, "pt": 9.0, "eta": 0.1, "phi": 0.2, "eng_calib_tot": 12.5,
                 "e_calib": 11.0, "moments": {"em_probability": 0.8, "isolation": 0.3},
                 "cells": [{"sampling": 2, "e": 5.0, "eta": 0.1, "phi": 0.2}]},
                {"e": 2.0, "pt": 2.0, "eta": 0.0, "phi": 0.0}
            ]}]"#,
        )
        .unwrap();

        let events = load_events(&path).unwrap();
        assert_eq!(events.len(), 1);
        let cluster = &events[0].clusters[0];
        assert_eq!(cluster.eng_calib_tot, Some(12.5));
        assert_eq!(cluster.e_calib, Some(11.0));
        assert_eq!(cluster.eng_calib_out_t, None);
        assert_eq!(cluster.moments.em_probability, Some(0.8));
        assert_eq!(cluster.moments.isolation, Some(0.3));
        assert_eq!(cluster.moments.center_lambda, None);
        assert!(cluster.truth.is_none());
        assert_eq!(cluster.cells[0].imaged_sampling(), Some(Sampling::Emb2));

        let bare = &events[0].clusters[1];
        assert_eq!(bare.moments, ClusterMoments::default());
        assert!(bare.cells.is_empty());
    }

    #[test]
    fn test_load_events_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_events(&path), Err(DataError::Malformed(_))));
    }
}
