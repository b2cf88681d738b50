//! Inspect mode - images of a single cluster, no model involved

use anyhow::{Context as _, Result};
use calo_cluster_imaging::{CellSummary, CombinedImage, GridDefinition, ImageAssembler, ModelInputs};
use calo_common::load_events;
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct InspectCommand {
    /// Input events (JSON array)
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Event position in the file
    #[arg(long, default_value = "0")]
    event: usize,

    /// Cluster position in the event
    #[arg(long, default_value = "0")]
    cluster: usize,

    /// Per-cell energy threshold
    #[arg(long, default_value = "0.005")]
    cell_e_thres: f32,

    /// Print the summary as JSON
    #[arg(long, default_value = "false")]
    json: bool,
}

impl InspectCommand {
    pub fn execute(self) -> Result<()> {
        let events = load_events(&self.input)
            .with_context(|| format!("Failed to read events from {}", self.input.display()))?;
        let event = events
            .get(self.event)
            .with_context(|| format!("No event {} ({} in file)", self.event, events.len()))?;
        let cluster = event.clusters.get(self.cluster).with_context(|| {
            format!(
                "No cluster {} in event {} ({} clusters)",
                self.cluster,
                event.event_number,
                event.clusters.len()
            )
        })?;

        let grid = GridDefinition::default();
        let assembled = ImageAssembler::new(&grid, self.cell_e_thres).assemble(cluster);
        let inputs = ModelInputs::build(&assembled.images, &grid)?;
        let summary = CellSummary::compute(cluster, self.cell_e_thres);

        if self.json {
            let samplings: Vec<serde_json::Value> = assembled
                .images
                .iter()
                .map(|(sampling, image)| {
                    serde_json::json!({
                        "sampling": sampling.as_str(),
                        "rows": image.shape().rows,
                        "cols": image.shape().cols,
                        "energy": image.sum(),
                        "duplicate_bins": image.duplicate_bins(),
                    })
                })
                .collect();
            let combined: Vec<serde_json::Value> = combined_images(&inputs)
                .iter()
                .map(|image| {
                    serde_json::json!({
                        "input": image.input().as_str(),
                        "shape": image.data().shape(),
                        "channel_energy": channel_energies(image),
                    })
                })
                .collect();
            let report = serde_json::json!({
                "event_number": event.event_number,
                "cluster_index": self.cluster,
                "cells": assembled.stats,
                "summary": summary,
                "samplings": samplings,
                "inputs": combined,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!(
            "Event {} cluster {}: E={:.3} eta={:.3} phi={:.3}, {} cells",
            event.event_number,
            self.cluster,
            cluster.e,
            cluster.eta,
            cluster.phi,
            cluster.cells.len()
        );
        println!(
            "  cells: {} imaged, {} below threshold, {} outside window, {} unimaged sampling",
            assembled.stats.admitted,
            assembled.stats.below_threshold,
            assembled.stats.outside_window,
            assembled.stats.unimaged_sampling
        );
        println!(
            "  dEta [{:.3}, {:.3}]  dPhi [{:.3}, {:.3}]  dR [{:.3}, {:.3}]",
            summary.d_eta_min,
            summary.d_eta_max,
            summary.d_phi_min,
            summary.d_phi_max,
            summary.d_r_min,
            summary.d_r_max
        );
        for (sampling, image) in assembled.images.iter() {
            let shape = image.shape();
            println!(
                "  {:<9} {:>3}x{:<3} E={:>10.4}  duplicate bins={}",
                sampling.as_str(),
                shape.rows,
                shape.cols,
                image.sum(),
                image.duplicate_bins()
            );
        }
        for image in combined_images(&inputs) {
            let (rows, cols, channels) = image.data().dim();
            let energies = channel_energies(image)
                .iter()
                .zip(image.input().samplings())
                .map(|(e, sampling)| format!("{}={:.4}", sampling.as_str(), e))
                .collect::<Vec<_>>()
                .join(" ");
            println!(
                "  input {:<6} {}x{}x{}  {}",
                image.input().as_str(),
                rows,
                cols,
                channels,
                energies
            );
        }
        Ok(())
    }
}

fn combined_images(inputs: &ModelInputs) -> [&CombinedImage; 3] {
    [&inputs.emb1, &inputs.emb23, &inputs.tiles]
}

/// Energy in each channel; replicated rows count once per copy
fn channel_energies(image: &CombinedImage) -> Vec<f32> {
    (0..image.data().dim().2)
        .map(|channel| image.channel(channel).sum())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use calo_cluster_imaging::ModelInput;
    use calo_common::{Cell, Cluster, Sampling};

    #[test]
    fn test_channel_energies_per_input() {
        let grid = GridDefinition::default();
        let cluster = Cluster::new(5.0, 0.0, 0.0).with_cells(vec![
            Cell::new(Sampling::Emb2, 1.0, 0.0, 0.0),
            Cell::new(Sampling::Emb3, 2.0, 0.0, 0.0),
            Cell::new(Sampling::TileBar1, 0.5, 0.0, 0.0),
        ]);
        let assembled = ImageAssembler::new(&grid, 0.005).assemble(&cluster);
        let inputs = ModelInputs::build(&assembled.images, &grid).unwrap();

        let images = combined_images(&inputs);
        let order: Vec<ModelInput> = images.iter().map(|image| image.input()).collect();
        assert_eq!(order, ModelInput::ALL.to_vec());

        assert_eq!(channel_energies(images[0]), vec![0.0]);
        // EMB3 rows are doubled to match EMB2
        assert_eq!(channel_energies(images[1]), vec![1.0, 4.0]);
        assert_eq!(channel_energies(images[2]), vec![0.0, 0.5, 0.0]);
    }
}
