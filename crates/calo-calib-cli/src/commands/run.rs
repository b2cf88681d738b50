//! Run mode - calibrate every cluster of an event file

use anyhow::{Context as _, Result};
use calo_cluster_imaging::GridDefinition;
use calo_common::load_events;
use calo_energy_regression::{
    CalibrationConfig, ClusterCalibrator, ClusterId, ClusterRow, EnergyRegressor, JsonLinesSink,
    OrtBackend, RowSink,
};
use clap::Args;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Args)]
pub struct RunCommand {
    /// YAML configuration (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input events (JSON array)
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Output rows (JSON lines)
    #[arg(short, long, default_value = "clusters.jsonl")]
    output: PathBuf,

    /// Override the model path from the configuration
    #[arg(long)]
    model: Option<PathBuf>,

    /// Enable batching with this many clusters per inference call
    #[arg(long)]
    batch_size: Option<usize>,

    /// Disable batching regardless of the configuration
    #[arg(long, default_value = "false", conflicts_with = "batch_size")]
    no_batching: bool,

    /// Abort on the first failed cluster instead of skipping it
    #[arg(long, default_value = "false")]
    fail_fast: bool,
}

impl RunCommand {
    fn load_config(&self) -> Result<CalibrationConfig> {
        let mut config = match &self.config {
            Some(path) => CalibrationConfig::from_yaml(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => CalibrationConfig::default(),
        };
        if let Some(model) = &self.model {
            config.model_path = model.clone();
        }
        if let Some(size) = self.batch_size {
            config.batching.enabled = true;
            config.batching.size_of_batch = size;
        }
        if self.no_batching {
            config.batching.enabled = false;
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub fn execute(self) -> Result<()> {
        let start = Instant::now();
        let config = self.load_config()?;

        let events = load_events(&self.input)
            .with_context(|| format!("Failed to read events from {}", self.input.display()))?;
        info!("Loaded {} events from {}", events.len(), self.input.display());

        let grid = GridDefinition::default();
        let backend = OrtBackend::load(&config.model_path).context("Failed to load model")?;
        let regressor =
            EnergyRegressor::new(backend, &config.inputs, config.output.as_deref(), &grid)
                .context("Model does not match the image inputs")?;
        let mut calibrator = ClusterCalibrator::new(&grid, regressor, &config)?;
        let mut sink = JsonLinesSink::create(&self.output)
            .with_context(|| format!("Failed to create {}", self.output.display()))?;

        for event in &events {
            for (index, cluster) in event.clusters.iter().enumerate() {
                let id = ClusterId {
                    run_number: event.run_number,
                    event_number: event.event_number,
                    cluster_index: index,
                };
                match calibrator.process_cluster(id, cluster) {
                    Ok(rows) => write_rows(&mut sink, &rows)?,
                    Err(mut e) => {
                        write_rows(&mut sink, &e.take_completed())?;
                        if self.fail_fast {
                            return Err(e).context(format!("Cluster {:?} failed", id));
                        }
                        warn!("Skipping cluster(s) ending at {:?}: {}", id, e);
                    }
                }
            }
        }

        match calibrator.finish() {
            Ok(rows) => write_rows(&mut sink, &rows)?,
            Err(mut e) => {
                write_rows(&mut sink, &e.take_completed())?;
                if self.fail_fast {
                    return Err(e).context("Trailing batch failed");
                }
                warn!("Trailing batch failed: {}", e);
            }
        }
        sink.finish()?;

        let stats = calibrator.stats();

        info!(
            "Wrote {} rows to {} in {:.2}s",
            sink.rows(),
            self.output.display(),
            start.elapsed().as_secs_f64()
        );
        info!(
            "Clusters: {} seen, {} rejected, {} recorded, {} failed; {} batches ({} padded)",
            stats.clusters_seen,
            stats.clusters_rejected,
            stats.clusters_recorded,
            stats.clusters_failed,
            stats.batches_submitted,
            stats.padded_examples
        );
        info!(
            "Cells: {} imaged, {} below threshold, {} outside window, {} in unimaged samplings",
            stats.cells.admitted,
            stats.cells.below_threshold,
            stats.cells.outside_window,
            stats.cells.unimaged_sampling
        );
        Ok(())
    }
}

fn write_rows(sink: &mut impl RowSink, rows: &[ClusterRow]) -> Result<()> {
    for row in rows {
        sink.write_row(row)?;
    }
    Ok(())
}
