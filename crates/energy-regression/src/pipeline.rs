//! Per-cluster calibration pipeline
//!
//! Cluster → images → combined images → packed tensors → prediction → row.
//! With batching enabled, clusters are held until a full group is available
//! and then submitted together; every accepted cluster ends up in exactly
//! one submitted batch.

use crate::backend::InferenceBackend;
use crate::client::EnergyRegressor;
use crate::collector::{ClusterId, ClusterRow, DuplicateCounts};
use crate::config::{BatchConfig, CalibrationConfig, PartialBatchPolicy, SelectionConfig};
use crate::error::{CalibrationError, ConfigError};
use calo_cluster_imaging::{
    CellStats, CellSummary, ClusterImages, GridDefinition, ImageAssembler, ModelInputs,
    TensorPacker,
};
use calo_common::Cluster;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Counters for a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub clusters_seen: usize,
    pub clusters_rejected: usize,
    pub clusters_recorded: usize,
    pub clusters_failed: usize,
    pub batches_submitted: usize,
    pub padded_examples: usize,
    pub cells: CellStats,
}

/// A cluster waiting for its batch to be submitted
struct PendingCluster {
    row: ClusterRow,
    inputs: ModelInputs,
}

/// Drives clusters through imaging and inference
pub struct ClusterCalibrator<'g, B: InferenceBackend> {
    grid: &'g GridDefinition,
    assembler: ImageAssembler<'g>,
    packer: TensorPacker<'g>,
    regressor: EnergyRegressor<B>,
    selection: SelectionConfig,
    batching: BatchConfig,
    images: ClusterImages,
    pending: Vec<PendingCluster>,
    stats: RunStats,
}

impl<'g, B: InferenceBackend> ClusterCalibrator<'g, B> {
    /// # Errors
    /// Fails if `config` is invalid, or if batching is enabled with a batch
    /// size the model's fixed batch dimension cannot accept.
    pub fn new(
        grid: &'g GridDefinition,
        regressor: EnergyRegressor<B>,
        config: &CalibrationConfig,
    ) -> Result<Self, CalibrationError> {
        config.validate()?;
        let batching = config.batching.clone();

        if let Some(fixed) = regressor.static_batch() {
            if fixed != batching.batch_size() {
                return Err(ConfigError::Invalid(format!(
                    "model expects batches of {}, configured batch size is {}",
                    fixed,
                    batching.batch_size()
                ))
                .into());
            }
            if batching.enabled && batching.partial_batch == PartialBatchPolicy::Flush {
                return Err(ConfigError::Invalid(format!(
                    "model expects batches of exactly {fixed}, partial_batch must be pad"
                ))
                .into());
            }
        }

        info!(
            "Calibrator ready: batching {} (size {}, {} per flush, partial: {:?})",
            if batching.enabled { "on" } else { "off" },
            batching.batch_size(),
            batching.clusters_per_flush(),
            batching.partial_batch
        );

        Ok(Self {
            grid,
            assembler: ImageAssembler::new(grid, config.selection.cell_e_thres),
            packer: TensorPacker::new(grid),
            regressor,
            selection: config.selection.clone(),
            batching,
            images: ClusterImages::zeros(grid),
            pending: Vec::new(),
            stats: RunStats::default(),
        })
    }

    #[must_use]
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Clusters accepted but not yet submitted
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Process one cluster.
    ///
    /// Returns the rows completed by this call: none for a rejected cluster
    /// or while a batch is still filling, one in single mode, a whole group
    /// when a batch flush happens.
    ///
    /// # Errors
    /// A failed inference call fails the clusters of that call only; rows of
    /// the other calls of the group come back in
    /// [`CalibrationError::BatchFailed`]. The pipeline stays usable for the
    /// next cluster.
    pub fn process_cluster(
        &mut self,
        id: ClusterId,
        cluster: &Cluster,
    ) -> Result<Vec<ClusterRow>, CalibrationError> {
        self.stats.clusters_seen += 1;

        if !self.selection.accepts(cluster) {
            debug!(
                "Cluster {:?} rejected (E={:.3}, eta={:.3})",
                id, cluster.e, cluster.eta
            );
            self.stats.clusters_rejected += 1;
            return Ok(Vec::new());
        }

        let cell_stats = self.assembler.assemble_into(cluster, &mut self.images);
        self.stats.cells.merge(&cell_stats);

        let inputs = match ModelInputs::build(&self.images, self.grid) {
            Ok(inputs) => inputs,
            Err(e) => {
                self.stats.clusters_failed += 1;
                return Err(e.into());
            }
        };
        let row = ClusterRow::collect(
            id,
            cluster,
            CellSummary::compute(cluster, self.selection.cell_e_thres),
            DuplicateCounts::from_images(&self.images),
        );
        debug!(
            "Cluster {:?}: {} cells admitted, image energy {:.3}",
            id,
            cell_stats.admitted,
            self.images.total()
        );

        self.pending.push(PendingCluster { row, inputs });
        if self.pending.len() >= self.batching.clusters_per_flush() {
            self.flush()
        } else {
            Ok(Vec::new())
        }
    }

    /// Submit whatever is still pending at end of input, following the
    /// partial batch policy
    pub fn finish(&mut self) -> Result<Vec<ClusterRow>, CalibrationError> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Flushing {} trailing cluster(s)", self.pending.len());
        self.flush()
    }

    /// Release the pipeline, handing back the regressor (and its session)
    pub fn into_regressor(self) -> EnergyRegressor<B> {
        if !self.pending.is_empty() {
            warn!(
                "Dropping {} cluster(s) that were never submitted",
                self.pending.len()
            );
        }
        self.regressor
    }

    /// Submit all pending clusters in batches of the configured size. The
    /// pending list is emptied before any submission; each inference call
    /// succeeds or fails on its own.
    fn flush(&mut self) -> Result<Vec<ClusterRow>, CalibrationError> {
        let group = std::mem::take(&mut self.pending);
        let batch_size = self.batching.batch_size();

        let mut completed = Vec::with_capacity(group.len());
        let mut failed = Vec::new();
        let mut first_error = None;

        let mut remaining = group.into_iter();
        loop {
            let chunk: Vec<PendingCluster> = remaining.by_ref().take(batch_size).collect();
            if chunk.is_empty() {
                break;
            }
            let (mut rows, inputs): (Vec<ClusterRow>, Vec<ModelInputs>) =
                chunk.into_iter().map(|p| (p.row, p.inputs)).unzip();

            let result = if inputs.len() == batch_size {
                self.predict_chunk(&inputs)
            } else {
                self.predict_partial(&inputs, batch_size)
            };
            match result {
                Ok(predictions) => {
                    for (row, prediction) in rows.iter_mut().zip(predictions) {
                        row.cluster_eng_pred = prediction;
                    }
                    completed.extend(rows);
                }
                Err(e) => {
                    warn!("Inference call for {} cluster(s) failed: {}", rows.len(), e);
                    failed.extend(rows.iter().map(ClusterRow::id));
                    first_error.get_or_insert(e);
                }
            }
        }

        self.stats.clusters_recorded += completed.len();
        self.stats.clusters_failed += failed.len();
        match first_error {
            None => Ok(completed),
            Some(source) => Err(CalibrationError::BatchFailed {
                completed,
                failed,
                source: Box::new(source),
            }),
        }
    }

    fn predict_chunk(&mut self, chunk: &[ModelInputs]) -> Result<Vec<f32>, CalibrationError> {
        let batch = self.packer.pack(chunk, chunk.len())?;
        let predictions = self.regressor.predict(&batch)?;
        self.stats.batches_submitted += 1;
        Ok(predictions)
    }

    fn predict_partial(
        &mut self,
        chunk: &[ModelInputs],
        batch_size: usize,
    ) -> Result<Vec<f32>, CalibrationError> {
        match self.batching.partial_batch {
            PartialBatchPolicy::Flush => self.predict_chunk(chunk),
            PartialBatchPolicy::Pad => {
                let padding = batch_size - chunk.len();
                let mut padded = chunk.to_vec();
                padded.resize(batch_size, ModelInputs::zeros(self.grid));
                self.stats.padded_examples += padding;

                let mut predictions = self.predict_chunk(&padded)?;
                predictions.truncate(chunk.len());
                Ok(predictions)
            }
        }
    }
}
