//! ONNX Runtime session creation
//!
//! The calibration model is tiny, so the session favours predictable
//! single-call latency: full graph optimization, physical-core intra-op
//! threads and the best available execution provider with CPU fallback.

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Error type for ONNX session creation
#[derive(Debug, thiserror::Error)]
pub enum OnnxError {
    #[error("Failed to create session builder: {0}")]
    SessionBuilderError(String),

    #[error("Failed to load ONNX model from {path}: {error}")]
    ModelLoadError { path: String, error: String },

    #[error("Model file not found: {0}")]
    ModelNotFound(String),
}

/// Intra-op thread count: `CALO_CALIB_THREADS` if set, else physical cores
fn intra_threads() -> usize {
    std::env::var("CALO_CALIB_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(num_cpus::get_physical)
}

fn base_builder(num_threads: usize) -> Result<SessionBuilder, OnnxError> {
    Session::builder()
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_intra_threads(num_threads)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_memory_pattern(true)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))
}

/// Create an optimized session for `model_path`.
///
/// Execution providers are tried in order CoreML, CUDA, CPU. If the
/// accelerated build fails to compile the model, the session is rebuilt
/// CPU-only.
///
/// # Errors
/// Returns [`OnnxError::ModelNotFound`] for a missing file and
/// [`OnnxError::ModelLoadError`] if neither build succeeds.
pub fn create_optimized_session(model_path: &Path) -> Result<Session, OnnxError> {
    if !model_path.exists() {
        return Err(OnnxError::ModelNotFound(model_path.display().to_string()));
    }

    let num_threads = intra_threads();
    let start = Instant::now();

    let accelerated = base_builder(num_threads)?
        .with_execution_providers([
            CoreMLExecutionProvider::default().build(),
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ])
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .commit_from_file(model_path);

    match accelerated {
        Ok(session) => {
            debug!(
                "Session for {} created in {:.3}s ({} threads)",
                model_path.display(),
                start.elapsed().as_secs_f64(),
                num_threads
            );
            Ok(session)
        }
        Err(e) => {
            warn!(
                "Accelerated session for {} failed ({}), retrying CPU-only",
                model_path.display(),
                e
            );
            let session = create_cpu_only_session(model_path)?;
            info!(
                "CPU-only session for {} created in {:.3}s",
                model_path.display(),
                start.elapsed().as_secs_f64()
            );
            Ok(session)
        }
    }
}

/// Create a session that only uses the CPU execution provider
pub fn create_cpu_only_session(model_path: &Path) -> Result<Session, OnnxError> {
    if !model_path.exists() {
        return Err(OnnxError::ModelNotFound(model_path.display().to_string()));
    }

    base_builder(intra_threads())?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .commit_from_file(model_path)
        .map_err(|e| OnnxError::ModelLoadError {
            path: model_path.display().to_string(),
            error: e.to_string(),
        })
}
