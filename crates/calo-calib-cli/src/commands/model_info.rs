//! Model info - list the tensors a model declares

use anyhow::{Context as _, Result};
use calo_energy_regression::{InferenceBackend, OrtBackend};
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct ModelInfoCommand {
    /// ONNX model file
    #[arg(short, long, value_name = "FILE")]
    model: PathBuf,
}

impl ModelInfoCommand {
    pub fn execute(self) -> Result<()> {
        let backend = OrtBackend::load(&self.model)
            .with_context(|| format!("Failed to load {}", self.model.display()))?;

        println!("{}", backend.model_path().display());
        println!("Inputs:");
        for spec in backend.input_specs() {
            println!("  {} {:?}", spec.name, spec.shape);
        }
        println!("Outputs:");
        for name in backend.output_names() {
            println!("  {}", name);
        }
        Ok(())
    }
}
