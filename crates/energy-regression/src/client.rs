//! Calibrated-energy regression client

use crate::backend::{InferenceBackend, NamedTensor, TensorSpec};
use crate::config::InputNames;
use crate::error::InferenceError;
use calo_cluster_imaging::{GridDefinition, ModelInput, PackedBatch};
use tracing::debug;

/// Binding of one packed image input to a model input
#[derive(Debug, Clone, PartialEq)]
struct InputBinding {
    input: ModelInput,
    spec: TensorSpec,
}

/// Submits packed cluster images to an [`InferenceBackend`] and decodes
/// one predicted energy per cluster.
///
/// Holds no state between calls other than the backend itself.
pub struct EnergyRegressor<B: InferenceBackend> {
    backend: B,
    bindings: Vec<InputBinding>,
    output: String,
}

impl<B: InferenceBackend> EnergyRegressor<B> {
    /// Bind the image inputs to the model's declared inputs.
    ///
    /// `output` selects the prediction tensor; the first model output is
    /// used when it is `None`.
    ///
    /// # Errors
    /// Fails if a named input or the output is missing, or if a declared
    /// input shape disagrees with the grid.
    pub fn new(
        backend: B,
        names: &InputNames,
        output: Option<&str>,
        grid: &GridDefinition,
    ) -> Result<Self, InferenceError> {
        let specs = backend.input_specs();
        let mut bindings = Vec::with_capacity(ModelInput::ALL.len());
        for input in ModelInput::ALL {
            let name = names.name(input);
            let spec = specs
                .iter()
                .find(|s| s.name == name)
                .cloned()
                .ok_or_else(|| InferenceError::MissingInput {
                    name: name.to_string(),
                    available: specs.iter().map(|s| s.name.clone()).collect(),
                })?;

            let (rows, cols, channels) = input.shape(grid);
            let expected = [-1, rows as i64, cols as i64, channels as i64];
            if !shape_compatible(&spec.shape, &expected) {
                return Err(InferenceError::InputShape {
                    name: spec.name,
                    declared: spec.shape,
                    actual: expected.to_vec(),
                });
            }
            bindings.push(InputBinding { input, spec });
        }

        let outputs = backend.output_names();
        let output = match output {
            Some(name) => outputs.iter().find(|o| o.as_str() == name).cloned(),
            None => outputs.first().cloned(),
        }
        .ok_or_else(|| InferenceError::MissingOutput {
            name: output.unwrap_or("<first>").to_string(),
            available: outputs.to_vec(),
        })?;

        debug!(
            "Regressor bound inputs {:?} -> output {}",
            bindings.iter().map(|b| b.spec.name.as_str()).collect::<Vec<_>>(),
            output
        );

        Ok(Self {
            backend,
            bindings,
            output,
        })
    }

    /// Batch size fixed by the model, if any input declares one
    #[must_use]
    pub fn static_batch(&self) -> Option<usize> {
        self.bindings.iter().find_map(|b| b.spec.static_batch())
    }

    #[must_use]
    pub fn output_name(&self) -> &str {
        &self.output
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Release the regressor, returning the backend
    #[must_use]
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Predict one calibrated energy per example of `batch`, in order.
    ///
    /// # Errors
    /// Fails on a backend error, when the packed shapes do not match the
    /// model, or when the output does not hold exactly one value per example.
    pub fn predict(&mut self, batch: &PackedBatch) -> Result<Vec<f32>, InferenceError> {
        let examples = batch.examples();
        let mut inputs = Vec::with_capacity(self.bindings.len());
        for binding in &self.bindings {
            let tensor = batch.tensor(binding.input).ok_or_else(|| {
                InferenceError::InvalidTensor(format!("batch lacks {}", binding.input.as_str()))
            })?;
            let shape = tensor.dims();
            if !shape_compatible(&binding.spec.shape, &shape) {
                return Err(InferenceError::InputShape {
                    name: binding.spec.name.clone(),
                    declared: binding.spec.shape.clone(),
                    actual: shape,
                });
            }
            inputs.push(NamedTensor {
                name: binding.spec.name.clone(),
                shape,
                data: tensor.data.iter().copied().collect(),
            });
        }

        let outputs = self.backend.run(inputs)?;
        let output = outputs
            .into_iter()
            .find(|o| o.name == self.output)
            .ok_or_else(|| InferenceError::MissingOutput {
                name: self.output.clone(),
                available: self.backend.output_names().to_vec(),
            })?;

        decode_predictions(output, examples)
    }
}

/// One scalar per example: leading dimension and element count must both
/// equal `examples`
fn decode_predictions(output: NamedTensor, examples: usize) -> Result<Vec<f32>, InferenceError> {
    let leading = output.shape.first().copied();
    if leading != Some(examples as i64) || output.data.len() != examples {
        return Err(InferenceError::OutputCount {
            name: output.name,
            shape: output.shape,
            values: output.data.len(),
            expected: examples,
        });
    }
    Ok(output.data)
}

/// `declared` matches `actual` when ranks agree and every fixed dimension
/// is equal; non-positive declared dimensions are dynamic
fn shape_compatible(declared: &[i64], actual: &[i64]) -> bool {
    declared.len() == actual.len()
        && declared
            .iter()
            .zip(actual)
            .all(|(&d, &a)| d <= 0 || a <= 0 || d == a)
}
