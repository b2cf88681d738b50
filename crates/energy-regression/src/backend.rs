//! Inference engine seam
//!
//! The regression client only needs model metadata and a synchronous
//! `run(named inputs) -> named outputs`. [`OrtBackend`] provides it on top
//! of an ONNX Runtime session; tests substitute their own backends.

use crate::error::InferenceError;
use crate::onnx_utils::create_optimized_session;
use ndarray::{ArrayD, IxDyn};
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Declared model input: name and shape, `-1` for dynamic dimensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
    pub name: String,
    pub shape: Vec<i64>,
}

impl TensorSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, shape: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    /// Leading dimension if it is fixed by the model
    #[must_use]
    pub fn static_batch(&self) -> Option<usize> {
        self.shape
            .first()
            .copied()
            .filter(|&d| d > 0)
            .map(|d| d as usize)
    }
}

/// A flat `f32` buffer with its shape
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTensor {
    pub name: String,
    pub shape: Vec<i64>,
    pub data: Vec<f32>,
}

impl NamedTensor {
    /// Number of elements implied by `shape`
    #[must_use]
    pub fn declared_len(&self) -> usize {
        self.shape.iter().map(|&d| d.max(0) as usize).product()
    }
}

/// Synchronous inference capability
pub trait InferenceBackend {
    /// Model inputs, in declaration order
    fn input_specs(&self) -> &[TensorSpec];

    /// Model output names, in declaration order
    fn output_names(&self) -> &[String];

    /// Run the model once
    fn run(&mut self, inputs: Vec<NamedTensor>) -> Result<Vec<NamedTensor>, InferenceError>;
}

/// ONNX Runtime backed inference.
///
/// The session is created once in [`OrtBackend::load`] and released when
/// the backend is dropped.
pub struct OrtBackend {
    session: Session,
    model_path: PathBuf,
    inputs: Vec<TensorSpec>,
    outputs: Vec<String>,
}

impl OrtBackend {
    /// Load the model at `model_path`
    ///
    /// # Errors
    /// Returns error if the model is missing, fails to load, or declares a
    /// non-tensor input
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self, InferenceError> {
        let model_path = model_path.as_ref();
        info!("Loading calibration model from {}", model_path.display());

        let session = create_optimized_session(model_path)?;

        let mut inputs = Vec::with_capacity(session.inputs.len());
        for input in &session.inputs {
            let shape = match &input.input_type {
                ValueType::Tensor { shape, .. } => shape.iter().copied().collect(),
                other => {
                    return Err(InferenceError::InvalidTensor(format!(
                        "input {} is not a tensor: {:?}",
                        input.name, other
                    )))
                }
            };
            inputs.push(TensorSpec::new(input.name.clone(), shape));
        }
        let outputs: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

        debug!("Model inputs: {:?}, outputs: {:?}", inputs, outputs);

        Ok(Self {
            session,
            model_path: model_path.to_path_buf(),
            inputs,
            outputs,
        })
    }

    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl InferenceBackend for OrtBackend {
    fn input_specs(&self) -> &[TensorSpec] {
        &self.inputs
    }

    fn output_names(&self) -> &[String] {
        &self.outputs
    }

    fn run(&mut self, inputs: Vec<NamedTensor>) -> Result<Vec<NamedTensor>, InferenceError> {
        let mut session_inputs = Vec::with_capacity(inputs.len());
        for tensor in inputs {
            let dims: Vec<usize> = tensor.shape.iter().map(|&d| d.max(0) as usize).collect();
            let array = ArrayD::from_shape_vec(IxDyn(&dims), tensor.data).map_err(|e| {
                InferenceError::InvalidTensor(format!("{}: {}", tensor.name, e))
            })?;
            let value = Tensor::from_array(array)?;
            session_inputs.push((tensor.name, value));
        }

        let outputs = self.session.run(session_inputs)?;

        collect_outputs(&self.outputs, |name| {
            outputs.get(name).map(|value| {
                let (shape, data) = value.try_extract_tensor::<f32>()?;
                Ok((shape.to_vec(), data.to_vec()))
            })
        })
    }
}

/// Decode every declared output, in declaration order. `extract` returns
/// `None` when the session produced no value under that name.
fn collect_outputs<F>(
    names: &[String],
    mut extract: F,
) -> Result<Vec<NamedTensor>, InferenceError>
where
    F: FnMut(&str) -> Option<Result<(Vec<i64>, Vec<f32>), InferenceError>>,
{
    let mut decoded = Vec::with_capacity(names.len());
    for name in names {
        let (shape, data) = extract(name).ok_or_else(|| InferenceError::MissingOutput {
            name: name.clone(),
            available: names.to_vec(),
        })??;
        decoded.push(NamedTensor {
            name: name.clone(),
            shape,
            data,
        });
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onnx_utils::OnnxError;

    #[test]
    fn test_static_batch() {
        assert_eq!(TensorSpec::new("EMB1", vec![4, 128, 4, 1]).static_batch(), Some(4));
        assert_eq!(TensorSpec::new("EMB1", vec![-1, 128, 4, 1]).static_batch(), None);
        assert_eq!(TensorSpec::new("scalar", vec![]).static_batch(), None);
    }

    #[test]
    fn test_declared_len() {
        let tensor = NamedTensor {
            name: "Tiles".to_string(),
            shape: vec![2, 4, 4, 3],
            data: vec![0.0; 96],
        };
        assert_eq!(tensor.declared_len(), 96);
    }

    #[test]
    fn test_collect_outputs_in_declared_order() {
        let names = vec!["energy".to_string(), "sigma".to_string()];
        let decoded = collect_outputs(&names, |name| match name {
            "energy" => Some(Ok((vec![2, 1], vec![10.0, 20.0]))),
            "sigma" => Some(Ok((vec![2, 1], vec![0.5, 0.7]))),
            _ => None,
        })
        .unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].name, "energy");
        assert_eq!(decoded[0].data, vec![10.0, 20.0]);
        assert_eq!(decoded[1].name, "sigma");
        assert_eq!(decoded[1].shape, vec![2, 1]);
    }

    #[test]
    fn test_collect_outputs_missing_value() {
        let names = vec!["energy".to_string(), "sigma".to_string()];
        let result = collect_outputs(&names, |name| {
            (name == "energy").then(|| Ok((vec![1], vec![3.0])))
        });
        match result {
            Err(InferenceError::MissingOutput { name, available }) => {
                assert_eq!(name, "sigma");
                assert_eq!(available, names);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let result = collect_outputs(&names, |_| {
            Some(Err(InferenceError::InvalidTensor("not f32".to_string())))
        });
        assert!(matches!(result, Err(InferenceError::InvalidTensor(_))));
    }

    #[test]
    fn test_load_missing_model() {
        let result = OrtBackend::load("models/does-not-exist.onnx");
        assert!(matches!(
            result,
            Err(InferenceError::ModelLoad(OnnxError::ModelNotFound(_)))
        ));
    }
}
