//! Combined images → contiguous model input buffers

use crate::combined::{ModelInput, ModelInputs};
use crate::grid::GridDefinition;
use crate::ImagingError;
use ndarray::Array4;
use tracing::debug;

/// One model input for a whole batch: `N × rows × cols × channels`
#[derive(Debug, Clone, PartialEq)]
pub struct PackedTensor {
    pub input: ModelInput,
    pub data: Array4<f32>,
}

impl PackedTensor {
    /// Shape as the `i64` dims the inference engine expects
    #[must_use]
    pub fn dims(&self) -> Vec<i64> {
        self.data.shape().iter().map(|&d| d as i64).collect()
    }

    /// Values of example `index`, flattened in row-major order
    #[must_use]
    pub fn example(&self, index: usize) -> Vec<f32> {
        self.data
            .index_axis(ndarray::Axis(0), index)
            .iter()
            .copied()
            .collect()
    }
}

/// Packed inputs for `examples` clusters, one tensor per [`ModelInput`]
#[derive(Debug, Clone, PartialEq)]
pub struct PackedBatch {
    tensors: Vec<PackedTensor>,
    examples: usize,
}

impl PackedBatch {
    #[must_use]
    pub fn examples(&self) -> usize {
        self.examples
    }

    #[must_use]
    pub fn tensors(&self) -> &[PackedTensor] {
        &self.tensors
    }

    #[must_use]
    pub fn tensor(&self, input: ModelInput) -> Option<&PackedTensor> {
        self.tensors.iter().find(|t| t.input == input)
    }
}

/// Serializes [`ModelInputs`] into batch tensors
#[derive(Debug, Clone, Copy)]
pub struct TensorPacker<'g> {
    grid: &'g GridDefinition,
}

impl<'g> TensorPacker<'g> {
    #[must_use]
    pub fn new(grid: &'g GridDefinition) -> Self {
        Self { grid }
    }

    /// Pack `examples` into tensors with leading dimension `batch_size`.
    ///
    /// # Errors
    /// Fails if `examples.len() != batch_size`, or if any image does not have
    /// the element count declared by the grid.
    pub fn pack(
        &self,
        examples: &[ModelInputs],
        batch_size: usize,
    ) -> Result<PackedBatch, ImagingError> {
        if batch_size == 0 {
            return Err(ImagingError::InvalidBatchSize(batch_size));
        }
        if examples.len() != batch_size {
            return Err(ImagingError::BatchSizeMismatch {
                declared: batch_size,
                actual: examples.len(),
            });
        }

        let mut tensors = Vec::with_capacity(ModelInput::ALL.len());
        for input in ModelInput::ALL {
            let (rows, cols, channels) = input.shape(self.grid);
            let per_example = rows * cols * channels;
            let expected = batch_size * per_example;

            let mut buffer = Vec::with_capacity(expected);
            for example in examples {
                let data = example.get(input).data();
                if data.len() != per_example {
                    return Err(ImagingError::ShapeMismatch {
                        input: input.as_str(),
                        expected: per_example,
                        actual: data.len(),
                    });
                }
                buffer.extend(data.iter().copied());
            }

            let actual = buffer.len();
            let data = Array4::from_shape_vec((batch_size, rows, cols, channels), buffer)
                .map_err(|_| ImagingError::ShapeMismatch {
                    input: input.as_str(),
                    expected,
                    actual,
                })?;
            tensors.push(PackedTensor { input, data });
        }

        debug!("Packed {} example(s) into {} tensors", batch_size, tensors.len());
        Ok(PackedBatch {
            tensors,
            examples: batch_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::ImageAssembler;
    use crate::combined::CombinedImage;
    use calo_common::{Cell, Cluster, Sampling};

    fn inputs_for(grid: &GridDefinition, e: f32) -> ModelInputs {
        let cluster = Cluster::new(e, 0.0, 0.0).with_cells(vec![
            Cell::new(Sampling::Emb1, e, 0.01, 0.01),
            Cell::new(Sampling::Emb2, e, -0.05, 0.05),
            Cell::new(Sampling::TileBar1, e, 0.1, -0.1),
        ]);
        let images = ImageAssembler::new(grid, 0.0).assemble(&cluster).images;
        ModelInputs::build(&images, grid).unwrap()
    }

    #[test]
    fn test_pack_single() {
        let grid = GridDefinition::barrel();
        let packer = TensorPacker::new(&grid);
        let batch = packer.pack(&[inputs_for(&grid, 2.0)], 1).unwrap();

        assert_eq!(batch.examples(), 1);
        let dims: Vec<Vec<i64>> = batch.tensors().iter().map(PackedTensor::dims).collect();
        assert_eq!(
            dims,
            vec![vec![1, 128, 4, 1], vec![1, 16, 16, 2], vec![1, 4, 4, 3]]
        );
        let total: f32 = batch.tensors().iter().map(|t| t.data.sum()).sum();
        assert_eq!(total, 6.0);
    }

    #[test]
    fn test_pack_batch_sizes_and_order() {
        let grid = GridDefinition::barrel();
        let packer = TensorPacker::new(&grid);
        let examples: Vec<ModelInputs> = (1..=5).map(|i| inputs_for(&grid, i as f32)).collect();
        let batch = packer.pack(&examples, 5).unwrap();

        for tensor in batch.tensors() {
            let per_example = tensor.input.example_len(&grid);
            assert_eq!(tensor.data.len(), 5 * per_example);
            for (i, example) in examples.iter().enumerate() {
                let expected: Vec<f32> = example.get(tensor.input).data().iter().copied().collect();
                assert_eq!(tensor.example(i), expected);
            }
        }
    }

    #[test]
    fn test_pack_wrong_count_fails() {
        let grid = GridDefinition::barrel();
        let packer = TensorPacker::new(&grid);
        let examples = vec![inputs_for(&grid, 1.0), inputs_for(&grid, 2.0)];
        assert_eq!(
            packer.pack(&examples, 3),
            Err(ImagingError::BatchSizeMismatch {
                declared: 3,
                actual: 2
            })
        );
        assert_eq!(packer.pack(&[], 0), Err(ImagingError::InvalidBatchSize(0)));
    }

    #[test]
    fn test_pack_misshapen_image_fails() {
        let grid = GridDefinition::barrel();
        let packer = TensorPacker::new(&grid);
        let mut inputs = inputs_for(&grid, 1.0);
        inputs.tiles = CombinedImage::zeros(ModelInput::Emb23, &grid);

        let err = packer.pack(&[inputs], 1).unwrap_err();
        assert!(matches!(
            err,
            ImagingError::ShapeMismatch {
                input: "Tiles",
                expected: 48,
                actual: 512
            }
        ));
    }
}
