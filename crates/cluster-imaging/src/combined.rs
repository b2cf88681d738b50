//! Multi-channel images fed to the regression model

use crate::grid::GridDefinition;
use crate::image::ClusterImages;
use crate::ImagingError;
use calo_common::Sampling;
use ndarray::{Array3, ArrayView2};
use serde::{Deserialize, Serialize};

/// The model's image inputs, in the order they are packed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelInput {
    /// Highest-granularity strip layer with a trivial channel axis
    #[serde(rename = "EMB1")]
    Emb1,
    /// Middle and back EM layers, channels `[EMB2, EMB3]`
    #[serde(rename = "EMB23")]
    Emb23,
    /// Tile barrel layers, channels `[TileBar0, TileBar1, TileBar2]`
    Tiles,
}

impl ModelInput {
    pub const ALL: [ModelInput; 3] = [ModelInput::Emb1, ModelInput::Emb23, ModelInput::Tiles];

    /// Constituent samplings in channel order
    #[must_use]
    pub fn samplings(self) -> &'static [Sampling] {
        match self {
            ModelInput::Emb1 => &[Sampling::Emb1],
            ModelInput::Emb23 => &[Sampling::Emb2, Sampling::Emb3],
            ModelInput::Tiles => &[Sampling::TileBar0, Sampling::TileBar1, Sampling::TileBar2],
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ModelInput::Emb1 => "EMB1",
            ModelInput::Emb23 => "EMB23",
            ModelInput::Tiles => "Tiles",
        }
    }

    #[must_use]
    pub fn channels(self) -> usize {
        self.samplings().len()
    }

    /// `(rows, cols, channels)` of this input under `grid`.
    ///
    /// Rows are those of the finest constituent; columns are those of the
    /// first constituent.
    #[must_use]
    pub fn shape(self, grid: &GridDefinition) -> (usize, usize, usize) {
        let samplings = self.samplings();
        let rows = samplings
            .iter()
            .map(|s| grid.shape(*s).rows)
            .max()
            .unwrap_or(0);
        let cols = grid.shape(samplings[0]).cols;
        (rows, cols, samplings.len())
    }

    /// Number of `f32` values one example contributes to this input
    #[must_use]
    pub fn example_len(self, grid: &GridDefinition) -> usize {
        let (rows, cols, channels) = self.shape(grid);
        rows * cols * channels
    }
}

/// A channel-last `rows × cols × channels` image
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedImage {
    input: ModelInput,
    data: Array3<f32>,
}

impl CombinedImage {
    /// Stack the constituent images of `input` along the channel axis.
    ///
    /// A constituent with fewer rows is expanded by repeating each of its
    /// rows `target_rows / rows` times; the row count must divide evenly and
    /// the column count must match.
    pub fn build(
        input: ModelInput,
        images: &ClusterImages,
        grid: &GridDefinition,
    ) -> Result<Self, ImagingError> {
        let (rows, cols, channels) = input.shape(grid);
        let mut data = Array3::zeros((rows, cols, channels));

        for (channel, sampling) in input.samplings().iter().enumerate() {
            let energy = images.get(*sampling).energy();
            let factor = row_factor(input, *sampling, energy.view(), rows, cols)?;
            for ((r, c), &e) in energy.indexed_iter() {
                for k in 0..factor {
                    data[[r * factor + k, c, channel]] = e;
                }
            }
        }

        Ok(Self { input, data })
    }

    /// All-zero image, used to pad short batches
    #[must_use]
    pub fn zeros(input: ModelInput, grid: &GridDefinition) -> Self {
        Self {
            input,
            data: Array3::zeros(input.shape(grid)),
        }
    }

    #[must_use]
    pub fn input(&self) -> ModelInput {
        self.input
    }

    #[must_use]
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Single channel as a 2-D view
    #[must_use]
    pub fn channel(&self, channel: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(ndarray::Axis(2), channel)
    }
}

fn row_factor(
    input: ModelInput,
    sampling: Sampling,
    energy: ArrayView2<'_, f32>,
    target_rows: usize,
    target_cols: usize,
) -> Result<usize, ImagingError> {
    let (rows, cols) = energy.dim();
    if rows == 0 || cols != target_cols || target_rows % rows != 0 {
        return Err(ImagingError::IncompatibleShape {
            input: input.as_str(),
            sampling: sampling.as_str(),
            rows,
            cols,
            target_rows,
            target_cols,
        });
    }
    Ok(target_rows / rows)
}

/// The three combined images of one cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInputs {
    pub emb1: CombinedImage,
    pub emb23: CombinedImage,
    pub tiles: CombinedImage,
}

impl ModelInputs {
    pub fn build(images: &ClusterImages, grid: &GridDefinition) -> Result<Self, ImagingError> {
        Ok(Self {
            emb1: CombinedImage::build(ModelInput::Emb1, images, grid)?,
            emb23: CombinedImage::build(ModelInput::Emb23, images, grid)?,
            tiles: CombinedImage::build(ModelInput::Tiles, images, grid)?,
        })
    }

    #[must_use]
    pub fn zeros(grid: &GridDefinition) -> Self {
        Self {
            emb1: CombinedImage::zeros(ModelInput::Emb1, grid),
            emb23: CombinedImage::zeros(ModelInput::Emb23, grid),
            tiles: CombinedImage::zeros(ModelInput::Tiles, grid),
        }
    }

    #[must_use]
    pub fn get(&self, input: ModelInput) -> &CombinedImage {
        match input {
            ModelInput::Emb1 => &self.emb1,
            ModelInput::Emb23 => &self.emb23,
            ModelInput::Tiles => &self.tiles,
        }
    }
}
