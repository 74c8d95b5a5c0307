use crate::{error::WeightLoadError, prediction::CLASS_LABELS};
use ndarray::{Array1, Array2, Array3, ArrayView3, Axis};
use rand::Rng;
use serde::Deserialize;
use std::path::Path;

/// On-disk layout of the fine-tuned classification layer.
#[derive(Debug, Deserialize)]
struct HeadWeights {
    weight: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

/// Global average pooling followed by the 2-class linear layer that replaces
/// the backbone's original ImageNet classifier.
#[derive(Debug, Clone)]
pub struct ClassifierHead {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl ClassifierHead {
    pub fn new(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self, WeightLoadError> {
        if weight.nrows() != CLASS_LABELS.len() || bias.len() != CLASS_LABELS.len() {
            return Err(WeightLoadError::Shape(format!(
                "expected {} classes, got weight {:?} and bias {}",
                CLASS_LABELS.len(),
                weight.shape(),
                bias.len()
            )));
        }
        Ok(Self { weight, bias })
    }

    /// Fresh layer, uniform in [-1/sqrt(fan_in), 1/sqrt(fan_in)].
    pub fn initialize<R: Rng>(in_features: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (in_features as f32).sqrt();
        let classes = CLASS_LABELS.len();
        let weight = Array2::from_shape_simple_fn((classes, in_features), || {
            rng.random_range(-bound..bound)
        });
        let bias = Array1::from_shape_simple_fn(classes, || rng.random_range(-bound..bound));
        Self { weight, bias }
    }

    pub fn from_file(path: &Path, in_features: usize) -> Result<Self, WeightLoadError> {
        let contents = std::fs::read(path)?;
        let weights: HeadWeights = serde_json::from_slice(&contents)?;

        if let Some(row) = weights.weight.iter().find(|row| row.len() != in_features) {
            return Err(WeightLoadError::Shape(format!(
                "expected {} input features, found a row of {}",
                in_features,
                row.len()
            )));
        }

        let rows = weights.weight.len();
        let flat: Vec<f32> = weights.weight.into_iter().flatten().collect();
        let weight = Array2::from_shape_vec((rows, in_features), flat)
            .map_err(|e| WeightLoadError::Shape(e.to_string()))?;

        Self::new(weight, Array1::from_vec(weights.bias))
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    /// Logits for a single `[C, H, W]` feature map.
    pub fn forward(&self, features: ArrayView3<f32>) -> Array1<f32> {
        let pooled = features
            .mean_axis(Axis(2))
            .and_then(|rows| rows.mean_axis(Axis(1)))
            .unwrap_or_else(|| Array1::zeros(features.shape()[0]));
        self.weight.dot(&pooled) + &self.bias
    }

    /// Gradient of `class`'s logit with respect to an `[C, height, width]`
    /// feature map.
    pub fn logit_gradient(&self, class: usize, height: usize, width: usize) -> Array3<f32> {
        let area = (height * width).max(1) as f32;
        let row = self.weight.row(class);
        Array3::from_shape_fn((row.len(), height, width), |(k, _, _)| row[k] / area)
    }
}
