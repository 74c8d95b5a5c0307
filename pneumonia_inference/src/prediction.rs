use ndarray::{Array1, ArrayView1};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Label {
    Normal,
    Pneumonia,
    /// Sentinel returned when no model is loaded.
    Unavailable,
}

/// Output order of the classifier head.
pub const CLASS_LABELS: [Label; 2] = [Label::Normal, Label::Pneumonia];

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Normal => "Normal",
            Label::Pneumonia => "Pneumonia",
            Label::Unavailable => "Model unavailable",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub label: Label,
    /// Probability of `label` as a percentage in [0, 100].
    pub confidence: f32,
}

impl Prediction {
    pub fn unavailable() -> Self {
        Self {
            label: Label::Unavailable,
            confidence: 0.0,
        }
    }

    pub fn from_logits(logits: ArrayView1<f32>) -> Self {
        let probabilities = softmax(logits);
        let (index, probability) = argmax(probabilities.view());
        Self {
            label: CLASS_LABELS
                .get(index)
                .copied()
                .unwrap_or(Label::Unavailable),
            confidence: (probability * 100.0).clamp(0.0, 100.0),
        }
    }
}

pub fn softmax(logits: ArrayView1<f32>) -> Array1<f32> {
    let max = logits.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
    let exp = logits.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Index and value of the largest element; the first one wins on ties.
pub fn argmax(values: ArrayView1<f32>) -> (usize, f32) {
    values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |accum, item| {
            if item.1 > accum.1 {
                item
            } else {
                accum
            }
        })
}
