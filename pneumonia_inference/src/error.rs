use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Model file not found: {0:?}")]
    ModelNotFound(PathBuf),
    #[error("Failed to build backbone session: {0}")]
    Session(String),
    #[error("Error decoding image: {0}")]
    Decode(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Unexpected feature map shape {actual:?}, expected {expected} channels")]
    FeatureShape { actual: Vec<usize>, expected: usize },
    #[error("Saliency map is not available")]
    SaliencyUnavailable,
    #[error("Model is not loaded")]
    ModelUnavailable,
}

#[derive(Error, Debug)]
pub enum WeightLoadError {
    #[error("Failed to read weight file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse weight file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid weight shape: {0}")]
    Shape(String),
}
