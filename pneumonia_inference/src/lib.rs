mod backbone;
mod classifier;
mod error;
mod head;
mod model_service;
mod prediction;
#[cfg(feature = "saliency")]
mod saliency;

pub mod config;
pub mod preprocess;

pub use backbone::{Backbone, Device, OrtBackbone};
pub use classifier::{ClassifierHandle, FallbackReason, ModelStatus, WeightStatus};
pub use error::{InferenceError, WeightLoadError};
pub use head::ClassifierHead;
pub use model_service::ModelService;
pub use prediction::{Label, Prediction, CLASS_LABELS};
