use crate::{classifier::ModelStatus, error::InferenceError, prediction::Prediction};
use image::RgbImage;

/// Blocking inference operations the web shell drives, one image at a time.
pub trait ModelService: Send + Sync + 'static {
    fn status(&self) -> ModelStatus;
    fn predict(&self, image_data: &[u8]) -> Result<Prediction, InferenceError>;
    fn saliency_overlay(&self, image_data: &[u8]) -> Option<RgbImage>;
}
