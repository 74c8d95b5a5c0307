use image::RgbImage;
use pneumonia_inference::{
    Device, InferenceError, Label, ModelService, ModelStatus, Prediction,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

#[derive(Clone)]
pub struct MockModelService {
    ready: bool,
    prediction: Option<Prediction>,
    overlay: bool,
    pub saliency_calls: Arc<AtomicUsize>,
}

impl MockModelService {
    fn with_prediction(prediction: Option<Prediction>) -> Self {
        Self {
            ready: true,
            prediction,
            overlay: true,
            saliency_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn normal() -> Self {
        Self::with_prediction(Some(Prediction {
            label: Label::Normal,
            confidence: 87.5,
        }))
    }

    pub fn pneumonia() -> Self {
        Self::with_prediction(Some(Prediction {
            label: Label::Pneumonia,
            confidence: 93.25,
        }))
    }

    /// Every prediction fails as if the upload were corrupt.
    pub fn failing() -> Self {
        Self::with_prediction(None)
    }

    pub fn unavailable() -> Self {
        Self {
            ready: false,
            overlay: false,
            ..Self::normal()
        }
    }

    pub fn without_saliency(mut self) -> Self {
        self.overlay = false;
        self
    }
}

impl ModelService for MockModelService {
    fn status(&self) -> ModelStatus {
        ModelStatus {
            ready: self.ready,
            device: Device::Cpu,
            weights: None,
            saliency: self.overlay,
        }
    }

    fn predict(&self, _image_data: &[u8]) -> Result<Prediction, InferenceError> {
        if !self.ready {
            return Ok(Prediction::unavailable());
        }
        self.prediction
            .ok_or_else(|| InferenceError::Decode("corrupt upload".to_string()))
    }

    fn saliency_overlay(&self, _image_data: &[u8]) -> Option<RgbImage> {
        self.saliency_calls.fetch_add(1, Ordering::SeqCst);
        self.overlay.then(|| RgbImage::new(224, 224))
    }
}
