use crate::{
    backbone::{Backbone, Device, OrtBackbone},
    config::{ModelConfig, SaliencyConfig},
    error::InferenceError,
    head::ClassifierHead,
    model_service::ModelService,
    prediction::{argmax, Label, Prediction, CLASS_LABELS},
    preprocess::{decode_rgb, to_input_tensor, Preprocessing},
};
use image::RgbImage;
use ndarray::{Array1, Array3, Axis};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use std::{path::PathBuf, time::Instant};
use tracing::instrument;

/// Where the classification layer's parameters came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum WeightStatus {
    FineTuned { path: PathBuf },
    Pretrained { reason: FallbackReason },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    Missing,
    Invalid(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub ready: bool,
    pub device: Device,
    pub weights: Option<WeightStatus>,
    pub saliency: bool,
}

struct LoadedModel<B: Backbone> {
    backbone: B,
    head: ClassifierHead,
    weights: WeightStatus,
}

/// Process-wide classifier. Immutable once built; a handle whose backbone
/// failed to load stays usable and answers with the unavailable sentinel.
pub struct ClassifierHandle<B: Backbone = OrtBackbone> {
    model: Option<LoadedModel<B>>,
    device: Device,
    saliency_available: bool,
    saliency_preprocessing: Preprocessing,
    image_weight: f32,
}

impl ClassifierHandle<OrtBackbone> {
    pub fn load(model_config: &ModelConfig, saliency_config: &SaliencyConfig) -> Self {
        let device = Device::select(model_config.device);
        match OrtBackbone::new(model_config, device) {
            Ok(backbone) => Self::with_backbone(backbone, device, model_config, saliency_config),
            Err(e) => {
                tracing::error!("Critical error while loading the model: {}", e);
                Self::unavailable(device, saliency_config)
            }
        }
    }
}

impl<B: Backbone> ClassifierHandle<B> {
    pub fn with_backbone(
        backbone: B,
        device: Device,
        model_config: &ModelConfig,
        saliency_config: &SaliencyConfig,
    ) -> Self {
        let mut rng = match model_config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let (head, weights) = load_head(model_config, backbone.feature_channels(), &mut rng);

        let mut handle = Self::unavailable(device, saliency_config);
        handle.model = Some(LoadedModel {
            backbone,
            head,
            weights,
        });

        tracing::info!(
            device = device.as_str(),
            saliency = handle.saliency_available,
            "Model ready"
        );
        handle
    }

    pub fn unavailable(device: Device, saliency_config: &SaliencyConfig) -> Self {
        let saliency_available = cfg!(feature = "saliency") && saliency_config.enabled;
        if saliency_config.enabled && !saliency_available {
            tracing::warn!("Saliency maps requested but support is not compiled in");
        }

        Self {
            model: None,
            device,
            saliency_available,
            saliency_preprocessing: saliency_config.preprocessing,
            image_weight: saliency_config.image_weight.clamp(0.0, 1.0),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn labels(&self) -> &'static [Label] {
        &CLASS_LABELS
    }

    pub fn weight_status(&self) -> Option<&WeightStatus> {
        self.model.as_ref().map(|model| &model.weights)
    }

    pub fn uses_fine_tuned_weights(&self) -> bool {
        matches!(self.weight_status(), Some(WeightStatus::FineTuned { .. }))
    }

    pub fn saliency_available(&self) -> bool {
        self.saliency_available
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            ready: self.is_ready(),
            device: self.device,
            weights: self.weight_status().cloned(),
            saliency: self.saliency_available,
        }
    }

    #[instrument(skip(self, image_data), fields(bytes = image_data.len()))]
    pub fn predict(&self, image_data: &[u8]) -> Result<Prediction, InferenceError> {
        let Some(model) = &self.model else {
            return Ok(Prediction::unavailable());
        };

        let started = Instant::now();
        let img = Preprocessing::ResizeCenterCrop.apply(&decode_rgb(image_data)?)?;
        let features = model.features(&img)?;
        let logits = model.logits(&features)?;
        let prediction = Prediction::from_logits(logits.view());

        tracing::debug!(
            label = prediction.label.as_str(),
            confidence = prediction.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Prediction done"
        );
        Ok(prediction)
    }

    /// Grad-CAM overlay for the class the model picks on this image, or
    /// `None` when saliency maps cannot be produced.
    pub fn build_saliency_overlay(&self, image_data: &[u8]) -> Option<RgbImage> {
        match self.try_saliency_overlay(image_data) {
            Ok(overlay) => Some(overlay),
            Err(InferenceError::SaliencyUnavailable | InferenceError::ModelUnavailable) => None,
            Err(e) => {
                tracing::warn!("Failed to build saliency overlay: {}", e);
                None
            }
        }
    }

    #[instrument(skip(self, image_data), fields(bytes = image_data.len()))]
    fn try_saliency_overlay(&self, image_data: &[u8]) -> Result<RgbImage, InferenceError> {
        if !self.saliency_available {
            return Err(InferenceError::SaliencyUnavailable);
        }
        let model = self.model.as_ref().ok_or(InferenceError::ModelUnavailable)?;

        let img = self.saliency_preprocessing.apply(&decode_rgb(image_data)?)?;
        let features = model.features(&img)?;
        let logits = model.logits(&features)?;
        let (target, _) = argmax(logits.view());

        let (_, height, width) = features.dim();
        let gradients = model.head.logit_gradient(target, height, width);
        tracing::debug!(target, height, width, "Computing class activation map");

        render_overlay(&img, &features, &gradients, self.image_weight)
    }
}

impl<B: Backbone> LoadedModel<B> {
    /// `[C, H, W]` activations for one prepared 224x224 image.
    fn features(&self, img: &RgbImage) -> Result<Array3<f32>, InferenceError> {
        let input = to_input_tensor(img);
        let features = self.backbone.extract_features(&input)?;

        let shape = features.shape().to_vec();
        if shape[0] != 1 || shape[1] != self.head.in_features() {
            return Err(InferenceError::FeatureShape {
                actual: shape,
                expected: self.head.in_features(),
            });
        }
        Ok(features.index_axis_move(Axis(0), 0))
    }

    fn logits(&self, features: &Array3<f32>) -> Result<Array1<f32>, InferenceError> {
        let logits = self.head.forward(features.view());
        if logits.iter().any(|v| !v.is_finite()) {
            return Err(InferenceError::Inference(format!(
                "non-finite logits {}",
                logits
            )));
        }
        Ok(logits)
    }
}

#[cfg(feature = "saliency")]
fn render_overlay(
    img: &RgbImage,
    features: &Array3<f32>,
    gradients: &Array3<f32>,
    image_weight: f32,
) -> Result<RgbImage, InferenceError> {
    use crate::saliency;

    let cam = saliency::grad_cam(features.view(), gradients.view());
    let (width, height) = img.dimensions();
    let mask = saliency::scale_cam(&cam, width, height);
    Ok(saliency::overlay(img, &mask, image_weight))
}

#[cfg(not(feature = "saliency"))]
fn render_overlay(
    _img: &RgbImage,
    _features: &Array3<f32>,
    _gradients: &Array3<f32>,
    _image_weight: f32,
) -> Result<RgbImage, InferenceError> {
    Err(InferenceError::SaliencyUnavailable)
}

fn load_head(
    model_config: &ModelConfig,
    in_features: usize,
    rng: &mut StdRng,
) -> (ClassifierHead, WeightStatus) {
    let path = model_config.get_head_path();
    if !path.exists() {
        tracing::info!(
            path = %path.display(),
            "No fine-tuned weights found, using pretrained backbone with a fresh classifier"
        );
        let reason = FallbackReason::Missing;
        return (
            ClassifierHead::initialize(in_features, rng),
            WeightStatus::Pretrained { reason },
        );
    }

    match ClassifierHead::from_file(&path, in_features) {
        Ok(head) => {
            tracing::info!(path = %path.display(), "Loaded fine-tuned weights");
            (head, WeightStatus::FineTuned { path })
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                "Weight file found but could not be loaded: {}. Using pretrained weights.",
                e
            );
            let reason = FallbackReason::Invalid(e.to_string());
            (
                ClassifierHead::initialize(in_features, rng),
                WeightStatus::Pretrained { reason },
            )
        }
    }
}

impl<B: Backbone> ModelService for ClassifierHandle<B> {
    fn status(&self) -> ModelStatus {
        ClassifierHandle::status(self)
    }

    fn predict(&self, image_data: &[u8]) -> Result<Prediction, InferenceError> {
        ClassifierHandle::predict(self, image_data)
    }

    fn saliency_overlay(&self, image_data: &[u8]) -> Option<RgbImage> {
        self.build_saliency_overlay(image_data)
    }
}
