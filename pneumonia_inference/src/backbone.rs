use crate::{
    config::{DevicePreference, ModelConfig},
    error::InferenceError,
};
use ndarray::{Array, Ix4};
use ort::{
    execution_providers::{CUDAExecutionProvider, ExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use serde::Serialize;
use std::sync::Mutex;

/// Pretrained convolutional network cut after its last convolutional block.
pub trait Backbone: Send + Sync + 'static {
    fn feature_channels(&self) -> usize;

    /// Maps a `[1, 3, 224, 224]` normalised input to the `[1, C, H, W]`
    /// activations of the last convolutional block.
    fn extract_features(&self, input: &Array<f32, Ix4>)
        -> Result<Array<f32, Ix4>, InferenceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cuda,
    Cpu,
}

impl Device {
    pub fn select(preference: DevicePreference) -> Self {
        match preference {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Auto | DevicePreference::Cuda => {
                let available = CUDAExecutionProvider::default()
                    .is_available()
                    .unwrap_or(false);
                if available {
                    Device::Cuda
                } else {
                    if preference == DevicePreference::Cuda {
                        tracing::warn!("CUDA requested but not available, falling back to CPU");
                    }
                    Device::Cpu
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        }
    }
}

fn session_error(e: impl std::fmt::Display) -> InferenceError {
    InferenceError::Session(e.to_string())
}

/// Picks the configured output, or the first one when none is configured.
fn resolve_output_name(
    configured: Option<&str>,
    available: &[&str],
) -> Result<String, InferenceError> {
    match configured {
        Some(name) if available.contains(&name) => Ok(name.to_string()),
        Some(name) => Err(InferenceError::Session(format!(
            "model has no output named {:?}, available outputs: {:?}",
            name, available
        ))),
        None => available
            .first()
            .map(|name| name.to_string())
            .ok_or_else(|| InferenceError::Session("model has no outputs".to_string())),
    }
}

pub struct OrtBackbone {
    session: Mutex<Session>,
    output_name: String,
    feature_channels: usize,
}

impl OrtBackbone {
    pub fn new(model_config: &ModelConfig, device: Device) -> Result<Self, InferenceError> {
        let path = model_config.get_backbone_path();
        if !path.exists() {
            return Err(InferenceError::ModelNotFound(path));
        }

        let mut builder = Session::builder()
            .map_err(session_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(session_error)?;

        if let Some(threads) = model_config.intra_threads {
            builder = builder.with_intra_threads(threads).map_err(session_error)?;
        }

        if device == Device::Cuda {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(session_error)?;
        }

        let session = builder.commit_from_file(&path).map_err(session_error)?;

        let available: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
        let output_name = resolve_output_name(model_config.feature_output.as_deref(), &available)?;

        tracing::info!(
            path = %path.display(),
            output = %output_name,
            device = device.as_str(),
            "Created backbone session"
        );

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            feature_channels: model_config.feature_channels,
        })
    }
}

impl Backbone for OrtBackbone {
    fn feature_channels(&self) -> usize {
        self.feature_channels
    }

    fn extract_features(
        &self,
        input: &Array<f32, Ix4>,
    ) -> Result<Array<f32, Ix4>, InferenceError> {
        let mut session = self
            .session
            .lock()
            .map_err(|e| InferenceError::Inference(format!("session mutex poisoned: {}", e)))?;

        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| InferenceError::Inference(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| InferenceError::Inference(e.to_string()))?;

        let (shape, data) = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| {
                InferenceError::Inference(format!("no output named {:?}", self.output_name))
            })?
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Inference(format!("failed to extract tensor: {}", e)))?;

        let features = ndarray::ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())
            .map_err(|e| InferenceError::Inference(format!("invalid tensor shape: {}", e)))?;
        let actual = features.shape().to_vec();

        features
            .into_dimensionality::<Ix4>()
            .map_err(|_| InferenceError::FeatureShape {
                actual,
                expected: self.feature_channels,
            })
    }
}
