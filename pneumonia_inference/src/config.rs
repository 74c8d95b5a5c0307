use crate::preprocess::Preprocessing;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    pub backbone_file: String,
    /// Name of the graph output holding the last convolutional block's
    /// activations. The first output is used when unset.
    #[serde(default)]
    pub feature_output: Option<String>,
    #[serde(default = "default_feature_channels")]
    pub feature_channels: usize,
    #[serde(default = "default_head_file")]
    pub head_file: String,
    #[serde(default)]
    pub device: DevicePreference,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub intra_threads: Option<usize>,
}

fn default_feature_channels() -> usize {
    2048
}

fn default_head_file() -> String {
    "pneumonia_head.json".to_string()
}

impl ModelConfig {
    pub fn get_backbone_path(&self) -> PathBuf {
        self.model_dir.join(&self.backbone_file)
    }

    pub fn get_head_path(&self) -> PathBuf {
        self.model_dir.join(&self.head_file)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.get_backbone_path().exists() {
            return Err(format!(
                "Model file not found: {:?}",
                self.get_backbone_path()
            ));
        }
        if self.feature_channels == 0 {
            return Err("feature_channels must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Cuda,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SaliencyConfig {
    #[serde(default = "default_saliency_enabled")]
    pub enabled: bool,
    #[serde(default = "default_saliency_preprocessing")]
    pub preprocessing: Preprocessing,
    /// Share of the original pixels in the composited overlay.
    #[serde(default = "default_image_weight")]
    pub image_weight: f32,
}

fn default_saliency_enabled() -> bool {
    true
}

fn default_saliency_preprocessing() -> Preprocessing {
    Preprocessing::ResizeExact
}

fn default_image_weight() -> f32 {
    0.5
}

impl Default for SaliencyConfig {
    fn default() -> Self {
        Self {
            enabled: default_saliency_enabled(),
            preprocessing: default_saliency_preprocessing(),
            image_weight: default_image_weight(),
        }
    }
}
