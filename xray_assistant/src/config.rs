use pneumonia_inference::config::{ModelConfig, SaliencyConfig};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub model: ModelConfig,
    #[serde(default)]
    pub saliency: SaliencyConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_max_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no working directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    config.try_deserialize::<Config>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};
    use pneumonia_inference::{config::DevicePreference, preprocess::Preprocessing};

    const BASE: &str = r#"
server:
  host: 127.0.0.1
  port: 8501
log_level: Debug
model:
  model_dir: models
  backbone_file: resnet50_features.onnx
"#;

    fn parse(sources: &[&str]) -> Result<Config, config::ConfigError> {
        sources
            .iter()
            .fold(config::Config::builder(), |builder, source| {
                builder.add_source(File::from_str(source, FileFormat::Yaml))
            })
            .build()?
            .try_deserialize::<Config>()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[BASE]).unwrap();

        assert_eq!(config.server.get_address(), "127.0.0.1:8501");
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.model.head_file, "pneumonia_head.json");
        assert_eq!(config.model.feature_channels, 2048);
        assert_eq!(config.model.device, DevicePreference::Auto);
        assert!(config.saliency.enabled);
        assert_eq!(config.saliency.preprocessing, Preprocessing::ResizeExact);
        assert_eq!(config.upload.max_bytes, 10 * 1024 * 1024);
        assert!(config.model.get_head_path().ends_with("models/pneumonia_head.json"));
    }

    #[test]
    fn test_overrides() {
        let overrides = r#"
model:
  device: cpu
  seed: 7
saliency:
  enabled: false
  preprocessing: resize_center_crop
"#;
        let config = parse(&[BASE, overrides]).unwrap();

        assert_eq!(config.model.device, DevicePreference::Cpu);
        assert_eq!(config.model.seed, Some(7));
        assert_eq!(config.model.backbone_file, "resnet50_features.onnx");
        assert!(!config.saliency.enabled);
        assert_eq!(config.saliency.preprocessing, Preprocessing::ResizeCenterCrop);
    }

    #[test]
    fn test_invalid_log_level() {
        let config = BASE.replace("log_level: Debug", "log_level: trace");
        assert!(parse(&[&config]).is_err());
    }

    #[test]
    fn test_environment() {
        assert!(matches!(
            Environment::try_from("Production".to_string()),
            Ok(Environment::Production)
        ));
        assert!(Environment::try_from("staging".to_string()).is_err());
    }
}
