use crate::error::AppError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL_PATH: &str = "model/model.onnx";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Location of the ONNX model artifact.
    pub model_path: PathBuf,
    /// Fetched into `model_path` before loading when the file is missing.
    pub model_url: Option<String>,
    /// Try GPU execution providers before falling back to CPU.
    pub use_gpu: bool,
    pub intra_threads: usize,
    /// Set for exports whose final layer emits logits instead of softmax probabilities.
    pub output_is_logits: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            model_url: None,
            use_gpu: true,
            intra_threads: 4,
            output_is_logits: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(content: &str) -> Result<Self, AppError> {
        let config: PipelineConfig = serde_json::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.intra_threads == 0 {
            return Err(AppError::Config("intra_threads must be at least 1".into()));
        }
        if self.model_path.as_os_str().is_empty() {
            return Err(AppError::Config("model_path must not be empty".into()));
        }
        Ok(())
    }
}
