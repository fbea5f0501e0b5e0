use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Serialize, Clone, PartialEq)]
#[serde(tag = "kind", content = "message")]
pub enum AppError {
    #[error("Model not loaded. Call load_model first.")]
    ModelNotLoaded,

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Model produces {actual} classes but the label set has {expected}")]
    LabelMismatch { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Io(String),
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ModelLoad(err.to_string())
    }
}
