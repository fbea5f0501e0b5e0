use crate::error::AppError;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ModelStatus {
    pub loading: bool,
    pub ready: bool,
    pub error: Option<String>,
}

/// Encoded image bytes plus the reference shown next to its results.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub source: String,
    pub bytes: Vec<u8>,
}

impl ImageInput {
    pub fn from_bytes(source: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            source: source.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let bytes = std::fs::read(path)
            .map_err(|e| AppError::Io(format!("Failed to read image {}: {}", path.display(), e)))?;
        Ok(Self {
            source: path.to_string_lossy().to_string(),
            bytes,
        })
    }
}

/// One ranked result set for a single image, best prediction first.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ClassificationResult {
    pub source: String,
    pub predictions: Vec<Prediction>,
}

impl ClassificationResult {
    pub fn top(&self) -> Option<&Prediction> {
        self.predictions.first()
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub class_name: String,
    pub confidence: f32,
}

#[derive(Debug, Serialize, Clone)]
pub struct ClassifyFailure {
    pub source: String,
    pub error: AppError,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct ClassifyOutcome {
    pub results: Vec<ClassificationResult>,
    pub failures: Vec<ClassifyFailure>,
}
