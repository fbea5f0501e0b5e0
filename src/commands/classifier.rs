use crate::error::AppError;
use crate::models::classify_types::{ClassifyFailure, ClassifyOutcome, ImageInput, ModelStatus};
use crate::services::classifier::model_manager::ModelManager;
use crate::services::fs_service;
use crate::services::history::SessionHistory;
use std::path::PathBuf;
use tracing::{info, warn};

pub async fn get_model_status(model_manager: &ModelManager) -> ModelStatus {
    model_manager.status().await
}

pub async fn load_model(model_manager: &ModelManager) -> Result<(), AppError> {
    model_manager.load_model().await
}

/// Classifies every image named by `paths` (directories are expanded) and
/// records each successful result set in `history`. Per-image failures are
/// collected rather than aborting the run.
pub async fn classify_images(
    model_manager: &ModelManager,
    history: &mut SessionHistory,
    paths: &[PathBuf],
) -> Result<ClassifyOutcome, AppError> {
    if !model_manager.is_ready() {
        return Err(AppError::ModelNotLoaded);
    }

    let image_paths = fs_service::expand_inputs(paths)?;
    let total = image_paths.len();
    let mut outcome = ClassifyOutcome::default();

    if total == 0 {
        return Ok(outcome);
    }

    let mut inputs = Vec::with_capacity(total);
    for path in &image_paths {
        match ImageInput::from_path(path) {
            Ok(input) => inputs.push(input),
            Err(error) => {
                warn!("{}", error);
                outcome.failures.push(ClassifyFailure {
                    source: path.to_string_lossy().to_string(),
                    error,
                });
            }
        }
    }

    let sources: Vec<String> = inputs.iter().map(|i| i.source.clone()).collect();
    let results = model_manager.classify_batch(inputs).await?;

    for (source, result) in sources.into_iter().zip(results) {
        match result {
            Ok(result) => {
                history.push(result.clone());
                outcome.results.push(result);
            }
            Err(error) => {
                warn!(%source, "Failed to classify: {}", error);
                outcome.failures.push(ClassifyFailure { source, error });
            }
        }
    }

    info!(
        total,
        classified = outcome.results.len(),
        failed = outcome.failures.len(),
        "Classification finished"
    );

    Ok(outcome)
}
