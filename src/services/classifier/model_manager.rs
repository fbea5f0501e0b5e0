use crate::config::PipelineConfig;
use crate::error::AppError;
use crate::models::classify_types::{ClassificationResult, ImageInput, ModelStatus};
use crate::services::classifier::backend::{InferenceBackend, OnnxModel};
use crate::services::classifier::inference;
use crate::services::classifier::labels::LabelSet;
use futures::StreamExt;
use ndarray::Array4;
use rayon::prelude::*;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

pub type BoxedBackend = Box<dyn InferenceBackend>;

/// Owns the loaded model and its lifecycle. Clones share the same state, so a
/// single manager is created at startup and handed to every caller.
#[derive(Clone)]
pub struct ModelManager {
    config: Arc<PipelineConfig>,
    labels: LabelSet,
    model: Arc<std::sync::Mutex<Option<BoxedBackend>>>,
    // Mirrors `model.is_some()` so status checks never wait on a forward pass.
    ready: Arc<AtomicBool>,
    loading: Arc<Mutex<bool>>,
    error: Arc<Mutex<Option<AppError>>>,
}

impl ModelManager {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_labels(config, LabelSet::food_101())
    }

    pub fn with_labels(config: PipelineConfig, labels: LabelSet) -> Self {
        Self {
            config: Arc::new(config),
            labels,
            model: Arc::new(std::sync::Mutex::new(None)),
            ready: Arc::new(AtomicBool::new(false)),
            loading: Arc::new(Mutex::new(false)),
            error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    fn model_guard(&self) -> MutexGuard<'_, Option<BoxedBackend>> {
        // A panic inside a forward pass leaves the backend itself intact.
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub async fn is_loading(&self) -> bool {
        *self.loading.lock().await
    }

    pub async fn get_error(&self) -> Option<String> {
        self.error.lock().await.as_ref().map(|e| e.to_string())
    }

    pub async fn status(&self) -> ModelStatus {
        ModelStatus {
            loading: self.is_loading().await,
            ready: self.is_ready(),
            error: self.get_error().await,
        }
    }

    /// Fetches the artifact if needed and loads it into ONNX Runtime.
    pub async fn load_model(&self) -> Result<(), AppError> {
        let config = self.config.clone();
        self.run_load(async move {
            ensure_downloaded(&config, &reqwest::Client::new()).await?;
            tokio::task::spawn_blocking(move || -> Result<BoxedBackend, AppError> {
                let model: BoxedBackend = Box::new(OnnxModel::load(&config)?);
                Ok(model)
            })
            .await
            .map_err(|e| AppError::ModelLoad(format!("Failed to spawn model loading task: {}", e)))?
        })
        .await
    }

    /// Same lifecycle as [`load_model`](Self::load_model), with the backend
    /// produced by `loader` on a blocking thread.
    pub async fn load_with<F>(&self, loader: F) -> Result<(), AppError>
    where
        F: FnOnce() -> Result<BoxedBackend, AppError> + Send + 'static,
    {
        self.run_load(async move {
            tokio::task::spawn_blocking(loader)
                .await
                .map_err(|e| AppError::ModelLoad(format!("Failed to spawn model loading task: {}", e)))?
        })
        .await
    }

    async fn run_load<Fut>(&self, load: Fut) -> Result<(), AppError>
    where
        Fut: Future<Output = Result<BoxedBackend, AppError>>,
    {
        {
            // Checked under the loading lock: a load that finished while we
            // waited has already stored its model or its error.
            let mut loading = self.loading.lock().await;
            if self.is_ready() {
                return Ok(());
            }

            // A failed load is final for the session.
            if let Some(err) = self.error.lock().await.clone() {
                return Err(err);
            }

            if *loading {
                return Err(AppError::ModelLoad("Model is already loading".into()));
            }
            *loading = true;
        }

        info!(path = %self.config.model_path.display(), "Loading model");
        let started = Instant::now();

        let result = load.await.and_then(|backend| self.check_output_width(backend));

        let outcome = match result {
            Ok(backend) => {
                *self.model_guard() = Some(backend);
                self.ready.store(true, Ordering::SeqCst);
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "Model ready");
                Ok(())
            }
            Err(e) => {
                let err = match e {
                    AppError::ModelLoad(_) | AppError::LabelMismatch { .. } => e,
                    other => AppError::ModelLoad(other.to_string()),
                };
                error!("{}", err);
                *self.error.lock().await = Some(err.clone());
                Err(err)
            }
        };

        *self.loading.lock().await = false;
        outcome
    }

    fn check_output_width(&self, backend: BoxedBackend) -> Result<BoxedBackend, AppError> {
        match backend.output_width() {
            Some(width) if width != self.labels.len() => Err(AppError::LabelMismatch {
                expected: self.labels.len(),
                actual: width,
            }),
            _ => Ok(backend),
        }
    }

    /// Classifies one image. The caller decides what to do with the result;
    /// nothing is recorded here.
    pub async fn classify(&self, image: ImageInput) -> Result<ClassificationResult, AppError> {
        if !self.is_ready() {
            return Err(AppError::ModelNotLoaded);
        }

        let manager = self.clone();
        tokio::task::spawn_blocking(move || -> Result<ClassificationResult, AppError> {
            let started = Instant::now();
            let tensor = inference::preprocess_input(&image)?;

            let mut guard = manager.model_guard();
            let result = manager.classify_locked(&mut guard, image.source.clone(), Ok(tensor))?;

            debug!(
                source = %image.source,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Classified image"
            );

            Ok(result)
        })
        .await
        .map_err(|e| AppError::Inference(format!("Task join failed: {}", e)))?
    }

    /// Classifies several images, decoding and resizing them in parallel and
    /// running the forward passes one at a time. Results keep input order.
    pub async fn classify_batch(
        &self,
        images: Vec<ImageInput>,
    ) -> Result<Vec<Result<ClassificationResult, AppError>>, AppError> {
        if !self.is_ready() {
            return Err(AppError::ModelNotLoaded);
        }

        let manager = self.clone();
        tokio::task::spawn_blocking(move || manager.classify_batch_blocking(images))
            .await
            .map_err(|e| AppError::Inference(format!("Task join failed: {}", e)))?
    }

    fn classify_batch_blocking(
        &self,
        images: Vec<ImageInput>,
    ) -> Result<Vec<Result<ClassificationResult, AppError>>, AppError> {
        let tensors: Vec<_> = images
            .par_iter()
            .map(inference::preprocess_input)
            .collect();

        let mut guard = self.model_guard();
        if guard.is_none() {
            return Err(AppError::ModelNotLoaded);
        }

        let results: Vec<Result<ClassificationResult, AppError>> = images
            .into_iter()
            .zip(tensors)
            .map(|(image, tensor)| self.classify_locked(&mut guard, image.source, tensor))
            .collect();

        Ok(results)
    }

    /// Runs one preprocessed image through the model held in `slot`. A score
    /// vector that does not fit the label set unloads the model for the rest
    /// of the session.
    fn classify_locked(
        &self,
        slot: &mut Option<BoxedBackend>,
        source: String,
        tensor: Result<Array4<f32>, AppError>,
    ) -> Result<ClassificationResult, AppError> {
        let tensor = tensor?;
        let backend = slot.as_mut().ok_or(AppError::ModelNotLoaded)?;

        match inference::run_inference(
            backend.as_mut(),
            tensor,
            &self.labels,
            self.config.output_is_logits,
        ) {
            Ok(predictions) => Ok(ClassificationResult {
                source,
                predictions,
            }),
            Err(err @ AppError::LabelMismatch { .. }) => {
                error!("{}; unloading model", err);
                *slot = None;
                self.ready.store(false, Ordering::SeqCst);
                // Only reached from blocking worker threads.
                *self.error.blocking_lock() = Some(err.clone());
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}

async fn ensure_downloaded(
    config: &PipelineConfig,
    client: &reqwest::Client,
) -> Result<(), AppError> {
    if config.model_path.exists() {
        return Ok(());
    }

    let Some(url) = config.model_url.as_deref() else {
        return Err(AppError::ModelLoad(format!(
            "Model file not found: {}",
            config.model_path.display()
        )));
    };

    if let Some(parent) = config.model_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::ModelLoad(format!("Failed to create model directory: {}", e))
            })?;
        }
    }

    download_file(client, url, &config.model_path).await
}

async fn download_file(client: &reqwest::Client, url: &str, dest: &Path) -> Result<(), AppError> {
    info!(url, dest = %dest.display(), "Downloading model");

    // Written beside the destination so an interrupted download never looks complete.
    let partial = dest.with_extension("part");

    let result = async {
        let downloaded = fetch_to(client, url, &partial).await?;
        tokio::fs::rename(&partial, dest).await.map_err(|e| {
            AppError::ModelLoad(format!("Failed to finalize {}: {}", dest.display(), e))
        })?;
        Ok(downloaded)
    }
    .await;

    match result {
        Ok(downloaded) => {
            info!(bytes = downloaded, "Model downloaded");
            Ok(())
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(e)
        }
    }
}

async fn fetch_to(client: &reqwest::Client, url: &str, path: &Path) -> Result<u64, AppError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(AppError::ModelLoad(format!(
            "Failed to download {}: HTTP {}",
            url,
            response.status()
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let mut file = tokio::fs::File::create(path).await.map_err(|e| {
        AppError::ModelLoad(format!("Failed to create file {}: {}", path.display(), e))
    })?;

    let mut stream = response.bytes_stream();
    let mut last_logged = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        downloaded += chunk.len() as u64;
        tokio::io::AsyncWriteExt::write_all(&mut file, &chunk)
            .await
            .map_err(|e| AppError::ModelLoad(format!("Failed to write to file: {}", e)))?;

        if total_size > 0 {
            let progress = (downloaded * 100) / total_size;
            if progress >= last_logged + 10 {
                debug!(progress, "Model download progress");
                last_logged = progress;
            }
        }
    }

    tokio::io::AsyncWriteExt::flush(&mut file)
        .await
        .map_err(|e| AppError::ModelLoad(format!("Failed to write to file: {}", e)))?;

    Ok(downloaded)
}
