use crate::config::PipelineConfig;
use crate::error::AppError;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use tracing::debug;

use super::inference::INPUT_SIZE;

/// A loaded classification network: NHWC `(1, H, W, 3)` in, one score per class out.
pub trait InferenceBackend: Send {
    /// Width of the score vector, when known without running a request.
    fn output_width(&self) -> Option<usize> {
        None
    }

    fn forward(&mut self, input: Array4<f32>) -> Result<Vec<f32>, AppError>;
}

pub struct OnnxModel {
    session: Session,
    input_name: String,
    output_width: usize,
}

impl OnnxModel {
    /// Builds an ONNX Runtime session for `config.model_path` and runs one
    /// warm-up pass to learn the output width. Blocking.
    pub fn load(config: &PipelineConfig) -> Result<Self, AppError> {
        let _ = ort::init().with_name("food-lens").commit();

        let mut builder = Session::builder()
            .map_err(|e| AppError::ModelLoad(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| AppError::ModelLoad(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(config.intra_threads)
            .map_err(|e| AppError::ModelLoad(format!("Failed to set intra threads: {}", e)))?;

        if config.use_gpu {
            builder = builder
                .with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default().build(),
                    ort::execution_providers::CoreMLExecutionProvider::default().build(),
                    ort::execution_providers::CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| {
                    AppError::ModelLoad(format!("Failed to register GPU execution providers: {}", e))
                })?;
        } else {
            builder = builder
                .with_execution_providers([
                    ort::execution_providers::CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| {
                    AppError::ModelLoad(format!("Failed to register CPU execution provider: {}", e))
                })?;
        }

        let session = builder.commit_from_file(&config.model_path).map_err(|e| {
            AppError::ModelLoad(format!(
                "Failed to load ONNX model {}: {}",
                config.model_path.display(),
                e
            ))
        })?;

        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .ok_or_else(|| AppError::ModelLoad("Model declares no inputs".to_string()))?;

        let mut model = Self {
            session,
            input_name,
            output_width: 0,
        };

        let size = INPUT_SIZE as usize;
        let warm_up = model
            .forward(Array4::zeros((1, size, size, 3)))
            .map_err(|e| AppError::ModelLoad(format!("Warm-up pass failed: {}", e)))?;
        model.output_width = warm_up.len();
        debug!(
            input = %model.input_name,
            output_width = model.output_width,
            "ONNX session ready"
        );

        Ok(model)
    }
}

impl InferenceBackend for OnnxModel {
    fn output_width(&self) -> Option<usize> {
        Some(self.output_width)
    }

    fn forward(&mut self, input: Array4<f32>) -> Result<Vec<f32>, AppError> {
        let input_tensor = Value::from_array(input)
            .map_err(|e| AppError::Inference(format!("Failed to create tensor value: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| AppError::Inference(e.to_string()))?;

        let output_value = outputs
            .values()
            .next()
            .ok_or_else(|| AppError::Inference("Model produced no outputs".to_string()))?;

        let (_, data) = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::Inference(format!("Failed to extract output tensor: {}", e)))?;

        Ok(data.to_vec())
    }
}
