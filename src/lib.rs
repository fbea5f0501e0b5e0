pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::PipelineConfig;
pub use error::AppError;
pub use models::classify_types::{ClassificationResult, ImageInput, ModelStatus, Prediction};
pub use services::classifier::backend::InferenceBackend;
pub use services::classifier::labels::LabelSet;
pub use services::classifier::model_manager::ModelManager;
pub use services::history::SessionHistory;

use tracing_subscriber::EnvFilter;

/// Installs the stderr log subscriber. `RUST_LOG` overrides `default_level`.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
