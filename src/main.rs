//! Food photo classifier CLI.
//!
//! Usage:
//!   food-lens dinner.jpg
//!   food-lens photos/ --model model/model.onnx --cpu --format json
//!   food-lens lunch.png --config food-lens.json

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use food_lens_lib::commands::classifier::{classify_images, get_model_status, load_model};
use food_lens_lib::commands::report::{print_results, OutputFormat};
use food_lens_lib::{init_logging, ModelManager, PipelineConfig, SessionHistory};

#[derive(Parser)]
#[command(name = "food-lens")]
#[command(about = "Identify the food in a photo with an InceptionV3 Food-101 model")]
struct Cli {
    /// Images or directories of images to classify
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// JSON pipeline config; flags below override it
    #[arg(short, long, env = "FOOD_LENS_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the ONNX model file
    #[arg(short, long, env = "FOOD_LENS_MODEL")]
    model: Option<PathBuf>,

    /// Download the model from this URL when the file is missing
    #[arg(long)]
    model_url: Option<String>,

    /// Run on the CPU execution provider only
    #[arg(long)]
    cpu: bool,

    /// Model emits raw logits rather than probabilities
    #[arg(long)]
    logits: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(model) = cli.model {
        config.model_path = model;
    }
    if cli.model_url.is_some() {
        config.model_url = cli.model_url;
    }
    if cli.cpu {
        config.use_gpu = false;
    }
    if cli.logits {
        config.output_is_logits = true;
    }
    config.validate()?;

    let model_manager = ModelManager::new(config);
    load_model(&model_manager)
        .await
        .context("model is unavailable for this session")?;
    let status = get_model_status(&model_manager).await;
    tracing::debug!(?status, "Model status");

    let mut history = SessionHistory::new();
    let outcome = classify_images(&model_manager, &mut history, &cli.images).await?;

    if history.is_empty() && outcome.failures.is_empty() {
        eprintln!("No images to classify.");
        return Ok(());
    }

    print_results(&history, &outcome.failures, cli.format);

    if history.is_empty() {
        anyhow::bail!("none of the {} images could be classified", outcome.failures.len());
    }

    Ok(())
}
