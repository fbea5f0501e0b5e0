//! Text and JSON rendering of classification results.

use crate::models::classify_types::{ClassificationResult, ClassifyFailure};
use crate::services::classifier::labels::display_name;
use crate::services::history::SessionHistory;
use serde::Serialize;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {s}. Use 'text' or 'json'.")),
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    results: Vec<&'a ClassificationResult>,
    failures: &'a [ClassifyFailure],
}

/// Confidence as a percentage with one decimal, e.g. 0.87654 -> "87.7%".
pub fn format_confidence(confidence: f32) -> String {
    let pct = (confidence as f64 * 1000.0).round() / 10.0;
    format!("{:.1}%", pct)
}

pub fn render(history: &SessionHistory, failures: &[ClassifyFailure], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => render_text(history, failures),
        OutputFormat::Json => render_json(history, failures),
    }
}

pub fn print_results(history: &SessionHistory, failures: &[ClassifyFailure], format: OutputFormat) {
    print!("{}", render(history, failures, format));
}

fn render_text(history: &SessionHistory, failures: &[ClassifyFailure]) -> String {
    let mut out = String::new();

    for result in history.iter() {
        let _ = writeln!(out, "\n{}", "=".repeat(60));
        let _ = writeln!(out, "{}", result.source);
        let _ = writeln!(out, "{}", "-".repeat(60));
        let _ = writeln!(out, "{:<3} {:<40} {:>10}", "#", "Food Name", "Confidence");
        for (rank, prediction) in result.predictions.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:<3} {:<40} {:>10}",
                rank + 1,
                display_name(&prediction.class_name),
                format_confidence(prediction.confidence)
            );
        }
    }

    if !failures.is_empty() {
        let _ = writeln!(out, "\nERRORS ({}):", failures.len());
        for failure in failures {
            let _ = writeln!(out, "  {} -- {}", failure.source, failure.error);
        }
    }

    let _ = writeln!(out, "{}", "=".repeat(60));
    out
}

fn render_json(history: &SessionHistory, failures: &[ClassifyFailure]) -> String {
    let report = JsonReport {
        results: history.iter().collect(),
        failures,
    };
    match serde_json::to_string_pretty(&report) {
        Ok(json) => format!("{}\n", json),
        Err(e) => format!("{{\"error\": \"Failed to serialize results: {}\"}}\n", e),
    }
}
