//! Command implementations for the jap CLI.

pub mod estimate;
pub mod optimize;
pub mod strategies;

use anyhow::{Context, Result};
use resume_orchestrator::{PipelineConfig, PipelineConfigLoader};
use std::path::Path;

/// Loads the pipeline configuration, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfigLoader::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

/// Formats a USD amount for display.
pub fn usd(amount: f64) -> String {
    if amount < 0.01 { format!("${amount:.4}") } else { format!("${amount:.3}") }
}
