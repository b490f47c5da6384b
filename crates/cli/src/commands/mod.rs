//! CLI commands for the walk-forward backtester.

pub mod analyze;
pub mod run;

pub use analyze::{run_analyze, AnalyzeArgs};
pub use run::{run_backtest, RunArgs};

use std::path::Path;

use anyhow::{anyhow, Result};
use walkline_core::{ConfigLoader, RunConfig};

/// Output format for backtest reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    /// Parses an output format from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(anyhow!(
                "Unknown format: '{}'. Valid formats: text, json",
                s
            )),
        }
    }
}

/// Loads `--config` if given, otherwise `walkline.toml` plus environment.
fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    match path {
        Some(p) => ConfigLoader::load_from(p),
        None => ConfigLoader::load(),
    }
}
