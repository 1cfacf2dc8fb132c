use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Optional TOML overlay. Any value present here wins over the CLI.
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub input: Option<String>,
    pub output: Option<String>,
    pub filtered_output: Option<String>,
    pub write_filtered: Option<bool>,
    pub cache_path: Option<String>,
    pub reuse_cache: Option<bool>,
    pub entropy_report: Option<String>,

    pub workers: Option<usize>,
    pub batch_size: Option<usize>,

    pub label_column: Option<usize>,
    pub language_column: Option<usize>,
    pub delimiter: Option<String>,

    pub strategy: Option<StrategyFileConfig>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct StrategyFileConfig {
    /// "baseline", "threshold" or "manual"
    pub kind: Option<String>,
    pub threshold: Option<f64>,
    pub scripts_file: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
