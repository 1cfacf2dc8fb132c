mod file_config;

pub use file_config::{FileConfig, StrategyFileConfig};

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::{Path, PathBuf};

use crate::error::StandardizeError;
use crate::record::ColumnLayout;
use crate::vote::{ManualScripts, Strategy};

pub const DEFAULT_THRESHOLD: f64 = 0.05;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_BATCH_SIZE: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StrategyKind {
    #[default]
    Baseline,
    Threshold,
    Manual,
}

/// CLI arguments that take part in config resolution.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub filtered_output: Option<PathBuf>,
    pub write_filtered: bool,
    pub cache_path: Option<PathBuf>,
    pub reuse_cache: bool,
    pub entropy_report: Option<PathBuf>,
    pub strategy: StrategyKind,
    pub threshold: f64,
    pub scripts_file: Option<PathBuf>,
    pub workers: usize,
    pub batch_size: usize,
    pub label_column: usize,
    pub language_column: usize,
    pub delimiter: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        let layout = ColumnLayout::default();
        Self {
            input: None,
            output: None,
            filtered_output: None,
            write_filtered: false,
            cache_path: None,
            reuse_cache: false,
            entropy_report: None,
            strategy: StrategyKind::Baseline,
            threshold: DEFAULT_THRESHOLD,
            scripts_file: None,
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            label_column: layout.label_column(),
            language_column: layout.language_column(),
            delimiter: "\\t".to_string(),
        }
    }
}

/// Settings for one run. Built once at startup and only read afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub input: PathBuf,
    /// Kept records.
    pub output: PathBuf,
    /// Filtered records with their diagnostics, when requested.
    pub filtered_output: Option<PathBuf>,
    pub cache_path: PathBuf,
    pub reuse_cache: bool,
    pub entropy_report: Option<PathBuf>,
    pub strategy: StrategyKind,
    pub threshold: f64,
    pub scripts_file: Option<PathBuf>,
    pub workers: usize,
    pub batch_size: usize,
    pub layout: ColumnLayout,
    pub delimiter: char,
}

impl PipelineConfig {
    /// Defaults for everything but the two paths. The alias cache lands
    /// next to `output`.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        let output = output.into();
        Self {
            input: input.into(),
            cache_path: sibling_path(&output, "aliases"),
            output,
            filtered_output: None,
            reuse_cache: false,
            entropy_report: None,
            strategy: StrategyKind::Baseline,
            threshold: DEFAULT_THRESHOLD,
            scripts_file: None,
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            layout: ColumnLayout::default(),
            delimiter: '\t',
        }
    }

    /// Resolve configuration from CLI arguments and an optional TOML file.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let input = file
            .input
            .map(PathBuf::from)
            .or_else(|| cli.input.clone())
            .ok_or_else(|| anyhow::anyhow!("input must be given on the command line or in the config file"))?;
        let output = file
            .output
            .map(PathBuf::from)
            .or_else(|| cli.output.clone())
            .ok_or_else(|| anyhow::anyhow!("output must be given on the command line or in the config file"))?;

        let write_filtered = file.write_filtered.unwrap_or(cli.write_filtered);
        let explicit_filtered = file
            .filtered_output
            .map(PathBuf::from)
            .or_else(|| cli.filtered_output.clone());
        let filtered_output = if write_filtered {
            Some(explicit_filtered.unwrap_or_else(|| sibling_path(&output, "filtered")))
        } else {
            None
        };

        let cache_path = file
            .cache_path
            .map(PathBuf::from)
            .or_else(|| cli.cache_path.clone())
            .unwrap_or_else(|| sibling_path(&output, "aliases"));
        let entropy_report = file
            .entropy_report
            .map(PathBuf::from)
            .or_else(|| cli.entropy_report.clone());

        let strategy_file = file.strategy.unwrap_or_default();
        let strategy = match strategy_file.kind {
            Some(kind) => StrategyKind::from_str(&kind, true)
                .map_err(|e| anyhow::anyhow!("Unknown strategy {:?}: {}", kind, e))?,
            None => cli.strategy,
        };
        let threshold = strategy_file.threshold.unwrap_or(cli.threshold);
        let scripts_file = strategy_file
            .scripts_file
            .map(PathBuf::from)
            .or_else(|| cli.scripts_file.clone());

        let delimiter_text = file.delimiter.unwrap_or_else(|| cli.delimiter.clone());
        let delimiter = parse_delimiter(&delimiter_text)
            .ok_or_else(|| anyhow::anyhow!("Delimiter must be a single character, got {:?}", delimiter_text))?;

        let layout = ColumnLayout::new(
            file.label_column.unwrap_or(cli.label_column),
            file.language_column.unwrap_or(cli.language_column),
        )?;

        let config = Self {
            input,
            output,
            filtered_output,
            cache_path,
            reuse_cache: file.reuse_cache.unwrap_or(cli.reuse_cache),
            entropy_report,
            strategy,
            threshold,
            scripts_file,
            workers: file.workers.unwrap_or(cli.workers),
            batch_size: file.batch_size.unwrap_or(cli.batch_size),
            layout,
            delimiter,
        };
        config.validate().context("Invalid pipeline configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), StandardizeError> {
        let invalid = |msg: String| Err(StandardizeError::InvalidConfig(msg));
        if self.workers == 0 {
            return invalid("worker count must be positive".to_string());
        }
        if self.batch_size == 0 {
            return invalid("batch size must be positive".to_string());
        }
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return invalid(format!("threshold must be in (0, 1], got {}", self.threshold));
        }
        if self.strategy == StrategyKind::Manual && self.scripts_file.is_none() {
            return invalid("the manual strategy needs a scripts file".to_string());
        }
        if self.reuse_cache && !self.cache_path.is_file() {
            return invalid(format!(
                "cannot reuse alias cache, {:?} does not exist",
                self.cache_path
            ));
        }
        Ok(())
    }

    /// The vote strategy this run uses, loading the manual table if needed.
    pub fn build_strategy(&self) -> std::result::Result<Strategy, StandardizeError> {
        Ok(match self.strategy {
            StrategyKind::Baseline => Strategy::Baseline,
            StrategyKind::Threshold => Strategy::Threshold(self.threshold),
            StrategyKind::Manual => {
                let path = self.scripts_file.as_deref().ok_or_else(|| {
                    StandardizeError::InvalidConfig("the manual strategy needs a scripts file".to_string())
                })?;
                Strategy::Manual(ManualScripts::load(path, self.delimiter)?)
            }
        })
    }
}

/// `dir/name.ext` -> `dir/name.<tag>.ext`
pub fn sibling_path(path: &Path, tag: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let extension = path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tsv".to_string());
    path.with_file_name(format!("{}.{}.{}", stem, tag, extension))
}

/// A single character, or one of the spelled-out forms of tab.
pub fn parse_delimiter(s: &str) -> Option<char> {
    match s {
        "\\t" | "tab" | "TAB" => Some('\t'),
        _ => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli() -> CliConfig {
        CliConfig {
            input: Some(PathBuf::from("/data/names.tsv")),
            output: Some(PathBuf::from("/out/names.tsv")),
            ..CliConfig::default()
        }
    }

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter("\\t"), Some('\t'));
        assert_eq!(parse_delimiter("\t"), Some('\t'));
        assert_eq!(parse_delimiter("tab"), Some('\t'));
        assert_eq!(parse_delimiter(","), Some(','));
        assert_eq!(parse_delimiter(""), None);
        assert_eq!(parse_delimiter(",,"), None);
    }

    #[test]
    fn test_sibling_path() {
        assert_eq!(
            sibling_path(Path::new("/out/names.tsv"), "aliases"),
            PathBuf::from("/out/names.aliases.tsv")
        );
        assert_eq!(
            sibling_path(Path::new("names"), "filtered"),
            PathBuf::from("names.filtered.tsv")
        );
    }

    #[test]
    fn test_resolve_cli_only() {
        let config = PipelineConfig::resolve(&cli(), None).unwrap();
        assert_eq!(config.input, PathBuf::from("/data/names.tsv"));
        assert_eq!(config.cache_path, PathBuf::from("/out/names.aliases.tsv"));
        assert_eq!(config.filtered_output, None);
        assert_eq!(config.strategy, StrategyKind::Baseline);
        assert_eq!(config.threshold, DEFAULT_THRESHOLD);
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.layout, ColumnLayout::default());
        assert_eq!(config.delimiter, '\t');
        assert_eq!(config, PipelineConfig::new("/data/names.tsv", "/out/names.tsv"));
    }

    #[test]
    fn test_resolve_write_filtered_derives_path() {
        let cli = CliConfig {
            write_filtered: true,
            ..cli()
        };
        let config = PipelineConfig::resolve(&cli, None).unwrap();
        assert_eq!(
            config.filtered_output,
            Some(PathBuf::from("/out/names.filtered.tsv"))
        );
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let file = FileConfig::parse(
            r#"
            workers = 16
            delimiter = ","
            label_column = 0
            language_column = 1
            write_filtered = true
            filtered_output = "/audit/dropped.csv"

            [strategy]
            kind = "threshold"
            threshold = 0.2
            "#,
        )
        .unwrap();
        let cli = CliConfig {
            workers: 2,
            ..cli()
        };
        let config = PipelineConfig::resolve(&cli, Some(file)).unwrap();
        assert_eq!(config.workers, 16);
        assert_eq!(config.delimiter, ',');
        assert_eq!(config.layout.label_column(), 0);
        assert_eq!(config.layout.language_column(), 1);
        assert_eq!(config.strategy, StrategyKind::Threshold);
        assert_eq!(config.threshold, 0.2);
        assert_eq!(config.filtered_output, Some(PathBuf::from("/audit/dropped.csv")));
        assert_eq!(config.build_strategy().unwrap(), Strategy::Threshold(0.2));
    }

    #[test]
    fn test_resolve_missing_input_error() {
        let cli = CliConfig {
            input: None,
            ..cli()
        };
        assert!(PipelineConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_resolve_rejects_invalid_values() {
        for bad in [
            CliConfig { workers: 0, ..cli() },
            CliConfig { threshold: 0.0, ..cli() },
            CliConfig { threshold: 1.5, ..cli() },
            CliConfig { label_column: 3, ..cli() },
            CliConfig { delimiter: "ab".to_string(), ..cli() },
            CliConfig { strategy: StrategyKind::Manual, ..cli() },
            CliConfig { reuse_cache: true, ..cli() },
        ] {
            assert!(PipelineConfig::resolve(&bad, None).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn test_unknown_strategy_in_file() {
        let file = FileConfig::parse("[strategy]\nkind = \"plurality\"\n").unwrap();
        assert!(PipelineConfig::resolve(&cli(), Some(file)).is_err());
    }

    #[test]
    fn test_manual_strategy_loads_scripts_file() {
        let dir = TempDir::new().unwrap();
        let scripts = dir.path().join("scripts.tsv");
        std::fs::write(&scripts, "language_code\tscripts_to_keep\nsr\tCyrillic\n").unwrap();
        let cli = CliConfig {
            strategy: StrategyKind::Manual,
            scripts_file: Some(scripts),
            ..cli()
        };
        let config = PipelineConfig::resolve(&cli, None).unwrap();
        assert!(matches!(config.build_strategy().unwrap(), Strategy::Manual(_)));
    }
}
