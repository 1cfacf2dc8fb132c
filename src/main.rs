use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use script_standardize::config::{
    CliConfig, DEFAULT_BATCH_SIZE, DEFAULT_THRESHOLD, DEFAULT_WORKERS, FileConfig, PipelineConfig,
    StrategyKind,
};
use script_standardize::entropy::format_entropy;
use script_standardize::pipeline;

#[derive(Parser, Debug)]
#[command(name = "script-standardize")]
#[command(about = "Infers each language's canonical scripts from a name corpus and filters out script noise")]
struct CliArgs {
    /// Delimited input table with a header row.
    pub input: Option<PathBuf>,

    /// Where to write the kept records.
    pub output: Option<PathBuf>,

    /// TOML file whose values override the command line.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Write filtered records with their detected script and canonical set.
    #[clap(long)]
    pub write_filtered: bool,

    /// Path of the filtered table (defaults next to the output).
    #[clap(long)]
    pub filtered_output: Option<PathBuf>,

    /// Alias cache location (defaults next to the output).
    #[clap(long)]
    pub cache_path: Option<PathBuf>,

    /// Load the alias cache from a previous run instead of reclassifying.
    #[clap(long)]
    pub reuse_cache: bool,

    /// Only build and save the alias cache, then exit.
    #[clap(long)]
    pub cache_only: bool,

    /// Where to write the per-language entropy report.
    #[clap(long)]
    pub entropy_report: Option<PathBuf>,

    /// How canonical scripts are voted.
    #[clap(long, value_enum, default_value = "baseline")]
    pub strategy: StrategyKind,

    /// Minimum share for a script to be canonical (threshold strategy).
    #[clap(long, default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f64,

    /// language_code/scripts_to_keep table (manual strategy).
    #[clap(long)]
    pub scripts_file: Option<PathBuf>,

    #[clap(short, long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Rows per streamed batch.
    #[clap(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Zero-based index of the label column.
    #[clap(long, default_value_t = 2)]
    pub label_column: usize,

    /// Zero-based index of the language code column.
    #[clap(long, default_value_t = 3)]
    pub language_column: usize,

    /// Column delimiter; "\t" or "tab" for tab.
    #[clap(long, default_value = "\\t")]
    pub delimiter: String,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            input: self.input.clone(),
            output: self.output.clone(),
            filtered_output: self.filtered_output.clone(),
            write_filtered: self.write_filtered,
            cache_path: self.cache_path.clone(),
            reuse_cache: self.reuse_cache,
            entropy_report: self.entropy_report.clone(),
            strategy: self.strategy,
            threshold: self.threshold,
            scripts_file: self.scripts_file.clone(),
            workers: self.workers,
            batch_size: self.batch_size,
            label_column: self.label_column,
            language_column: self.language_column,
            delimiter: self.delimiter.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install log subscriber")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = PipelineConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    if cli_args.cache_only {
        let cache = pipeline::build_cache(&config)?;
        info!("Alias cache with {} labels written to {:?}", cache.len(), config.cache_path);
        return Ok(());
    }

    let summary = pipeline::run(&config)
        .with_context(|| format!("Standardization of {:?} failed", config.input))?;

    info!(
        "Done: {} rows in, {} kept, {} filtered, {} rejected, {} languages",
        summary.input_rows, summary.kept, summary.filtered, summary.rejected, summary.languages
    );
    info!(
        "Alias cache: {} distinct labels, {} reused, {} classified",
        summary.distinct_labels, summary.cache_reused, summary.cache_classified
    );
    info!(
        "Corpus script entropy: {} before, {} after",
        format_entropy(summary.entropy.overall_before),
        format_entropy(summary.entropy.overall_after)
    );
    Ok(())
}
