//! End-to-end standardization run.
//!
//! The input is streamed three times so memory stays proportional to the
//! number of distinct labels and languages:
//!
//! 1. collect distinct labels and count rejected rows, then build (or load)
//!    the alias cache;
//! 2. build per-language histograms shard by shard and merge them; the
//!    canonical sets are decided only after the last batch is merged;
//! 3. route every record to the kept or filtered stream and tally the kept
//!    votes for the entropy report.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::alias_cache::AliasScriptCache;
use crate::config::PipelineConfig;
use crate::entropy::{EntropyChange, EntropyReport, annotate};
use crate::error::{Result, StandardizeError};
use crate::filter::{StreamWriters, apply};
use crate::record::{NameRecord, ParsedRow, RecordReader, RejectedRow};
use crate::vote::{LanguageHistograms, ProfileMap, collect_histograms, decide, merge_histograms};
use crate::workers::WorkerPool;

/// Rejected rows logged at warn level before switching to debug.
const REJECTED_WARN_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub input_rows: usize,
    pub kept: usize,
    pub filtered: usize,
    pub rejected: usize,
    pub distinct_labels: usize,
    /// Labels whose script came from a persisted cache.
    pub cache_reused: usize,
    /// Labels classified during this run.
    pub cache_classified: usize,
    pub languages: usize,
    pub entropy: EntropyReport,
    pub entropy_change: EntropyChange,
}

/// Run the whole pipeline described by `config`.
pub fn run(config: &PipelineConfig) -> Result<RunSummary> {
    config.validate()?;
    let strategy = config.build_strategy()?;
    let pool = WorkerPool::new(config.workers)?;
    info!(
        "Standardizing {:?} with the {} strategy on {} workers",
        config.input,
        strategy.name(),
        pool.workers()
    );

    // Pass 1: distinct labels.
    let scan = scan_input(config)?;
    info!(
        "Read {} rows: {} distinct labels, {} rejected",
        scan.input_rows,
        scan.labels.len(),
        scan.rejected
    );

    let distinct_labels = scan.labels.len();
    let (cache, cache_reused, cache_classified) = prepare_cache(config, scan.labels, &pool)?;

    // Pass 2: histograms, merged across every batch before deciding.
    let mut histograms = LanguageHistograms::new();
    for_each_batch(config, |records| {
        let batch = collect_histograms(&records, &cache, &pool)?;
        histograms = merge_histograms(std::mem::take(&mut histograms), batch)?;
        Ok(())
    })?;
    let mut profiles = decide(histograms, &strategy);
    info!("Decided canonical scripts for {} languages", profiles.len());
    for profile in profiles.values() {
        debug!(
            "{}: {} records, canonical {:?}",
            profile.language,
            profile.histogram.total(),
            profile.canonical
        );
    }

    // Pass 3: filter and write.
    let (kept, filtered) = filter_input(config, &cache, &mut profiles, &pool)?;

    if scan.input_rows != kept + filtered + scan.rejected {
        return Err(StandardizeError::ConservationViolated {
            input: scan.input_rows,
            kept,
            filtered,
            rejected: scan.rejected,
        });
    }
    info!(
        "Kept {} records, filtered {}, rejected {}",
        kept, filtered, scan.rejected
    );

    annotate(&mut profiles);
    let entropy = EntropyReport::from_profiles(&profiles);
    let entropy_change = entropy.change();
    info!(
        "Entropy changed for {} languages (mean change {:?}, largest drop {:?})",
        entropy_change.languages_changed, entropy_change.mean_change, entropy_change.largest_drop
    );
    if let Some(path) = &config.entropy_report {
        entropy.write(path, config.delimiter)?;
    }

    Ok(RunSummary {
        input_rows: scan.input_rows,
        kept,
        filtered,
        rejected: scan.rejected,
        distinct_labels,
        cache_reused,
        cache_classified,
        languages: profiles.len(),
        entropy,
        entropy_change,
    })
}

struct InputScan {
    input_rows: usize,
    rejected: usize,
    labels: HashSet<String>,
}

fn open(config: &PipelineConfig) -> Result<RecordReader<std::io::BufReader<std::fs::File>>> {
    RecordReader::open(&config.input, config.layout, config.delimiter)
}

fn scan_input(config: &PipelineConfig) -> Result<InputScan> {
    let mut reader = open(config)?;
    let mut scan = InputScan {
        input_rows: 0,
        rejected: 0,
        labels: HashSet::new(),
    };
    while let Some(batch) = reader.next_batch(config.batch_size)? {
        scan.input_rows += batch.len();
        for row in batch {
            match row {
                Ok(record) => {
                    scan.labels.insert(record.label);
                }
                Err(rejected) => {
                    log_rejected(&rejected, scan.rejected);
                    scan.rejected += 1;
                }
            }
        }
    }
    Ok(scan)
}

fn log_rejected(row: &RejectedRow, already_rejected: usize) {
    if already_rejected < REJECTED_WARN_LIMIT {
        warn!("Rejecting line {}: {}", row.line, row.reason);
    } else {
        if already_rejected == REJECTED_WARN_LIMIT {
            warn!("Further rejected rows are logged at debug level");
        }
        debug!("Rejecting line {}: {}", row.line, row.reason);
    }
}

/// Load the persisted cache and top it up, or classify from scratch.
/// Returns the cache with how many entries were reused and classified.
fn prepare_cache(
    config: &PipelineConfig,
    labels: HashSet<String>,
    pool: &WorkerPool,
) -> Result<(AliasScriptCache, usize, usize)> {
    if config.reuse_cache {
        let cached = AliasScriptCache::load(&config.cache_path, config.delimiter)?;
        let missing = cached.missing(&labels);
        let reused = labels.len() - missing.len();
        if missing.is_empty() {
            info!("Alias cache covers all {} labels", labels.len());
            return Ok((cached, reused, 0));
        }
        warn!(
            "Alias cache is missing {} of {} labels, classifying them",
            missing.len(),
            labels.len()
        );
        let classified = missing.len();
        let cache = cached.merge(AliasScriptCache::build(missing, pool)?)?;
        cache.save(&config.cache_path, config.delimiter)?;
        Ok((cache, reused, classified))
    } else {
        let cache = AliasScriptCache::build(labels, pool)?;
        cache.save(&config.cache_path, config.delimiter)?;
        let classified = cache.len();
        Ok((cache, 0, classified))
    }
}

/// Stream valid records batch by batch. Rejected rows were already
/// counted by the first pass and are skipped.
fn for_each_batch<F>(config: &PipelineConfig, mut f: F) -> Result<()>
where
    F: FnMut(Vec<NameRecord>) -> Result<()>,
{
    let mut reader = open(config)?;
    while let Some(batch) = reader.next_batch(config.batch_size)? {
        f(valid_records(batch))?;
    }
    Ok(())
}

fn valid_records(batch: Vec<ParsedRow>) -> Vec<NameRecord> {
    batch.into_iter().filter_map(|row| row.ok()).collect()
}

fn filter_input(
    config: &PipelineConfig,
    cache: &AliasScriptCache,
    profiles: &mut ProfileMap,
    pool: &WorkerPool,
) -> Result<(usize, usize)> {
    let header = open(config)?.header().to_vec();
    let mut writers = StreamWriters::create(
        &config.output,
        config.filtered_output.as_deref(),
        &header,
        config.layout,
        config.delimiter,
    )?;

    let mut kept = 0;
    let mut filtered = 0;
    let mut kept_votes = LanguageHistograms::new();
    for_each_batch(config, |records| {
        let outcome = apply(records, cache, profiles, pool)?;
        kept += outcome.kept.len();
        filtered += outcome.filtered.len();
        writers.write(&outcome)?;
        kept_votes = merge_histograms(std::mem::take(&mut kept_votes), outcome.kept_votes)?;
        Ok(())
    })?;
    writers.finish()?;

    for (language, votes) in kept_votes {
        if let Some(profile) = profiles.get_mut(&language) {
            profile.kept = votes;
        }
    }
    log_outputs(config);
    Ok((kept, filtered))
}

fn log_outputs(config: &PipelineConfig) {
    info!("Wrote kept records to {:?}", config.output);
    if let Some(path) = config.filtered_output.as_deref() {
        info!("Wrote filtered records to {:?}", path);
    }
}

/// Only classify the input's distinct labels and persist the cache, so
/// later runs can reuse it.
pub fn build_cache(config: &PipelineConfig) -> Result<AliasScriptCache> {
    let pool = WorkerPool::new(config.workers)?;
    let scan = scan_input(config)?;
    info!(
        "Read {} rows: {} distinct labels, {} rejected",
        scan.input_rows,
        scan.labels.len(),
        scan.rejected
    );
    let cache = AliasScriptCache::build(scan.labels, &pool)?;
    cache.save(&config.cache_path, config.delimiter)?;
    Ok(cache)
}
