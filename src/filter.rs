//! Split records into kept and filtered streams.
//!
//! A record is kept when the script of its label belongs to its language's
//! canonical set. Filtered records carry the detected script and the
//! canonical set they were judged against, so the decision can be audited.
//! Every record handed in comes out in exactly one of the two streams.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::alias_cache::AliasScriptCache;
use crate::error::{Result, StandardizeError};
use crate::record::{ColumnLayout, NameRecord};
use crate::script::ScriptLabel;
use crate::table::TableWriter;
use crate::vote::{CanonicalSet, LanguageHistograms, ProfileMap, format_canonical};
use crate::workers::WorkerPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterDecision {
    pub kept: bool,
    pub script: ScriptLabel,
}

/// Decide one record against the merged profiles.
pub fn decide(
    record: &NameRecord,
    cache: &AliasScriptCache,
    profiles: &ProfileMap,
) -> Result<FilterDecision> {
    let script = cache.get(&record.label)?;
    let profile = profiles
        .get(&record.language_code)
        .ok_or_else(|| StandardizeError::MissingProfile(record.language_code.clone()))?;
    Ok(FilterDecision {
        kept: profile.is_canonical(script),
        script,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilteredRecord {
    pub record: NameRecord,
    pub script: ScriptLabel,
    pub canonical: CanonicalSet,
}

#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub kept: Vec<NameRecord>,
    pub filtered: Vec<FilteredRecord>,
    /// Script votes over the kept records only.
    pub kept_votes: LanguageHistograms,
}

impl FilterOutcome {
    pub fn len(&self) -> usize {
        self.kept.len() + self.filtered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decide every record in parallel and route it, preserving input order
/// within each stream.
pub fn apply(
    records: Vec<NameRecord>,
    cache: &AliasScriptCache,
    profiles: &ProfileMap,
    pool: &WorkerPool,
) -> Result<FilterOutcome> {
    let decisions = pool.map_shards(&records, |shard| {
        shard
            .iter()
            .map(|record| decide(record, cache, profiles))
            .collect::<Result<Vec<_>>>()
    })?;

    let mut outcome = FilterOutcome::default();
    for (record, decision) in records.into_iter().zip(decisions.into_iter().flatten()) {
        if decision.kept {
            outcome
                .kept_votes
                .entry(record.language_code.clone())
                .or_default()
                .add(decision.script);
            outcome.kept.push(record);
        } else {
            // profiles were checked by decide()
            let canonical = profiles
                .get(&record.language_code)
                .map(|p| p.canonical.clone())
                .unwrap_or_default();
            outcome.filtered.push(FilteredRecord {
                record,
                script: decision.script,
                canonical,
            });
        }
    }
    Ok(outcome)
}

/// Kept table plus the optional filtered audit table.
pub struct StreamWriters {
    layout: ColumnLayout,
    delimiter: char,
    kept: TableWriter<BufWriter<File>>,
    filtered: Option<TableWriter<BufWriter<File>>>,
}

impl StreamWriters {
    pub fn create(
        kept_path: &Path,
        filtered_path: Option<&Path>,
        header: &[String],
        layout: ColumnLayout,
        delimiter: char,
    ) -> Result<Self> {
        let mut kept = TableWriter::create(kept_path, delimiter)?;
        if !header.is_empty() {
            kept.write_row(header)?;
        }

        let filtered = match filtered_path {
            Some(path) => {
                let mut writer = TableWriter::create(path, delimiter)?;
                if !header.is_empty() {
                    let mut audit_header: Vec<&str> = header.iter().map(String::as_str).collect();
                    audit_header.extend(["script", "canonical_scripts"]);
                    writer.write_row(&audit_header)?;
                }
                Some(writer)
            }
            None => None,
        };
        Ok(Self {
            layout,
            delimiter,
            kept,
            filtered,
        })
    }

    pub fn write(&mut self, outcome: &FilterOutcome) -> Result<()> {
        for record in &outcome.kept {
            self.kept.write_row(&self.layout.fields(record))?;
        }
        if let Some(writer) = self.filtered.as_mut() {
            for entry in &outcome.filtered {
                let canonical = format_canonical(&entry.canonical, self.delimiter);
                let mut row: Vec<&str> = self.layout.fields(&entry.record).to_vec();
                row.push(entry.script.name());
                row.push(&canonical);
                writer.write_row(&row)?;
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        self.kept.finish()?;
        if let Some(writer) = self.filtered {
            writer.finish()?;
        }
        Ok(())
    }
}
