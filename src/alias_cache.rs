//! Distinct-label classification cache.
//!
//! Name corpora repeat the same strings across many entities, so labels are
//! classified once per distinct value and every record looks its label up
//! here. The cache persists as a two-column table so later runs can skip
//! classification.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Result, StandardizeError};
use crate::script::{ScriptLabel, classify};
use crate::table::write_atomically;
use crate::workers::{WorkerPool, reduce};

const HEADER: [&str; 2] = ["label", "script"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasScriptCache {
    scripts: HashMap<String, ScriptLabel>,
}

impl AliasScriptCache {
    /// Classify every distinct label exactly once, spread over the pool.
    /// Duplicates in `labels` are collapsed before any work is done.
    pub fn build<I>(labels: I, pool: &WorkerPool) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut distinct: Vec<String> = labels.into_iter().collect();
        distinct.sort_unstable();
        distinct.dedup();
        debug!("Classifying {} distinct labels", distinct.len());

        let partials = pool.map_shards(&distinct, |shard| {
            Ok(AliasScriptCache::from_pairs(
                shard.iter().map(|label| (label.clone(), classify(label))),
            ))
        })?;
        reduce(partials, AliasScriptCache::default(), AliasScriptCache::merge)
    }

    fn from_pairs(pairs: impl Iterator<Item = (String, ScriptLabel)>) -> Self {
        Self {
            scripts: pairs.collect(),
        }
    }

    /// Script of a label collected during the distinct-value pass. A miss
    /// means a label bypassed that pass and is an error.
    pub fn get(&self, label: &str) -> Result<ScriptLabel> {
        self.scripts
            .get(label)
            .copied()
            .ok_or_else(|| StandardizeError::CacheMiss(label.to_string()))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.scripts.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Labels from `labels` that have no entry yet.
    pub fn missing<'a, I>(&self, labels: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        labels
            .into_iter()
            .filter(|label| !self.contains(label))
            .cloned()
            .collect()
    }

    /// Union of two caches. A label classified differently on each side
    /// means the classifier is not deterministic, which is fatal.
    pub fn merge(mut self, other: AliasScriptCache) -> Result<Self> {
        for (label, script) in other.scripts {
            match self.scripts.get(&label) {
                Some(&existing) if existing != script => {
                    return Err(StandardizeError::ClassificationConflict {
                        label,
                        first: existing,
                        second: script,
                    });
                }
                Some(_) => {}
                None => {
                    self.scripts.insert(label, script);
                }
            }
        }
        Ok(self)
    }

    pub fn load(path: &Path, delimiter: char) -> Result<Self> {
        let file = File::open(path).map_err(|e| StandardizeError::io(path, e))?;
        let malformed = |line: usize, reason: String| StandardizeError::MalformedCacheRow {
            path: path.to_path_buf(),
            line,
            reason,
        };

        let header = HEADER.join(delimiter.to_string().as_str());
        let mut cache = AliasScriptCache::default();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| StandardizeError::io(path, e))?;
            let line_no = index + 1;
            if line_no == 1 && line == header {
                continue;
            }
            if line.is_empty() {
                continue;
            }
            let (label, script) = line
                .rsplit_once(delimiter)
                .ok_or_else(|| malformed(line_no, "missing script column".to_string()))?;
            let script: ScriptLabel = script
                .parse()
                .map_err(|e: StandardizeError| malformed(line_no, e.to_string()))?;
            if let Some(previous) = cache.scripts.insert(label.to_string(), script) {
                if previous != script {
                    return Err(malformed(
                        line_no,
                        format!("{:?} listed as both {} and {}", label, previous, script),
                    ));
                }
            }
        }
        info!("Loaded {} cached labels from {:?}", cache.len(), path);
        Ok(cache)
    }

    /// Persist sorted by label.
    pub fn save(&self, path: &Path, delimiter: char) -> Result<()> {
        let mut entries: Vec<(&String, &ScriptLabel)> = self.scripts.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        write_atomically(path, delimiter, |writer| {
            writer.write_row(&HEADER)?;
            for (label, script) in entries {
                writer.write_row(&[label.as_str(), script.name()])?;
            }
            Ok(())
        })?;
        info!("Saved {} cached labels to {:?}", self.len(), path);
        Ok(())
    }
}
