//! Per-language script votes and the strategies that turn them into a
//! canonical script set.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info};

use crate::alias_cache::AliasScriptCache;
use crate::error::{Result, StandardizeError};
use crate::record::NameRecord;
use crate::script::ScriptLabel;
use crate::workers::{WorkerPool, reduce};

/// Scripts a language is considered to legitimately use. Iterates in
/// priority order.
pub type CanonicalSet = BTreeSet<ScriptLabel>;

/// Separator between script names inside one table cell. Never equal to
/// the table delimiter.
pub fn script_list_separator(delimiter: char) -> char {
    if delimiter == ',' { '|' } else { ',' }
}

/// Script names in priority order, joined for a table with `delimiter`.
pub fn format_canonical(set: &CanonicalSet, delimiter: char) -> String {
    let separator = script_list_separator(delimiter).to_string();
    set.iter()
        .map(|script| script.name())
        .collect::<Vec<_>>()
        .join(&separator)
}

/// Occurrence count of each script over a language's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptHistogram {
    counts: [u64; ScriptLabel::COUNT],
}

impl Default for ScriptHistogram {
    fn default() -> Self {
        Self {
            counts: [0; ScriptLabel::COUNT],
        }
    }
}

impl ScriptHistogram {
    pub fn add(&mut self, script: ScriptLabel) {
        self.add_count(script, 1);
    }

    pub fn add_count(&mut self, script: ScriptLabel, count: u64) {
        self.counts[script.index()] += count;
    }

    pub fn count(&self, script: ScriptLabel) -> u64 {
        self.counts[script.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Non-zero entries in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (ScriptLabel, u64)> + '_ {
        ScriptLabel::ALL
            .into_iter()
            .map(|script| (script, self.counts[script.index()]))
            .filter(|&(_, count)| count > 0)
    }

    pub fn merge(&mut self, other: &ScriptHistogram) {
        for (mine, theirs) in self.counts.iter_mut().zip(other.counts.iter()) {
            *mine += theirs;
        }
    }

    /// Most frequent script; ties go to the higher-priority script.
    pub fn argmax(&self) -> Option<ScriptLabel> {
        let mut best: Option<(ScriptLabel, u64)> = None;
        for (script, count) in self.iter() {
            match best {
                Some((_, best_count)) if best_count >= count => {}
                _ => best = Some((script, count)),
            }
        }
        best.map(|(script, _)| script)
    }

    /// `count / total`, `None` for an empty histogram.
    pub fn share(&self, script: ScriptLabel) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            None
        } else {
            Some(self.count(script) as f64 / total as f64)
        }
    }
}

impl FromIterator<ScriptLabel> for ScriptHistogram {
    fn from_iter<T: IntoIterator<Item = ScriptLabel>>(iter: T) -> Self {
        let mut histogram = ScriptHistogram::default();
        for script in iter {
            histogram.add(script);
        }
        histogram
    }
}

/// Histograms keyed by language code.
pub type LanguageHistograms = HashMap<String, ScriptHistogram>;

/// Allowed scripts per language, read from a
/// `language_code<delim>scripts_to_keep` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualScripts {
    allowed: HashMap<String, CanonicalSet>,
}

impl ManualScripts {
    pub fn new(allowed: HashMap<String, CanonicalSet>) -> Self {
        Self { allowed }
    }

    pub fn load(path: &Path, delimiter: char) -> Result<Self> {
        let file = File::open(path).map_err(|e| StandardizeError::io(path, e))?;
        let malformed = |line: usize, reason: String| StandardizeError::MalformedScriptsRow {
            path: path.to_path_buf(),
            line,
            reason,
        };

        let mut allowed = HashMap::new();
        // first line is the header
        for (index, line) in BufReader::new(file).lines().enumerate().skip(1) {
            let line = line.map_err(|e| StandardizeError::io(path, e))?;
            let line_no = index + 1;
            if line.trim().is_empty() {
                continue;
            }
            let (language, scripts) = line
                .split_once(delimiter)
                .ok_or_else(|| malformed(line_no, "expected two columns".to_string()))?;
            let scripts = scripts
                .split([',', '|'])
                .filter(|name| !name.trim().is_empty())
                .map(str::parse::<ScriptLabel>)
                .collect::<Result<CanonicalSet>>()
                .map_err(|e| malformed(line_no, e.to_string()))?;
            allowed.insert(language.trim().to_string(), scripts);
        }
        info!("Loaded allowed scripts for {} languages from {:?}", allowed.len(), path);
        Ok(Self { allowed })
    }

    pub fn get(&self, language: &str) -> Option<&CanonicalSet> {
        self.allowed.get(language)
    }
}

/// Policy turning a language's histogram into its canonical set.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// The single most frequent script.
    Baseline,
    /// Every script whose share of the language reaches the threshold, or
    /// the baseline pick when none does.
    Threshold(f64),
    /// A fixed table of allowed scripts; unlisted languages keep every
    /// script they use.
    Manual(ManualScripts),
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Baseline => "baseline",
            Strategy::Threshold(_) => "threshold",
            Strategy::Manual(_) => "manual",
        }
    }

    /// Canonical set for one language. Empty only when the histogram is
    /// empty (or a manual entry lists no scripts).
    pub fn evaluate(&self, language: &str, histogram: &ScriptHistogram) -> CanonicalSet {
        match self {
            Strategy::Baseline => baseline(histogram),
            Strategy::Threshold(threshold) => {
                let total = histogram.total() as f64;
                let above: CanonicalSet = histogram
                    .iter()
                    .filter(|&(_, count)| count as f64 / total >= *threshold)
                    .map(|(script, _)| script)
                    .collect();
                if above.is_empty() {
                    debug!(
                        "No script of {} reaches share {}, using baseline",
                        language, threshold
                    );
                    baseline(histogram)
                } else {
                    above
                }
            }
            Strategy::Manual(table) => match table.get(language) {
                Some(allowed) => allowed.clone(),
                None => histogram.iter().map(|(script, _)| script).collect(),
            },
        }
    }
}

fn baseline(histogram: &ScriptHistogram) -> CanonicalSet {
    histogram.argmax().into_iter().collect()
}

/// A language's script votes and the decision drawn from them.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageScriptProfile {
    pub language: String,
    /// Votes over all valid records.
    pub histogram: ScriptHistogram,
    pub canonical: CanonicalSet,
    /// Votes over kept records, filled in by filtering.
    pub kept: ScriptHistogram,
    pub entropy_before: Option<f64>,
    pub entropy_after: Option<f64>,
}

impl LanguageScriptProfile {
    pub fn is_canonical(&self, script: ScriptLabel) -> bool {
        self.canonical.contains(&script)
    }
}

/// Profiles keyed by language code, ordered by code.
pub type ProfileMap = BTreeMap<String, LanguageScriptProfile>;

/// Histogram of one shard of records.
pub fn partial_histograms(
    records: &[NameRecord],
    cache: &AliasScriptCache,
) -> Result<LanguageHistograms> {
    let mut histograms = LanguageHistograms::new();
    for record in records {
        let script = cache.get(&record.label)?;
        histograms
            .entry(record.language_code.clone())
            .or_default()
            .add(script);
    }
    Ok(histograms)
}

/// Fold one partial into an accumulated set of histograms.
pub fn merge_histograms(
    mut total: LanguageHistograms,
    partial: LanguageHistograms,
) -> Result<LanguageHistograms> {
    for (language, histogram) in partial {
        total.entry(language).or_default().merge(&histogram);
    }
    Ok(total)
}

/// Histograms over `records`, built shard by shard and merged.
pub fn collect_histograms(
    records: &[NameRecord],
    cache: &AliasScriptCache,
    pool: &WorkerPool,
) -> Result<LanguageHistograms> {
    let partials = pool.map_shards(records, |shard| partial_histograms(shard, cache))?;
    reduce(partials, LanguageHistograms::new(), merge_histograms)
}

/// Apply the strategy to complete histograms. Only call once every shard
/// has been merged.
pub fn decide(histograms: LanguageHistograms, strategy: &Strategy) -> ProfileMap {
    histograms
        .into_iter()
        .map(|(language, histogram)| {
            let canonical = strategy.evaluate(&language, &histogram);
            let profile = LanguageScriptProfile {
                language: language.clone(),
                histogram,
                canonical,
                kept: ScriptHistogram::default(),
                entropy_before: None,
                entropy_after: None,
            };
            (language, profile)
        })
        .collect()
}

/// Build every language's profile from records in memory.
pub fn aggregate(
    records: &[NameRecord],
    cache: &AliasScriptCache,
    strategy: &Strategy,
    pool: &WorkerPool,
) -> Result<ProfileMap> {
    let histograms = collect_histograms(records, cache, pool)?;
    Ok(decide(histograms, strategy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ScriptLabel::*;
    use tempfile::TempDir;

    fn histogram(entries: &[(ScriptLabel, u64)]) -> ScriptHistogram {
        let mut h = ScriptHistogram::default();
        for &(script, count) in entries {
            h.add_count(script, count);
        }
        h
    }

    fn set(scripts: &[ScriptLabel]) -> CanonicalSet {
        scripts.iter().copied().collect()
    }

    fn record(line: usize, label: &str, language: &str) -> NameRecord {
        NameRecord {
            line,
            entity_id: format!("Q{}", line),
            english_gloss: "gloss".to_string(),
            label: label.to_string(),
            language_code: language.to_string(),
            entity_type: "PER".to_string(),
        }
    }

    #[test]
    fn test_histogram_basics() {
        let h: ScriptHistogram = [Latin, Cyrillic, Latin].into_iter().collect();
        assert_eq!(h.count(Latin), 2);
        assert_eq!(h.total(), 3);
        assert_eq!(h.iter().collect::<Vec<_>>(), vec![(Latin, 2), (Cyrillic, 1)]);
        assert_eq!(h.share(Cyrillic), Some(1.0 / 3.0));
        assert_eq!(ScriptHistogram::default().share(Latin), None);
    }

    #[test]
    fn test_argmax_tie_break() {
        assert_eq!(histogram(&[(Cyrillic, 3), (Latin, 3)]).argmax(), Some(Latin));
        assert_eq!(histogram(&[(Katakana, 2), (Han, 2)]).argmax(), Some(Han));
        assert_eq!(histogram(&[(Cyrillic, 4), (Latin, 3)]).argmax(), Some(Cyrillic));
        assert_eq!(ScriptHistogram::default().argmax(), None);
    }

    #[test]
    fn test_baseline_is_singleton_argmax() {
        let h = histogram(&[(Cyrillic, 60), (Latin, 40)]);
        assert_eq!(Strategy::Baseline.evaluate("sr", &h), set(&[Cyrillic]));
        assert!(Strategy::Baseline.evaluate("xx", &ScriptHistogram::default()).is_empty());
    }

    #[test]
    fn test_threshold_keeps_every_script_above_share() {
        let h = histogram(&[(Cyrillic, 60), (Latin, 40)]);
        assert_eq!(Strategy::Threshold(0.2).evaluate("sr", &h), set(&[Latin, Cyrillic]));
        assert_eq!(Strategy::Threshold(0.5).evaluate("sr", &h), set(&[Cyrillic]));

        let h = histogram(&[(Latin, 8), (Cyrillic, 2)]);
        assert_eq!(Strategy::Threshold(0.2).evaluate("x", &h), set(&[Latin, Cyrillic]));
    }

    #[test]
    fn test_threshold_falls_back_to_baseline() {
        let h = histogram(&[(Latin, 1), (Cyrillic, 1), (Greek, 1), (Arabic, 1)]);
        assert_eq!(Strategy::Threshold(0.5).evaluate("x", &h), set(&[Latin]));
    }

    #[test]
    fn test_manual_strategy() {
        let mut allowed = HashMap::new();
        allowed.insert("sr".to_string(), set(&[Cyrillic]));
        let strategy = Strategy::Manual(ManualScripts::new(allowed));
        let h = histogram(&[(Cyrillic, 1), (Latin, 9)]);
        assert_eq!(strategy.evaluate("sr", &h), set(&[Cyrillic]));
        assert_eq!(strategy.evaluate("en", &h), set(&[Latin, Cyrillic]));
    }

    #[test]
    fn test_manual_scripts_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scripts.tsv");
        std::fs::write(
            &path,
            "language_code\tscripts_to_keep\nsr\tCyrillic, Latin\nja\tHan,Hiragana,Katakana\n",
        )
        .unwrap();
        let table = ManualScripts::load(&path, '\t').unwrap();
        assert_eq!(table.get("sr"), Some(&set(&[Latin, Cyrillic])));
        assert_eq!(table.get("ja"), Some(&set(&[Han, Hiragana, Katakana])));
        assert_eq!(table.get("en"), None);

        std::fs::write(&path, "language_code\tscripts_to_keep\nsr\tElvish\n").unwrap();
        assert!(matches!(
            ManualScripts::load(&path, '\t'),
            Err(StandardizeError::MalformedScriptsRow { line: 2, .. })
        ));
    }

    #[test]
    fn test_aggregate_merges_all_shards() {
        let mut records = Vec::new();
        for i in 0..6 {
            records.push(record(i, "Београд", "sr"));
        }
        for i in 6..10 {
            records.push(record(i, "Beograd", "sr"));
        }
        records.push(record(10, "Paris", "fr"));

        let pool = WorkerPool::new(4).unwrap();
        let labels = records.iter().map(|r| r.label.clone());
        let cache = AliasScriptCache::build(labels, &pool).unwrap();

        let profiles = aggregate(&records, &cache, &Strategy::Baseline, &pool).unwrap();
        let sr = &profiles["sr"];
        assert_eq!(sr.histogram.count(Cyrillic), 6);
        assert_eq!(sr.histogram.count(Latin), 4);
        assert_eq!(sr.histogram.total(), 10);
        assert_eq!(sr.canonical, set(&[Cyrillic]));
        assert_eq!(profiles["fr"].histogram.total(), 1);

        let profiles = aggregate(&records, &cache, &Strategy::Threshold(0.2), &pool).unwrap();
        assert_eq!(profiles["sr"].canonical, set(&[Latin, Cyrillic]));
    }

    #[test]
    fn test_aggregate_cache_miss_is_fatal() {
        let pool = WorkerPool::new(2).unwrap();
        let records = vec![record(1, "Paris", "fr")];
        let err = aggregate(&records, &AliasScriptCache::default(), &Strategy::Baseline, &pool)
            .unwrap_err();
        assert!(matches!(err, StandardizeError::CacheMiss(_)));
    }

    #[test]
    fn test_format_canonical_priority_order() {
        assert_eq!(format_canonical(&set(&[Cyrillic, Latin]), '\t'), "Latin,Cyrillic");
        assert_eq!(format_canonical(&CanonicalSet::new(), '\t'), "");
    }

    #[test]
    fn test_format_canonical_avoids_delimiter() {
        let both = set(&[Greek, Cyrillic, Latin]);
        assert_eq!(format_canonical(&both, ','), "Latin|Cyrillic|Greek");
        assert_eq!(format_canonical(&both, '|'), "Latin,Cyrillic,Greek");
        assert_eq!(format_canonical(&both, ';'), "Latin,Cyrillic,Greek");
    }
}
