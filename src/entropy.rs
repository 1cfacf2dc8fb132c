//! Shannon entropy of per-language script distributions.
//!
//! A language written in one script ends at zero entropy after filtering.
//! Languages that legitimately use several scripts keep a stable nonzero
//! value, so a large drop points at over-filtering.

use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;
use crate::table::TableWriter;
use crate::vote::{ProfileMap, ScriptHistogram};

/// Code of the corpus-wide row in the report.
pub const OVERALL_ROW: &str = "ALL";

const UNDEFINED: &str = "undefined";

/// Entropy in bits, `None` for an empty histogram.
pub fn entropy(histogram: &ScriptHistogram) -> Option<f64> {
    let total = histogram.total();
    if total == 0 {
        return None;
    }
    let total = total as f64;
    let h: f64 = histogram
        .iter()
        .map(|(_, count)| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum();
    // a single script yields -0.0
    Some(if h > 0.0 { h } else { 0.0 })
}

/// Fill `entropy_before` and `entropy_after` on every profile.
pub fn annotate(profiles: &mut ProfileMap) {
    for profile in profiles.values_mut() {
        profile.entropy_before = entropy(&profile.histogram);
        profile.entropy_after = entropy(&profile.kept);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntropyRow {
    pub language: String,
    pub records_before: u64,
    pub records_after: u64,
    pub before: Option<f64>,
    pub after: Option<f64>,
}

/// How filtering moved entropy across languages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntropyChange {
    /// Languages whose entropy differs before and after.
    pub languages_changed: usize,
    /// Mean of `after - before` over languages defined on both sides.
    pub mean_change: Option<f64>,
    /// Language with the most negative change.
    pub largest_drop: Option<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntropyReport {
    pub rows: Vec<EntropyRow>,
    pub overall_before: Option<f64>,
    pub overall_after: Option<f64>,
}

impl EntropyReport {
    /// Report over annotated profiles, rows ordered by language code.
    pub fn from_profiles(profiles: &ProfileMap) -> Self {
        let rows: Vec<EntropyRow> = profiles
            .values()
            .map(|p| EntropyRow {
                language: p.language.clone(),
                records_before: p.histogram.total(),
                records_after: p.kept.total(),
                before: p.entropy_before,
                after: p.entropy_after,
            })
            .collect();
        let overall_before = weighted_mean(rows.iter().map(|r| (r.before, r.records_before)));
        let overall_after = weighted_mean(rows.iter().map(|r| (r.after, r.records_after)));
        Self {
            rows,
            overall_before,
            overall_after,
        }
    }

    pub fn row(&self, language: &str) -> Option<&EntropyRow> {
        self.rows.iter().find(|r| r.language == language)
    }

    pub fn change(&self) -> EntropyChange {
        let mut change = EntropyChange::default();
        let mut sum = 0.0;
        let mut defined = 0usize;
        for row in &self.rows {
            let (Some(before), Some(after)) = (row.before, row.after) else {
                continue;
            };
            let delta = after - before;
            defined += 1;
            sum += delta;
            if delta.abs() > f64::EPSILON {
                change.languages_changed += 1;
                debug!(
                    "Entropy of {} moved {:.3} -> {:.3}",
                    row.language, before, after
                );
            }
            let is_larger_drop = match &change.largest_drop {
                Some((_, worst)) => delta < *worst,
                None => delta < 0.0,
            };
            if is_larger_drop {
                change.largest_drop = Some((row.language.clone(), delta));
            }
        }
        if defined > 0 {
            change.mean_change = Some(sum / defined as f64);
        }
        change
    }

    pub fn write(&self, path: &Path, delimiter: char) -> Result<()> {
        let mut writer = TableWriter::create(path, delimiter)?;
        writer.write_row(&["language_code", "entropy_before", "entropy_after"])?;
        for row in &self.rows {
            writer.write_row(&[
                row.language.clone(),
                format_entropy(row.before),
                format_entropy(row.after),
            ])?;
        }
        writer.write_row(&[
            OVERALL_ROW.to_string(),
            format_entropy(self.overall_before),
            format_entropy(self.overall_after),
        ])?;
        writer.finish()?;
        info!("Wrote entropy report for {} languages to {:?}", self.rows.len(), path);
        Ok(())
    }
}

fn weighted_mean(values: impl Iterator<Item = (Option<f64>, u64)>) -> Option<f64> {
    let mut weighted = 0.0;
    let mut weight = 0u64;
    for (value, n) in values {
        if let Some(v) = value {
            weighted += v * n as f64;
            weight += n;
        }
    }
    if weight == 0 {
        None
    } else {
        Some(weighted / weight as f64)
    }
}

pub fn format_entropy(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.6}", v),
        None => UNDEFINED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptLabel::*;
    use crate::vote::{CanonicalSet, LanguageScriptProfile};
    use tempfile::TempDir;

    fn histogram(entries: &[(crate::script::ScriptLabel, u64)]) -> ScriptHistogram {
        let mut h = ScriptHistogram::default();
        for &(script, count) in entries {
            h.add_count(script, count);
        }
        h
    }

    fn profile(language: &str, before: ScriptHistogram, after: ScriptHistogram) -> LanguageScriptProfile {
        LanguageScriptProfile {
            language: language.to_string(),
            histogram: before,
            canonical: CanonicalSet::new(),
            kept: after,
            entropy_before: None,
            entropy_after: None,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
    }

    #[test]
    fn test_entropy_values() {
        assert_eq!(entropy(&histogram(&[(Latin, 7)])), Some(0.0));
        assert_close(entropy(&histogram(&[(Latin, 5), (Cyrillic, 5)])).unwrap(), 1.0);
        assert_close(
            entropy(&histogram(&[(Latin, 1), (Cyrillic, 1), (Greek, 1), (Arabic, 1)])).unwrap(),
            2.0,
        );
        let h = entropy(&histogram(&[(Cyrillic, 60), (Latin, 40)])).unwrap();
        assert_close(h, -(0.6f64 * 0.6f64.log2() + 0.4 * 0.4f64.log2()));
    }

    #[test]
    fn test_entropy_empty_is_undefined() {
        assert_eq!(entropy(&ScriptHistogram::default()), None);
        assert_eq!(format_entropy(None), "undefined");
    }

    #[test]
    fn test_single_script_formats_as_positive_zero() {
        assert_eq!(format_entropy(entropy(&histogram(&[(Han, 3)]))), "0.000000");
    }

    #[test]
    fn test_report_weighted_average_and_change() {
        let mut profiles = ProfileMap::new();
        profiles.insert(
            "sr".to_string(),
            profile(
                "sr",
                histogram(&[(Cyrillic, 6), (Latin, 2)]),
                histogram(&[(Cyrillic, 6)]),
            ),
        );
        profiles.insert(
            "en".to_string(),
            profile("en", histogram(&[(Latin, 2)]), histogram(&[(Latin, 2)])),
        );
        annotate(&mut profiles);

        let report = EntropyReport::from_profiles(&profiles);
        assert_eq!(report.rows[0].language, "en");
        assert_eq!(report.row("sr").unwrap().after, Some(0.0));

        let sr_before = entropy(&histogram(&[(Cyrillic, 6), (Latin, 2)])).unwrap();
        assert_close(report.overall_before.unwrap(), sr_before * 8.0 / 10.0);
        assert_eq!(report.overall_after, Some(0.0));

        let change = report.change();
        assert_eq!(change.languages_changed, 1);
        assert_close(change.mean_change.unwrap(), -sr_before / 2.0);
        let (language, drop) = change.largest_drop.unwrap();
        assert_eq!(language, "sr");
        assert_close(drop, -sr_before);
    }

    #[test]
    fn test_report_with_fully_filtered_language() {
        let mut profiles = ProfileMap::new();
        profiles.insert(
            "xx".to_string(),
            profile("xx", histogram(&[(Latin, 3)]), ScriptHistogram::default()),
        );
        annotate(&mut profiles);
        let report = EntropyReport::from_profiles(&profiles);
        assert_eq!(report.rows[0].after, None);
        assert_eq!(report.overall_after, None);
        assert_eq!(report.change(), EntropyChange::default());
    }

    #[test]
    fn test_write_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entropy.tsv");
        let mut profiles = ProfileMap::new();
        profiles.insert(
            "sr".to_string(),
            profile(
                "sr",
                histogram(&[(Cyrillic, 1), (Latin, 1)]),
                histogram(&[(Cyrillic, 1), (Latin, 1)]),
            ),
        );
        annotate(&mut profiles);
        EntropyReport::from_profiles(&profiles).write(&path, '\t').unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "language_code\tentropy_before\tentropy_after\n\
             sr\t1.000000\t1.000000\n\
             ALL\t1.000000\t1.000000\n"
        );
    }
}
