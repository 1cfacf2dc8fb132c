//! Per-string writing system classification.
//!
//! A label is classified by tallying the script of every codepoint that
//! carries script identity and returning the most frequent one. Whitespace,
//! digits, punctuation and symbols are skipped, as are combining marks whose
//! Unicode Script property is `Inherited`. The script of a codepoint is its
//! Unicode Script property.

use std::fmt;
use std::str::FromStr;

use tracing::warn;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;
use unicode_script::{Script, UnicodeScript};

use crate::error::StandardizeError;

/// Writing systems a label can be classified as.
///
/// Declaration order is the tie-break priority: when two scripts have the
/// same count, the one declared first wins. `Ord` follows the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScriptLabel {
    Latin,
    Cyrillic,
    Greek,
    Armenian,
    Georgian,
    Arabic,
    Hebrew,
    Syriac,
    Thaana,
    Nko,
    Adlam,
    Tifinagh,
    Ethiopic,
    Devanagari,
    Bengali,
    Gurmukhi,
    Gujarati,
    Oriya,
    Tamil,
    Telugu,
    Kannada,
    Malayalam,
    Sinhala,
    OlChiki,
    Thai,
    Lao,
    Tibetan,
    Myanmar,
    Khmer,
    Javanese,
    Mongolian,
    Cherokee,
    CanadianAboriginal,
    Hangul,
    Han,
    Hiragana,
    Katakana,
    Bopomofo,
    Yi,
    /// A script with its own Unicode identity but no variant here.
    Other,
    /// No script-bearing codepoints at all.
    Unknown,
}

impl ScriptLabel {
    /// Every label, in priority order.
    pub const ALL: [ScriptLabel; 41] = [
        ScriptLabel::Latin,
        ScriptLabel::Cyrillic,
        ScriptLabel::Greek,
        ScriptLabel::Armenian,
        ScriptLabel::Georgian,
        ScriptLabel::Arabic,
        ScriptLabel::Hebrew,
        ScriptLabel::Syriac,
        ScriptLabel::Thaana,
        ScriptLabel::Nko,
        ScriptLabel::Adlam,
        ScriptLabel::Tifinagh,
        ScriptLabel::Ethiopic,
        ScriptLabel::Devanagari,
        ScriptLabel::Bengali,
        ScriptLabel::Gurmukhi,
        ScriptLabel::Gujarati,
        ScriptLabel::Oriya,
        ScriptLabel::Tamil,
        ScriptLabel::Telugu,
        ScriptLabel::Kannada,
        ScriptLabel::Malayalam,
        ScriptLabel::Sinhala,
        ScriptLabel::OlChiki,
        ScriptLabel::Thai,
        ScriptLabel::Lao,
        ScriptLabel::Tibetan,
        ScriptLabel::Myanmar,
        ScriptLabel::Khmer,
        ScriptLabel::Javanese,
        ScriptLabel::Mongolian,
        ScriptLabel::Cherokee,
        ScriptLabel::CanadianAboriginal,
        ScriptLabel::Hangul,
        ScriptLabel::Han,
        ScriptLabel::Hiragana,
        ScriptLabel::Katakana,
        ScriptLabel::Bopomofo,
        ScriptLabel::Yi,
        ScriptLabel::Other,
        ScriptLabel::Unknown,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn name(self) -> &'static str {
        match self {
            ScriptLabel::Latin => "Latin",
            ScriptLabel::Cyrillic => "Cyrillic",
            ScriptLabel::Greek => "Greek",
            ScriptLabel::Armenian => "Armenian",
            ScriptLabel::Georgian => "Georgian",
            ScriptLabel::Arabic => "Arabic",
            ScriptLabel::Hebrew => "Hebrew",
            ScriptLabel::Syriac => "Syriac",
            ScriptLabel::Thaana => "Thaana",
            ScriptLabel::Nko => "Nko",
            ScriptLabel::Adlam => "Adlam",
            ScriptLabel::Tifinagh => "Tifinagh",
            ScriptLabel::Ethiopic => "Ethiopic",
            ScriptLabel::Devanagari => "Devanagari",
            ScriptLabel::Bengali => "Bengali",
            ScriptLabel::Gurmukhi => "Gurmukhi",
            ScriptLabel::Gujarati => "Gujarati",
            ScriptLabel::Oriya => "Oriya",
            ScriptLabel::Tamil => "Tamil",
            ScriptLabel::Telugu => "Telugu",
            ScriptLabel::Kannada => "Kannada",
            ScriptLabel::Malayalam => "Malayalam",
            ScriptLabel::Sinhala => "Sinhala",
            ScriptLabel::OlChiki => "Ol_Chiki",
            ScriptLabel::Thai => "Thai",
            ScriptLabel::Lao => "Lao",
            ScriptLabel::Tibetan => "Tibetan",
            ScriptLabel::Myanmar => "Myanmar",
            ScriptLabel::Khmer => "Khmer",
            ScriptLabel::Javanese => "Javanese",
            ScriptLabel::Mongolian => "Mongolian",
            ScriptLabel::Cherokee => "Cherokee",
            ScriptLabel::CanadianAboriginal => "Canadian_Aboriginal",
            ScriptLabel::Hangul => "Hangul",
            ScriptLabel::Han => "Han",
            ScriptLabel::Hiragana => "Hiragana",
            ScriptLabel::Katakana => "Katakana",
            ScriptLabel::Bopomofo => "Bopomofo",
            ScriptLabel::Yi => "Yi",
            ScriptLabel::Other => "Other",
            ScriptLabel::Unknown => "Unknown",
        }
    }

    /// Position in the priority order, usable as an array index.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Label for a Unicode Script property value. `Common`, `Inherited` and
    /// unassigned codepoints carry no script identity.
    pub fn from_unicode(script: Script) -> Option<ScriptLabel> {
        let label = match script {
            Script::Common | Script::Inherited | Script::Unknown => return None,
            Script::Latin => ScriptLabel::Latin,
            Script::Cyrillic => ScriptLabel::Cyrillic,
            Script::Greek => ScriptLabel::Greek,
            Script::Armenian => ScriptLabel::Armenian,
            Script::Georgian => ScriptLabel::Georgian,
            Script::Arabic => ScriptLabel::Arabic,
            Script::Hebrew => ScriptLabel::Hebrew,
            Script::Syriac => ScriptLabel::Syriac,
            Script::Thaana => ScriptLabel::Thaana,
            Script::Nko => ScriptLabel::Nko,
            Script::Adlam => ScriptLabel::Adlam,
            Script::Tifinagh => ScriptLabel::Tifinagh,
            Script::Ethiopic => ScriptLabel::Ethiopic,
            Script::Devanagari => ScriptLabel::Devanagari,
            Script::Bengali => ScriptLabel::Bengali,
            Script::Gurmukhi => ScriptLabel::Gurmukhi,
            Script::Gujarati => ScriptLabel::Gujarati,
            Script::Oriya => ScriptLabel::Oriya,
            Script::Tamil => ScriptLabel::Tamil,
            Script::Telugu => ScriptLabel::Telugu,
            Script::Kannada => ScriptLabel::Kannada,
            Script::Malayalam => ScriptLabel::Malayalam,
            Script::Sinhala => ScriptLabel::Sinhala,
            Script::Ol_Chiki => ScriptLabel::OlChiki,
            Script::Thai => ScriptLabel::Thai,
            Script::Lao => ScriptLabel::Lao,
            Script::Tibetan => ScriptLabel::Tibetan,
            Script::Myanmar => ScriptLabel::Myanmar,
            Script::Khmer => ScriptLabel::Khmer,
            Script::Javanese => ScriptLabel::Javanese,
            Script::Mongolian => ScriptLabel::Mongolian,
            Script::Cherokee => ScriptLabel::Cherokee,
            Script::Canadian_Aboriginal => ScriptLabel::CanadianAboriginal,
            Script::Hangul => ScriptLabel::Hangul,
            Script::Han => ScriptLabel::Han,
            Script::Hiragana => ScriptLabel::Hiragana,
            Script::Katakana => ScriptLabel::Katakana,
            Script::Bopomofo => ScriptLabel::Bopomofo,
            Script::Yi => ScriptLabel::Yi,
            _ => ScriptLabel::Other,
        };
        Some(label)
    }
}

impl fmt::Display for ScriptLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScriptLabel {
    type Err = StandardizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("mandarin") {
            return Ok(ScriptLabel::Han);
        }
        let wanted = squash(trimmed);
        ScriptLabel::ALL
            .iter()
            .copied()
            .find(|label| squash(label.name()) == wanted)
            .ok_or_else(|| StandardizeError::UnknownScript(s.to_string()))
    }
}

/// Lowercase with `_`, `-` and spaces dropped, so `Ol Chiki` matches `Ol_Chiki`.
fn squash(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Script of a single codepoint, or `None` when it carries no script identity.
fn char_script(c: char) -> Option<ScriptLabel> {
    if c.is_numeric() || !(c.is_alphabetic() || is_combining_mark(c)) {
        return None;
    }
    ScriptLabel::from_unicode(c.script())
}

/// Codepoint counts per script, indexed by `ScriptLabel::index`.
pub fn script_histogram(label: &str) -> [usize; ScriptLabel::COUNT] {
    let mut counts = [0usize; ScriptLabel::COUNT];
    for c in label.nfc() {
        if let Some(script) = char_script(c) {
            counts[script.index()] += 1;
        }
    }
    counts
}

/// Highest count wins, ties go to the script declared first.
fn dominant(counts: &[usize; ScriptLabel::COUNT]) -> ScriptLabel {
    let mut best = ScriptLabel::Unknown;
    let mut best_count = 0;
    for script in ScriptLabel::ALL {
        let count = counts[script.index()];
        if count > best_count {
            best = script;
            best_count = count;
        }
    }
    best
}

/// Classify a label by its most frequent script.
///
/// Labels with no script-bearing codepoints are `Unknown`. Labels that
/// carry the replacement character were decoded lossily from invalid
/// input; they are also `Unknown`, with a warning.
pub fn classify(label: &str) -> ScriptLabel {
    if label.contains(char::REPLACEMENT_CHARACTER) {
        warn!("Undecodable bytes in label {:?}, classifying as Unknown", label);
        return ScriptLabel::Unknown;
    }
    dominant(&script_histogram(label))
}
