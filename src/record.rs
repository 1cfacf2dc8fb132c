//! Name records and the delimited table reader that produces them.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Result, StandardizeError};

/// Columns every input row must have.
pub const RECORD_COLUMNS: usize = 5;

lazy_static! {
    // Wikidata-style codes: en, zh-hans, zh-Hant, be-tarask, zh-classical, zh-min-nan
    static ref LANGUAGE_CODE: Regex =
        Regex::new(r"^(?i)[a-z]{2,8}(-[a-z0-9]{1,16})*$").unwrap();
}

/// One entity/language/script rendering of a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRecord {
    /// 1-based line number in the input table.
    pub line: usize,
    pub entity_id: String,
    pub english_gloss: String,
    pub label: String,
    pub language_code: String,
    pub entity_type: String,
}

/// Why a row was kept out of every downstream stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    WrongColumnCount(usize),
    EmptyLanguage,
    InvalidLanguage(String),
    EmptyLabel,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::WrongColumnCount(found) => {
                write!(f, "expected {} columns, found {}", RECORD_COLUMNS, found)
            }
            Rejection::EmptyLanguage => f.write_str("empty language code"),
            Rejection::InvalidLanguage(code) => write!(f, "invalid language code {:?}", code),
            Rejection::EmptyLabel => f.write_str("empty label"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub line: usize,
    pub reason: Rejection,
}

pub type ParsedRow = std::result::Result<NameRecord, RejectedRow>;

/// Where the label and language code live in a row. The remaining three
/// columns are, in order of appearance, entity id, English gloss and entity
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    label: usize,
    language: usize,
    rest: [usize; 3],
}

impl ColumnLayout {
    pub fn new(label: usize, language: usize) -> Result<Self> {
        if label >= RECORD_COLUMNS || language >= RECORD_COLUMNS {
            return Err(StandardizeError::InvalidConfig(format!(
                "label column {} and language column {} must be below {}",
                label, language, RECORD_COLUMNS
            )));
        }
        if label == language {
            return Err(StandardizeError::InvalidConfig(format!(
                "label and language columns must differ (both {})",
                label
            )));
        }
        let mut rest = [0usize; 3];
        let mut slot = 0;
        for column in 0..RECORD_COLUMNS {
            if column != label && column != language {
                rest[slot] = column;
                slot += 1;
            }
        }
        Ok(Self {
            label,
            language,
            rest,
        })
    }

    pub fn label_column(&self) -> usize {
        self.label
    }

    pub fn language_column(&self) -> usize {
        self.language
    }

    /// Validate and split one row.
    pub fn parse(&self, line: usize, row: &str, delimiter: char) -> ParsedRow {
        let fields: Vec<&str> = row.split(delimiter).collect();
        let reject = |reason| RejectedRow { line, reason };

        if fields.len() != RECORD_COLUMNS {
            return Err(reject(Rejection::WrongColumnCount(fields.len())));
        }
        let language = fields[self.language];
        if language.trim().is_empty() {
            return Err(reject(Rejection::EmptyLanguage));
        }
        if !LANGUAGE_CODE.is_match(language) {
            return Err(reject(Rejection::InvalidLanguage(language.to_string())));
        }
        let label = fields[self.label];
        if label.trim().is_empty() {
            return Err(reject(Rejection::EmptyLabel));
        }

        Ok(NameRecord {
            line,
            entity_id: fields[self.rest[0]].to_string(),
            english_gloss: fields[self.rest[1]].to_string(),
            label: label.to_string(),
            language_code: language.to_string(),
            entity_type: fields[self.rest[2]].to_string(),
        })
    }

    /// Fields of a record back in input column order.
    pub fn fields<'a>(&self, record: &'a NameRecord) -> [&'a str; RECORD_COLUMNS] {
        let mut out = [""; RECORD_COLUMNS];
        out[self.label] = &record.label;
        out[self.language] = &record.language_code;
        out[self.rest[0]] = &record.entity_id;
        out[self.rest[1]] = &record.english_gloss;
        out[self.rest[2]] = &record.entity_type;
        out
    }
}

impl Default for ColumnLayout {
    /// entity_id, english_gloss, label, language_code, entity_type
    fn default() -> Self {
        Self {
            label: 2,
            language: 3,
            rest: [0, 1, 4],
        }
    }
}

/// Streams a header-first delimited table in batches of parsed rows.
pub struct RecordReader<R> {
    inner: R,
    path: PathBuf,
    layout: ColumnLayout,
    delimiter: char,
    header: Vec<String>,
    line: usize,
    buf: Vec<u8>,
}

impl RecordReader<BufReader<File>> {
    pub fn open(path: &Path, layout: ColumnLayout, delimiter: char) -> Result<Self> {
        let file = File::open(path).map_err(|e| StandardizeError::io(path, e))?;
        Self::new(BufReader::new(file), path, layout, delimiter)
    }
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(inner: R, path: &Path, layout: ColumnLayout, delimiter: char) -> Result<Self> {
        let mut reader = Self {
            inner,
            path: path.to_path_buf(),
            layout,
            delimiter,
            header: Vec::new(),
            line: 0,
            buf: Vec::new(),
        };
        if let Some(header) = reader.next_line()? {
            reader.header = header.split(delimiter).map(str::to_string).collect();
        }
        Ok(reader)
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let read = self
            .inner
            .read_until(b'\n', &mut self.buf)
            .map_err(|e| StandardizeError::io(&self.path, e))?;
        if read == 0 {
            return Ok(None);
        }
        self.line += 1;
        while matches!(self.buf.last(), Some(b'\n') | Some(b'\r')) {
            self.buf.pop();
        }
        // Invalid UTF-8 becomes U+FFFD; the classifier maps those labels to Unknown.
        let text = match std::str::from_utf8(&self.buf) {
            Ok(text) => text.to_string(),
            Err(_) => String::from_utf8_lossy(&self.buf).into_owned(),
        };
        Ok(Some(text))
    }

    /// Up to `max_rows` parsed rows, or `None` at end of input.
    pub fn next_batch(&mut self, max_rows: usize) -> Result<Option<Vec<ParsedRow>>> {
        let mut batch = Vec::with_capacity(max_rows.min(4096));
        while batch.len() < max_rows {
            match self.next_line()? {
                Some(row) => batch.push(self.layout.parse(self.line, &row, self.delimiter)),
                None => break,
            }
        }
        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }

    /// Reads everything that is left.
    pub fn read_all(&mut self) -> Result<Vec<ParsedRow>> {
        let mut rows = Vec::new();
        while let Some(batch) = self.next_batch(usize::MAX)? {
            rows.extend(batch);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(text: &[u8]) -> RecordReader<Cursor<Vec<u8>>> {
        RecordReader::new(
            Cursor::new(text.to_vec()),
            Path::new("test.tsv"),
            ColumnLayout::default(),
            '\t',
        )
        .unwrap()
    }

    #[test]
    fn test_parse_valid_row() {
        let layout = ColumnLayout::default();
        let record = layout.parse(2, "Q90\tParis\tParis\tfr\tLOC", '\t').unwrap();
        assert_eq!(record.entity_id, "Q90");
        assert_eq!(record.english_gloss, "Paris");
        assert_eq!(record.label, "Paris");
        assert_eq!(record.language_code, "fr");
        assert_eq!(record.entity_type, "LOC");
        assert_eq!(layout.fields(&record), ["Q90", "Paris", "Paris", "fr", "LOC"]);
    }

    #[test]
    fn test_parse_rejections() {
        let layout = ColumnLayout::default();
        let reason = |row: &str| layout.parse(7, row, '\t').unwrap_err().reason;

        assert_eq!(reason("Q90\tParis\tParis\tfr"), Rejection::WrongColumnCount(4));
        assert_eq!(reason(""), Rejection::WrongColumnCount(1));
        assert_eq!(reason("Q90\tParis\tParis\t\tLOC"), Rejection::EmptyLanguage);
        assert_eq!(
            reason("Q90\tParis\tParis\tFR!\tLOC"),
            Rejection::InvalidLanguage("FR!".to_string())
        );
        assert_eq!(reason("Q90\tParis\t  \tfr\tLOC"), Rejection::EmptyLabel);
        assert_eq!(layout.parse(7, "", '\t').unwrap_err().line, 7);
    }

    #[test]
    fn test_language_code_shapes() {
        let layout = ColumnLayout::default();
        for code in [
            "en",
            "zh-hans",
            "zh-Hant",
            "be-tarask",
            "zh-classical",
            "zh-min-nan",
            "sr-el",
            "be-x-old",
        ] {
            let row = format!("Q1\tx\ty\t{}\tPER", code);
            let record = layout.parse(1, &row, '\t').unwrap();
            assert_eq!(record.language_code, code);
        }
        for code in ["e", "en_US", "zh-", "-en", "fr hello"] {
            let row = format!("Q1\tx\ty\t{}\tPER", code);
            assert!(layout.parse(1, &row, '\t').is_err(), "{} should be rejected", code);
        }
    }

    #[test]
    fn test_custom_layout_round_trips_field_order() {
        let layout = ColumnLayout::new(0, 4).unwrap();
        let record = layout.parse(1, "Москва\tQ649\tMoscow\tLOC\tru", '\t').unwrap();
        assert_eq!(record.label, "Москва");
        assert_eq!(record.language_code, "ru");
        assert_eq!(record.entity_id, "Q649");
        assert_eq!(record.english_gloss, "Moscow");
        assert_eq!(record.entity_type, "LOC");
        assert_eq!(layout.fields(&record), ["Москва", "Q649", "Moscow", "LOC", "ru"]);
    }

    #[test]
    fn test_layout_validation() {
        assert!(ColumnLayout::new(2, 2).is_err());
        assert!(ColumnLayout::new(5, 1).is_err());
        assert_eq!(ColumnLayout::new(2, 3).unwrap(), ColumnLayout::default());
    }

    #[test]
    fn test_reader_batches_and_line_numbers() {
        let mut r = reader(
            b"id\teng\tlabel\tlang\ttype\r\nQ1\ta\tA\ten\tPER\r\nQ2\tb\tB\ten\tPER\nbad row\nQ3\tc\tC\tde\tLOC",
        );
        assert_eq!(r.header(), ["id", "eng", "label", "lang", "type"]);

        let first = r.next_batch(2).unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].as_ref().unwrap().line, 2);
        assert_eq!(first[1].as_ref().unwrap().label, "B");

        let second = r.next_batch(2).unwrap().unwrap();
        assert_eq!(second[0].as_ref().unwrap_err().line, 4);
        assert_eq!(second[1].as_ref().unwrap().entity_type, "LOC");

        assert!(r.next_batch(2).unwrap().is_none());
    }

    #[test]
    fn test_reader_decodes_invalid_utf8_lossily() {
        let mut text = b"id\teng\tlabel\tlang\ttype\nQ1\ta\tPar".to_vec();
        text.push(0xFF);
        text.extend_from_slice(b"s\tfr\tLOC\n");
        let rows = reader(&text).read_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].as_ref().unwrap().label.contains('\u{FFFD}'));
    }

    #[test]
    fn test_reader_empty_input() {
        let mut r = reader(b"");
        assert!(r.header().is_empty());
        assert!(r.next_batch(10).unwrap().is_none());
    }
}
