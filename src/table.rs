//! Delimited table output.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Result, StandardizeError};

/// Row-at-a-time writer for a header-first delimited table.
pub struct TableWriter<W: Write> {
    out: W,
    path: PathBuf,
    delimiter: char,
    rows: usize,
}

impl TableWriter<BufWriter<File>> {
    /// Create (or truncate) `path`, creating parent directories as needed.
    pub fn create(path: &Path, delimiter: char) -> Result<Self> {
        ensure_parent(path)?;
        let file = File::create(path).map_err(|e| StandardizeError::io(path, e))?;
        Ok(Self::new(BufWriter::new(file), path, delimiter))
    }
}

impl<W: Write> TableWriter<W> {
    pub fn new(out: W, path: &Path, delimiter: char) -> Self {
        Self {
            out,
            path: path.to_path_buf(),
            delimiter,
            rows: 0,
        }
    }

    pub fn write_row<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<()> {
        let mut line = String::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                line.push(self.delimiter);
            }
            line.push_str(field.as_ref());
        }
        line.push('\n');
        self.out
            .write_all(line.as_bytes())
            .map_err(|e| StandardizeError::io(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far, header included.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(mut self) -> Result<W> {
        self.out
            .flush()
            .map_err(|e| StandardizeError::io(&self.path, e))?;
        Ok(self.out)
    }
}

fn ensure_parent(path: &Path) -> Result<PathBuf> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| StandardizeError::io(&parent, e))?;
    Ok(parent)
}

/// Write a whole table through a temporary file in the destination
/// directory, then move it into place.
pub fn write_atomically<F>(path: &Path, delimiter: char, fill: F) -> Result<()>
where
    F: FnOnce(&mut TableWriter<BufWriter<&File>>) -> Result<()>,
{
    let parent = ensure_parent(path)?;
    let temp_file = NamedTempFile::new_in(&parent).map_err(|e| StandardizeError::io(&parent, e))?;
    {
        let mut writer = TableWriter::new(BufWriter::new(temp_file.as_file()), path, delimiter);
        fill(&mut writer)?;
        writer.finish()?;
    }
    temp_file
        .persist(path)
        .map_err(|e| StandardizeError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_rows_with_delimiter() {
        let mut writer = TableWriter::new(Vec::new(), Path::new("mem"), '\t');
        writer.write_row(&["a", "b", "c"]).unwrap();
        writer.write_row(&[String::from("x")]).unwrap();
        assert_eq!(writer.rows(), 2);
        let bytes = writer.finish().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "a\tb\tc\nx\n");
    }

    #[test]
    fn test_create_makes_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/out.tsv");
        let mut writer = TableWriter::create(&path, ',').unwrap();
        writer.write_row(&["1", "2"]).unwrap();
        writer.finish().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1,2\n");
    }

    #[test]
    fn test_write_atomically_replaces_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.tsv");
        fs::write(&path, "stale\n").unwrap();
        write_atomically(&path, '\t', |w| w.write_row(&["label", "script"])).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "label\tscript\n");
    }
}
