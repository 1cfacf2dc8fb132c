//! Errors raised by the standardization pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::script::ScriptLabel;

#[derive(Debug, Error)]
pub enum StandardizeError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed alias cache row {line} in {path:?}: {reason}")]
    MalformedCacheRow {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Malformed scripts row {line} in {path:?}: {reason}")]
    MalformedScriptsRow {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Unknown script name: {0}")]
    UnknownScript(String),

    /// A label was looked up that never went through the distinct-value pass.
    #[error("Label missing from alias cache: {0:?}")]
    CacheMiss(String),

    /// The same label was classified differently by two shards.
    #[error("Conflicting classifications for {label:?}: {first} vs {second}")]
    ClassificationConflict {
        label: String,
        first: ScriptLabel,
        second: ScriptLabel,
    },

    /// A record's language has no profile at filter time.
    #[error("No script profile for language {0:?}")]
    MissingProfile(String),

    #[error(
        "Row accounting mismatch: {input} input rows, {kept} kept + {filtered} filtered + {rejected} rejected"
    )]
    ConservationViolated {
        input: usize,
        kept: usize,
        filtered: usize,
        rejected: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StandardizeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StandardizeError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StandardizeError>;
