//! Script standardization for multilingual name corpora.
//!
//! Every name record is classified by the writing system of its label,
//! each language's canonical scripts are voted from the corpus itself, and
//! records written in a non-canonical script are split off into an audit
//! stream. Script entropy per language is reported before and after.

pub mod alias_cache;
pub mod config;
pub mod entropy;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod record;
pub mod script;
pub mod table;
pub mod vote;
pub mod workers;

#[cfg(feature = "python")]
mod python;

pub use alias_cache::AliasScriptCache;
pub use config::{PipelineConfig, StrategyKind};
pub use entropy::{EntropyReport, entropy};
pub use error::{Result, StandardizeError};
pub use filter::{FilterDecision, FilterOutcome};
pub use pipeline::{RunSummary, run};
pub use record::{ColumnLayout, NameRecord};
pub use script::{ScriptLabel, classify};
pub use vote::{CanonicalSet, LanguageScriptProfile, ScriptHistogram, Strategy, aggregate};
pub use workers::WorkerPool;
