//! Python bindings, built with the `python` feature.

use std::collections::HashMap;
use std::path::PathBuf;

use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::config::{PipelineConfig, StrategyKind, parse_delimiter};
use crate::error::StandardizeError;
use crate::script::classify;
use crate::workers::WorkerPool;
use crate::AliasScriptCache;

fn to_py_err(err: StandardizeError) -> PyErr {
    match err {
        StandardizeError::Io { .. } => PyIOError::new_err(err.to_string()),
        StandardizeError::InvalidConfig(_) | StandardizeError::UnknownScript(_) => {
            PyValueError::new_err(err.to_string())
        }
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

/// Script name of a single label
#[pyfunction]
fn classify_label(label: String) -> PyResult<String> {
    Ok(classify(&label).name().to_string())
}

/// Classify many labels, each distinct value once
/// Returns: dict of label -> script name
#[pyfunction]
#[pyo3(signature = (labels, workers = 4))]
fn classify_labels(labels: Vec<String>, workers: usize) -> PyResult<HashMap<String, String>> {
    let pool = WorkerPool::new(workers).map_err(to_py_err)?;
    let cache = AliasScriptCache::build(labels.iter().cloned(), &pool).map_err(to_py_err)?;
    labels
        .into_iter()
        .map(|label| {
            let script = cache.get(&label).map_err(to_py_err)?;
            Ok((label, script.name().to_string()))
        })
        .collect()
}

/// Run the full pipeline over a delimited file
/// Returns: (kept, filtered, rejected)
#[pyfunction]
#[pyo3(signature = (
    input_path,
    output_path,
    strategy = "baseline",
    threshold = 0.05,
    workers = 4,
    filtered_path = None,
    entropy_path = None,
    reuse_cache = false,
    delimiter = "\t",
))]
#[allow(clippy::too_many_arguments)]
fn run_pipeline(
    input_path: String,
    output_path: String,
    strategy: &str,
    threshold: f64,
    workers: usize,
    filtered_path: Option<String>,
    entropy_path: Option<String>,
    reuse_cache: bool,
    delimiter: &str,
) -> PyResult<(usize, usize, usize)> {
    use clap::ValueEnum;

    let strategy = StrategyKind::from_str(strategy, true)
        .map_err(|e| PyValueError::new_err(format!("Unknown strategy {}: {}", strategy, e)))?;
    let delimiter = parse_delimiter(delimiter)
        .ok_or_else(|| PyValueError::new_err(format!("Bad delimiter {:?}", delimiter)))?;

    let config = PipelineConfig {
        filtered_output: filtered_path.map(PathBuf::from),
        entropy_report: entropy_path.map(PathBuf::from),
        reuse_cache,
        strategy,
        threshold,
        workers,
        delimiter,
        ..PipelineConfig::new(input_path, output_path)
    };
    let summary = crate::pipeline::run(&config).map_err(to_py_err)?;
    Ok((summary.kept, summary.filtered, summary.rejected))
}

#[pymodule]
fn script_standardize(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(classify_label, m)?)?;
    m.add_function(wrap_pyfunction!(classify_labels, m)?)?;
    m.add_function(wrap_pyfunction!(run_pipeline, m)?)?;
    Ok(())
}
