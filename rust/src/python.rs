//! Python bindings

use std::path::PathBuf;

use optwps_core::ChromSet;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::output::OutputOptions;
use crate::pipeline::{run_wps, WpsJob};

/// Compute WPS for `bam_path` and write the table; returns the number of rows.
#[pyfunction]
#[pyo3(signature = (
    bam_path,
    output=None,
    regions=None,
    protection_size=120,
    min_insert_size=None,
    max_insert_size=None,
    downsample=None,
    seed=0,
    chunk_size=1_000_000,
    valid_chroms=None,
    verbose_output=false,
    threads=1,
    min_mapq=0,
    total_fragments=None,
    max_fragment_span=1000,
    keep_soft_clipped=false,
    single_end_fallback=true,
    silent=true
))]
#[allow(clippy::too_many_arguments)]
pub fn calculate_wps(
    py: Python<'_>,
    bam_path: PathBuf,
    output: Option<PathBuf>,
    regions: Option<PathBuf>,
    protection_size: u32,
    min_insert_size: Option<u64>,
    max_insert_size: Option<u64>,
    downsample: Option<f64>,
    seed: u64,
    chunk_size: u64,
    valid_chroms: Option<String>,
    verbose_output: bool,
    threads: usize,
    min_mapq: u8,
    total_fragments: Option<u64>,
    max_fragment_span: u64,
    keep_soft_clipped: bool,
    single_end_fallback: bool,
    silent: bool,
) -> PyResult<u64> {
    let mut job = WpsJob::new(bam_path).read_policy(max_fragment_span, keep_soft_clipped, single_end_fallback);
    job.output = output;
    job.regions = regions;
    job.min_mapq = min_mapq;
    job.silent = silent;
    job.output_options = OutputOptions { verbose: verbose_output, total_fragments };
    job.config.protection_size = protection_size;
    job.config.min_insert_size = min_insert_size;
    job.config.max_insert_size = max_insert_size;
    job.config.downsample_ratio = downsample;
    job.config.seed = seed;
    job.config.chunk_size = chunk_size;
    job.config.threads = threads;
    job.config.valid_chroms = valid_chroms
        .map(|s| s.parse::<ChromSet>())
        .transpose()
        .map_err(|e| PyValueError::new_err(e.to_string()))?;

    let summary = py
        .allow_threads(|| run_wps(&job, None))
        .map_err(|e| PyRuntimeError::new_err(format!("{:#}", e)))?;
    Ok(summary.positions)
}

/// Python module initialization
#[pymodule]
fn optwps(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(calculate_wps, m)?)?;

    #[pyfn(m)]
    fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    Ok(())
}
