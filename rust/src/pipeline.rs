//! WPS run orchestration
//!
//! Wires the BAM reader, region file, TSV writer and progress bar around the
//! core engine. Entry point: `run_wps()`, shared by the binary and the
//! Python binding.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use optwps_core::{RunSummary, WpsConfig, WpsEngine};

use crate::bam::BamOpener;
use crate::bed::read_regions;
use crate::output::{OutputOptions, TsvSink};
use crate::progress::ChunkProgress;

/// Everything one WPS run needs besides the engine configuration.
#[derive(Debug, Clone)]
pub struct WpsJob {
    pub input: PathBuf,
    /// `None` writes to stdout
    pub output: Option<PathBuf>,
    /// `None` covers the whole genome
    pub regions: Option<PathBuf>,
    pub config: WpsConfig,
    pub output_options: OutputOptions,
    pub min_mapq: u8,
    pub silent: bool,
}

impl WpsJob {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: None,
            regions: None,
            config: WpsConfig::default(),
            output_options: OutputOptions::default(),
            min_mapq: 0,
            silent: false,
        }
    }

    /// Span cap and read policies, as exposed by the CLI and Python surfaces.
    pub fn read_policy(mut self, max_fragment_span: u64, keep_soft_clipped: bool, single_end_fallback: bool) -> Self {
        self.config.max_fragment_span = max_fragment_span;
        self.config.exclude_soft_clipped = !keep_soft_clipped;
        self.config.single_end_fallback = single_end_fallback;
        self
    }
}

/// Run a job to completion or until `stop` is set.
pub fn run_wps(job: &WpsJob, stop: Option<Arc<AtomicBool>>) -> Result<RunSummary> {
    let mut engine = WpsEngine::new(job.config.clone()).context("Invalid WPS configuration")?;
    if let Some(path) = &job.regions {
        let regions = read_regions(path).with_context(|| format!("Failed to load regions from {:?}", path))?;
        engine = engine.with_regions(regions);
    }
    if let Some(stop) = stop {
        engine.set_stop_handle(stop);
    }

    // Open the BAM and resolve regions before the output is created or truncated
    let opener = BamOpener::new(&job.input, job.min_mapq);
    let prepared = engine
        .prepare(&opener)
        .with_context(|| format!("Failed to prepare WPS run for {:?}", job.input))?;
    let mut sink = TsvSink::create(job.output.as_deref(), job.output_options)?;
    let progress = ChunkProgress::new(job.silent);

    info!("Computing WPS for {:?}", job.input);
    let summary = engine
        .execute(prepared, &mut sink, &progress)
        .with_context(|| format!("WPS failed for {:?}", job.input))?;
    progress.finish();
    Ok(summary)
}
