use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use optwps::output::OutputOptions;
use optwps::{run_wps, WpsJob};
use optwps_core::{ChromSet, WpsConfig};

/// Window Protection Score per position from a paired-end cfDNA BAM.
#[derive(Parser, Debug)]
#[command(name = "optwps", version, about)]
struct Args {
    /// Input BAM file (indexed)
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// Output path; `.gz`/`.bgz` is BGZF-compressed. Defaults to stdout
    #[arg(short = 'o', long)]
    outfile: Option<PathBuf>,

    /// BED or transcript file with regions of interest (default: whole genome)
    #[arg(short = 'r', long)]
    regions: Option<PathBuf>,

    /// Protection window in bp
    #[arg(short = 'w', long, default_value_t = 120)]
    protection: u32,

    /// Minimum insert size to use (inclusive)
    #[arg(long)]
    min_insert_size: Option<u64>,

    /// Maximum insert size to use (inclusive)
    #[arg(long)]
    max_insert_size: Option<u64>,

    /// Fraction of fragments to keep, in (0, 1]
    #[arg(long)]
    downsample: Option<f64>,

    /// Seed for down-sampling
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Positions per processing chunk
    #[arg(long, default_value_t = 1_000_000)]
    chunk_size: u64,

    /// Comma-separated chromosomes (e.g. 1,2,X) or `canonical` for 1-22,X,Y
    #[arg(long)]
    valid_chroms: Option<ChromSet>,

    /// Also write spanning and endpoint counts
    #[arg(long)]
    verbose_output: bool,

    /// Worker threads
    #[arg(short = 't', long, default_value_t = 1)]
    threads: usize,

    /// Longest fragment considered when --max-insert-size is not set
    #[arg(long, default_value_t = 1000)]
    max_fragment_span: u64,

    /// Keep reads with soft-clipped alignments
    #[arg(long)]
    keep_soft_clipped: bool,

    /// Drop unpaired reads instead of using their alignment length
    #[arg(long)]
    no_single_end_fallback: bool,

    /// Minimum mapping quality
    #[arg(long, default_value_t = 0)]
    min_mapq: u8,

    /// Library size; adds a WPS-per-million-fragments column
    #[arg(long)]
    total_fragments: Option<u64>,

    /// Only log warnings and hide the progress bar
    #[arg(short = 'q', long)]
    quiet: bool,
}

impl Args {
    fn into_job(self) -> WpsJob {
        let config = WpsConfig {
            protection_size: self.protection,
            min_insert_size: self.min_insert_size,
            max_insert_size: self.max_insert_size,
            max_fragment_span: self.max_fragment_span,
            downsample_ratio: self.downsample,
            seed: self.seed,
            chunk_size: self.chunk_size,
            valid_chroms: self.valid_chroms,
            exclude_soft_clipped: !self.keep_soft_clipped,
            single_end_fallback: !self.no_single_end_fallback,
            threads: self.threads,
        };
        WpsJob {
            input: self.input,
            output: self.outfile,
            regions: self.regions,
            config,
            output_options: OutputOptions { verbose: self.verbose_output, total_fragments: self.total_fragments },
            min_mapq: self.min_mapq,
            silent: self.quiet,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        warn!("Interrupt received; stopping after the current chunk");
        handler_stop.store(true, Ordering::Relaxed);
    })
    .context("Failed to install interrupt handler")?;

    let job = args.into_job();
    let summary = run_wps(&job, Some(stop)).context("optwps failed")?;
    if summary.cancelled {
        bail!("interrupted after {} positions; output covers completed chunks only", summary.positions);
    }
    info!("Done: {} positions, {} fragments used", summary.positions, summary.filter.accepted);
    Ok(())
}
