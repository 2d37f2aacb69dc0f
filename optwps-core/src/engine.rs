//! WPS orchestration
//!
//! INIT -> REGION_LOOP -> CHUNK_LOOP -> DONE, with ERROR reachable from any
//! state. For every region the engine plans chunks, fetches the padded
//! interval from the alignment source, filters fragments, accumulates, and
//! streams the core range to the sink in position order.
//!
//! With `threads > 1`, chunks of a region are scored in batches on a
//! dedicated rayon pool. Every worker owns its own reader and accumulator;
//! batch results are written in chunk order, so output does not depend on
//! the thread count.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::accumulator::{ChunkScores, WindowAccumulator};
use crate::chunk::{Chunk, ChunkPlanner};
use crate::config::WpsConfig;
use crate::error::{Result, WpsError};
use crate::filter::{FilterStats, FragmentFilter, RejectReason};
use crate::fragment::Fragment;
use crate::region::{Reference, Region, RegionSource};

/// Skip warnings printed before switching to a summary at the end.
const MAX_SKIP_WARNINGS: u64 = 5;

pub type FragmentIter<'a> = Box<dyn Iterator<Item = Result<Fragment>> + 'a>;

/// Alignment reader as seen by the engine.
pub trait FragmentSource {
    /// Reference names and lengths, in header order.
    fn references(&self) -> Vec<Reference>;

    /// Every fragment overlapping `[start, end)` on `chrom`.
    ///
    /// Items that cannot be interpreted are yielded as
    /// `WpsError::RecordSkipped`; any other error aborts the run.
    fn fetch(&mut self, chrom: &str, start: u64, end: u64) -> Result<FragmentIter<'_>>;
}

/// Opens independent readers over the same alignment input, one per worker.
pub trait SourceOpener: Sync {
    type Source: FragmentSource + Send;

    fn open(&self) -> Result<Self::Source>;
}

/// Receives scored chunks in genomic order.
pub trait WpsSink {
    fn write_chunk(&mut self, chrom: &str, scores: &ChunkScores) -> Result<()>;

    /// Flush and close. Called once, after the last chunk.
    fn finish(&mut self) -> Result<()>;
}

/// Progress callbacks; both default to no-ops.
pub trait ChunkObserver: Sync {
    fn planned(&self, _regions: usize, _chunks: u64) {}
    fn chunk_done(&self, _chunk: &Chunk) {}
}

impl ChunkObserver for () {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Init,
    RegionLoop,
    ChunkLoop,
    Done,
    Error,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub regions: usize,
    pub chunks: u64,
    pub positions: u64,
    /// Fragments whose start lies in a scored position
    pub filter: FilterStats,
    pub skipped: u64,
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct ChunkOutput {
    scores: ChunkScores,
    stats: FilterStats,
    skipped: u64,
    skip_reasons: Vec<String>,
}

/// Readers opened and regions resolved by [`WpsEngine::prepare`].
pub struct PreparedRun<S> {
    sources: Vec<S>,
    regions: RegionSource,
    pool: Option<rayon::ThreadPool>,
}

impl<S> PreparedRun<S> {
    pub fn regions(&self) -> &RegionSource {
        &self.regions
    }
}

pub struct WpsEngine {
    config: WpsConfig,
    filter: FragmentFilter,
    regions: Option<Vec<Region>>,
    stop: Arc<AtomicBool>,
    state: EngineState,
}

impl WpsEngine {
    /// Whole-genome engine; fails on invalid configuration.
    pub fn new(config: WpsConfig) -> Result<Self> {
        config.validate()?;
        debug!("WPS config: {:?}", config);
        Ok(Self {
            filter: FragmentFilter::new(&config),
            config,
            regions: None,
            stop: Arc::new(AtomicBool::new(false)),
            state: EngineState::Init,
        })
    }

    /// Restrict the run to parsed regions of interest (kept in given order).
    pub fn with_regions(mut self, regions: Vec<Region>) -> Self {
        self.regions = Some(regions);
        self
    }

    pub fn config(&self) -> &WpsConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Setting the flag stops the run at the next chunk boundary.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Share an externally owned stop flag, e.g. one set by a signal handler.
    pub fn set_stop_handle(&mut self, stop: Arc<AtomicBool>) {
        self.stop = stop;
    }

    /// Prepare and execute in one go.
    pub fn run<O, W>(&mut self, opener: &O, sink: &mut W, observer: &dyn ChunkObserver) -> Result<RunSummary>
    where
        O: SourceOpener,
        W: WpsSink,
    {
        let prepared = self.prepare(opener)?;
        self.execute(prepared, sink, observer)
    }

    /// INIT: open every worker's reader and resolve the regions against the
    /// reference set. Input and configuration errors surface here, before a
    /// sink exists.
    pub fn prepare<O: SourceOpener>(&mut self, opener: &O) -> Result<PreparedRun<O::Source>> {
        self.state = EngineState::Init;
        let result = self.prepare_inner(opener);
        if result.is_err() {
            self.state = EngineState::Error;
        }
        result
    }

    fn prepare_inner<O: SourceOpener>(&self, opener: &O) -> Result<PreparedRun<O::Source>> {
        let threads = self.config.threads;
        let sources = (0..threads).map(|_| opener.open()).collect::<Result<Vec<_>>>()?;
        let references = sources[0].references();
        if references.is_empty() {
            return Err(WpsError::config("alignment file declares no reference sequences"));
        }

        let valid = self.config.valid_chroms.as_ref();
        let regions = match &self.regions {
            Some(parsed) => RegionSource::from_regions(parsed.clone(), &references, valid)?,
            None => RegionSource::whole_genome(&references, valid)?,
        };

        let pool = if threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| WpsError::config(format!("failed to build thread pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };
        Ok(PreparedRun { sources, regions, pool })
    }

    /// REGION_LOOP / CHUNK_LOOP / DONE over a prepared run.
    pub fn execute<S, W>(
        &mut self,
        prepared: PreparedRun<S>,
        sink: &mut W,
        observer: &dyn ChunkObserver,
    ) -> Result<RunSummary>
    where
        S: FragmentSource + Send,
        W: WpsSink,
    {
        let result = self.execute_inner(prepared, sink, observer);
        self.state = if result.is_ok() { EngineState::Done } else { EngineState::Error };
        result
    }

    fn execute_inner<S, W>(
        &mut self,
        prepared: PreparedRun<S>,
        sink: &mut W,
        observer: &dyn ChunkObserver,
    ) -> Result<RunSummary>
    where
        S: FragmentSource + Send,
        W: WpsSink,
    {
        let PreparedRun { mut sources, regions: region_source, pool } = prepared;
        let threads = sources.len();

        let chunk_size = self.config.chunk_size;
        let pad = self.config.chunk_padding();
        let total_chunks: u64 =
            region_source.regions().map(|r| ChunkPlanner::chunk_count(r, chunk_size) as u64).sum();
        info!(
            "WPS: {} regions, {} chunks (chunk size {}, padding {}bp, window {}bp, {} thread(s))",
            region_source.len(),
            total_chunks,
            chunk_size,
            pad,
            self.config.window_width(),
            threads
        );
        observer.planned(region_source.len(), total_chunks);

        let mut accumulators: Vec<WindowAccumulator> =
            (0..threads).map(|_| WindowAccumulator::new(self.config.half_width())).collect();

        let mut summary = RunSummary { regions: region_source.len(), ..Default::default() };

        self.state = EngineState::RegionLoop;
        'regions: for region in region_source.regions() {
            let reference_length = region_source.reference_length(&region.chrom).unwrap_or(region.end);
            let planner = ChunkPlanner::new(region, chunk_size, pad, reference_length);
            debug!("Region {}: {} chunk(s)", region.label(), planner.size_hint().0);

            self.state = EngineState::ChunkLoop;
            let chunks: Vec<Chunk> = planner.collect();
            for batch in chunks.chunks(threads) {
                if self.stop.load(Ordering::Relaxed) {
                    warn!("WPS: stop requested, ending before {}:{}", region.chrom, batch[0].core.start);
                    summary.cancelled = true;
                    break 'regions;
                }

                let outputs: Vec<Result<ChunkOutput>> = match &pool {
                    Some(pool) => {
                        let filter = &self.filter;
                        pool.install(|| {
                            batch
                                .par_iter()
                                .zip(sources.par_iter_mut())
                                .zip(accumulators.par_iter_mut())
                                .map(|((chunk, source), acc)| process_chunk(source, filter, acc, chunk))
                                .collect()
                        })
                    }
                    None => batch
                        .iter()
                        .map(|chunk| process_chunk(&mut sources[0], &self.filter, &mut accumulators[0], chunk))
                        .collect(),
                };

                for (chunk, output) in batch.iter().zip(outputs) {
                    let output = output?;
                    for reason in &output.skip_reasons {
                        if summary.skipped < MAX_SKIP_WARNINGS {
                            warn!("Skipping record on {}: {}", chunk.chrom, reason);
                        }
                        summary.skipped += 1;
                    }
                    summary.skipped += output.skipped - output.skip_reasons.len() as u64;

                    sink.write_chunk(&chunk.chrom, &output.scores)?;
                    summary.positions += output.scores.len() as u64;
                    summary.filter.merge(&output.stats);
                    summary.chunks += 1;
                    observer.chunk_done(chunk);
                }
            }
            self.state = EngineState::RegionLoop;
        }

        sink.finish()?;
        drop(sources);
        log_summary(&summary);
        Ok(summary)
    }
}

/// Fetch, filter and accumulate one chunk.
fn process_chunk<S: FragmentSource>(
    source: &mut S,
    filter: &FragmentFilter,
    acc: &mut WindowAccumulator,
    chunk: &Chunk,
) -> Result<ChunkOutput> {
    acc.reset(chunk.core.clone());
    let mut out = ChunkOutput::default();

    for item in source.fetch(&chunk.chrom, chunk.fetch.start, chunk.fetch.end)? {
        let fragment = match item {
            Ok(fragment) => fragment,
            Err(WpsError::RecordSkipped { position, reason }) => {
                // Neighbouring fetches overlap; count each record in one chunk only
                if position.map_or(true, |p| chunk.core.contains(&p)) {
                    out.skipped += 1;
                    if (out.skip_reasons.len() as u64) < MAX_SKIP_WARNINGS {
                        out.skip_reasons.push(reason);
                    }
                }
                continue;
            }
            Err(e) => return Err(e),
        };

        let outcome = filter.check(&fragment);
        if chunk.core.contains(&fragment.start) {
            out.stats.record(outcome);
        }
        if outcome.is_ok() {
            acc.add(fragment.start, fragment.end);
        }
    }

    out.scores = acc.scores();
    Ok(out)
}

fn log_summary(summary: &RunSummary) {
    info!(
        "WPS: wrote {} positions from {} regions ({} chunks)",
        summary.positions, summary.regions, summary.chunks
    );
    info!(
        "WPS: {} fragments used, {} rejected",
        summary.filter.accepted,
        summary.filter.total_rejected()
    );
    for reason in RejectReason::ALL {
        let n = summary.filter.rejected(reason);
        if n > 0 {
            debug!("  rejected ({}): {}", reason, n);
        }
    }
    if summary.skipped > 0 {
        warn!("WPS: skipped {} records with malformed coordinates", summary.skipped);
    }
    if summary.cancelled {
        warn!("WPS: run stopped early; output covers completed chunks only");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::WpsPoint;
    use crate::config::ChromSet;
    use crate::testing::{MemoryOpener, VecSink};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_fragments(chrom: &str, n: usize, len: u64, seed: u64) -> Vec<Fragment> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                let start = rng.gen_range(0..len - 500);
                let tlen = rng.gen_range(60..450i64);
                Fragment::paired(chrom.into(), start, tlen).with_name_hash(i as u64)
            })
            .collect()
    }

    fn run_with(config: WpsConfig, opener: &MemoryOpener, regions: Option<Vec<Region>>) -> (RunSummary, VecSink) {
        let mut engine = WpsEngine::new(config).unwrap();
        if let Some(r) = regions {
            engine = engine.with_regions(r);
        }
        let mut sink = VecSink::default();
        let summary = engine.run(opener, &mut sink, &()).unwrap();
        assert_eq!(engine.state(), EngineState::Done);
        (summary, sink)
    }

    #[test]
    fn test_output_completeness() {
        let opener = MemoryOpener::new(vec![Reference::new("1", 5_000)], random_fragments("1", 200, 5_000, 1));
        let (summary, sink) = run_with(
            WpsConfig { chunk_size: 300, ..Default::default() },
            &opener,
            Some(vec![Region::new("1", 0, 1_000)]),
        );
        assert_eq!(summary.positions, 1_000);
        assert_eq!(sink.rows.len(), 1_000);
        let positions: Vec<u64> = sink.rows.iter().map(|(_, p)| p.position).collect();
        assert_eq!(positions, (0..1_000).collect::<Vec<u64>>());
        assert!(sink.finished);
    }

    #[test]
    fn test_chunking_invariance() {
        let len = 60_000;
        let frags = random_fragments("1", 3_000, len, 2);
        let opener = MemoryOpener::new(vec![Reference::new("1", len)], frags);
        let reference = run_with(WpsConfig { chunk_size: len, ..Default::default() }, &opener, None).1;
        for chunk_size in [10_000, 777, 61] {
            let (_, sink) = run_with(WpsConfig { chunk_size, ..Default::default() }, &opener, None);
            assert_eq!(sink.rows, reference.rows, "chunk size {} changed the output", chunk_size);
        }
    }

    #[test]
    fn test_chunking_invariance_with_downsampling_and_threads() {
        let len = 40_000;
        let opener = MemoryOpener::new(vec![Reference::new("1", len)], random_fragments("1", 2_000, len, 3));
        let base = WpsConfig { downsample_ratio: Some(0.5), seed: 11, ..Default::default() };
        let whole = run_with(WpsConfig { chunk_size: len, ..base.clone() }, &opener, None).1;
        let pieces = run_with(WpsConfig { chunk_size: 3_000, ..base.clone() }, &opener, None).1;
        let threaded = run_with(WpsConfig { chunk_size: 3_000, threads: 3, ..base.clone() }, &opener, None).1;
        assert_eq!(pieces.rows, whole.rows);
        assert_eq!(threaded.rows, whole.rows);

        let other_seed = run_with(WpsConfig { chunk_size: len, seed: 12, ..base }, &opener, None).1;
        assert_ne!(other_seed.rows, whole.rows);
    }

    #[test]
    fn test_boundary_fragment_scored_on_both_sides() {
        // One fragment straddling the chunk boundary at 1000
        let opener = MemoryOpener::new(
            vec![Reference::new("1", 3_000)],
            vec![Fragment::paired("1".into(), 900, 300)],
        );
        let (summary, sink) = run_with(WpsConfig { chunk_size: 1_000, ..Default::default() }, &opener, None);
        let at = |pos: u64| sink.rows[pos as usize].1;
        assert_eq!(at(999), WpsPoint { position: 999, spanning: 1, endpoint: 0, wps: 1 });
        assert_eq!(at(1_000), WpsPoint { position: 1_000, spanning: 1, endpoint: 0, wps: 1 });
        assert_eq!(at(1_140).endpoint, 1);
        assert_eq!(summary.filter.accepted, 1, "fragment counted once in totals");
    }

    #[test]
    fn test_chromosome_restriction() {
        let refs = vec![Reference::new("1", 2_000), Reference::new("2", 2_000), Reference::new("3", 2_000)];
        let mut frags = random_fragments("1", 50, 2_000, 4);
        frags.extend(random_fragments("3", 50, 2_000, 5));
        let opener = MemoryOpener::new(refs, frags);
        let cfg = WpsConfig { valid_chroms: Some(ChromSet::from_names(["1", "2"])), ..Default::default() };
        let (summary, sink) = run_with(cfg, &opener, None);
        assert_eq!(summary.regions, 2);
        assert!(sink.rows.iter().all(|(c, _)| c == "1" || c == "2"));
        assert_eq!(sink.rows.len(), 4_000);
    }

    #[test]
    fn test_regions_grouped_in_file_order() {
        let refs = vec![Reference::new("1", 5_000), Reference::new("2", 5_000)];
        let opener = MemoryOpener::new(refs, random_fragments("2", 100, 5_000, 6));
        let regions = vec![Region::new("2", 3_000, 3_050), Region::new("1", 10, 20)];
        let (_, sink) = run_with(WpsConfig::default(), &opener, Some(regions));
        assert_eq!(sink.rows.len(), 60);
        assert!(sink.rows[..50].iter().all(|(c, _)| c == "2"));
        assert_eq!(sink.rows[50].1.position, 10);
        for w in sink.rows[..50].windows(2) {
            assert_eq!(w[1].1.position, w[0].1.position + 1);
        }
    }

    #[test]
    fn test_skipped_records_do_not_bias_scores() {
        let refs = vec![Reference::new("1", 2_000)];
        let frags = random_fragments("1", 100, 2_000, 7);
        let clean = run_with(WpsConfig::default(), &MemoryOpener::new(refs.clone(), frags.clone()), None);
        let noisy_opener = MemoryOpener::new(refs, frags).with_skips(vec![500, 1_500]);
        let noisy = run_with(WpsConfig { chunk_size: 1_000, ..Default::default() }, &noisy_opener, None);
        assert_eq!(noisy.1.rows, clean.1.rows);
        assert_eq!(noisy.0.skipped, 2, "each skipped record counted once");
    }

    #[test]
    fn test_fatal_fetch_error_sets_error_state() {
        let opener = MemoryOpener::new(vec![Reference::new("1", 2_000)], vec![]).failing();
        let mut engine = WpsEngine::new(WpsConfig::default()).unwrap();
        let mut sink = VecSink::default();
        let err = engine.run(&opener, &mut sink, &()).unwrap_err();
        assert!(matches!(err, WpsError::Input { .. }), "{}", err);
        assert_eq!(engine.state(), EngineState::Error);
        assert!(!sink.finished);
    }

    #[test]
    fn test_config_error_before_any_output() {
        let opener = MemoryOpener::new(vec![Reference::new("1", 2_000)], vec![]);
        let mut engine = WpsEngine::new(WpsConfig::default()).unwrap().with_regions(vec![Region::new("chrZ", 0, 10)]);
        let mut sink = VecSink::default();
        assert!(matches!(engine.run(&opener, &mut sink, &()), Err(WpsError::Configuration(_))));
        assert!(sink.rows.is_empty());
        assert!(!sink.finished);
    }

    #[test]
    fn test_prepare_resolves_before_any_sink() {
        let opener = MemoryOpener::new(vec![Reference::new("1", 2_000)], random_fragments("1", 20, 2_000, 8));
        let mut engine = WpsEngine::new(WpsConfig::default()).unwrap().with_regions(vec![Region::new("chrZ", 0, 10)]);
        assert!(matches!(engine.prepare(&opener), Err(WpsError::Configuration(_))));
        assert_eq!(engine.state(), EngineState::Error);

        let empty = MemoryOpener::new(vec![Reference::new("1", 2_000)], vec![]);
        let mut engine = WpsEngine::new(WpsConfig::default()).unwrap().with_regions(vec![Region::new("1", 0, 100)]);
        let prepared = engine.prepare(&empty).unwrap();
        assert_eq!(engine.state(), EngineState::Init);
        assert_eq!(prepared.regions().len(), 1);
        let mut sink = VecSink::default();
        let summary = engine.execute(prepared, &mut sink, &()).unwrap();
        assert_eq!(summary.positions, 100);
        assert_eq!(engine.state(), EngineState::Done);
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        assert!(WpsEngine::new(WpsConfig { chunk_size: 0, ..Default::default() }).is_err());
    }

    #[test]
    fn test_stop_before_first_chunk() {
        let opener = MemoryOpener::new(vec![Reference::new("1", 2_000)], vec![]);
        let mut engine = WpsEngine::new(WpsConfig::default()).unwrap();
        engine.stop_handle().store(true, Ordering::Relaxed);
        let mut sink = VecSink::default();
        let summary = engine.run(&opener, &mut sink, &()).unwrap();
        assert!(summary.cancelled);
        assert!(sink.rows.is_empty());
        assert!(sink.finished, "sink is closed on a clean stop");
    }

    #[test]
    fn test_observer_sees_every_chunk() {
        use std::sync::atomic::AtomicU64;

        #[derive(Default)]
        struct Counter {
            planned: AtomicU64,
            done: AtomicU64,
        }
        impl ChunkObserver for Counter {
            fn planned(&self, _regions: usize, chunks: u64) {
                self.planned.store(chunks, Ordering::Relaxed);
            }
            fn chunk_done(&self, _chunk: &Chunk) {
                self.done.fetch_add(1, Ordering::Relaxed);
            }
        }

        let opener = MemoryOpener::new(vec![Reference::new("1", 2_500), Reference::new("2", 900)], vec![]);
        let mut engine = WpsEngine::new(WpsConfig { chunk_size: 1_000, ..Default::default() }).unwrap();
        let counter = Counter::default();
        let summary = engine.run(&opener, &mut VecSink::default(), &counter).unwrap();
        assert_eq!(counter.planned.load(Ordering::Relaxed), 4);
        assert_eq!(counter.done.load(Ordering::Relaxed), 4);
        assert_eq!(summary.chunks, 4);
    }
}
