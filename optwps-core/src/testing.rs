//! In-memory source and sink for engine tests

use std::sync::Arc;

use crate::accumulator::{ChunkScores, WpsPoint};
use crate::engine::{FragmentIter, FragmentSource, SourceOpener, WpsSink};
use crate::error::{Result, WpsError};
use crate::fragment::Fragment;
use crate::region::Reference;

/// Fragments sorted by start, shared by every opened source.
#[derive(Debug, Clone)]
pub(crate) struct MemoryOpener {
    references: Vec<Reference>,
    fragments: Arc<Vec<Fragment>>,
    skips: Arc<Vec<u64>>,
    failing: bool,
}

impl MemoryOpener {
    pub(crate) fn new(references: Vec<Reference>, mut fragments: Vec<Fragment>) -> Self {
        fragments.sort_by_key(|f| f.start);
        Self { references, fragments: Arc::new(fragments), skips: Arc::new(Vec::new()), failing: false }
    }

    /// Emit an unreadable record at each of `positions` (on every chromosome).
    pub(crate) fn with_skips(mut self, positions: Vec<u64>) -> Self {
        self.skips = Arc::new(positions);
        self
    }

    /// Every fetch fails with an input error.
    pub(crate) fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
}

impl SourceOpener for MemoryOpener {
    type Source = MemorySource;

    fn open(&self) -> Result<MemorySource> {
        Ok(MemorySource { opener: self.clone() })
    }
}

pub(crate) struct MemorySource {
    opener: MemoryOpener,
}

impl FragmentSource for MemorySource {
    fn references(&self) -> Vec<Reference> {
        self.opener.references.clone()
    }

    fn fetch(&mut self, chrom: &str, start: u64, end: u64) -> Result<FragmentIter<'_>> {
        if self.opener.failing {
            return Err(WpsError::input("memory.bam", "simulated read failure"));
        }
        let chrom = chrom.to_string();
        let skips = self
            .opener
            .skips
            .iter()
            .filter(move |&&p| p >= start && p < end)
            .map(|&p| Err::<Fragment, _>(WpsError::skipped_at(p, "insert size is 0")));
        let fragments = self
            .opener
            .fragments
            .iter()
            .filter(move |f| *f.chrom == *chrom && f.start < end && f.end > start)
            .cloned()
            .map(Ok);
        Ok(Box::new(skips.chain(fragments)))
    }
}

#[derive(Debug, Default)]
pub(crate) struct VecSink {
    pub(crate) rows: Vec<(String, WpsPoint)>,
    pub(crate) finished: bool,
}

impl WpsSink for VecSink {
    fn write_chunk(&mut self, chrom: &str, scores: &ChunkScores) -> Result<()> {
        self.rows.extend(scores.points().map(|p| (chrom.to_string(), p)));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
