//! Chunk planning
//!
//! A region is cut into contiguous cores of `chunk_size` bases. Each core is
//! fetched with `pad` extra bases on both sides (clipped to the reference) so
//! that every fragment touching a core position's window is seen.

use std::ops::Range;

use crate::region::Region;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chrom: String,
    /// Positions scored by this chunk
    pub core: Range<u64>,
    /// Interval handed to the alignment reader
    pub fetch: Range<u64>,
    /// Position of this chunk within its region
    pub index: usize,
}

impl Chunk {
    pub fn width(&self) -> u64 {
        self.core.end - self.core.start
    }
}

/// Restartable iterator over the chunks of one region.
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    chrom: String,
    next_start: u64,
    end: u64,
    chunk_size: u64,
    pad: u64,
    reference_length: u64,
    index: usize,
}

impl ChunkPlanner {
    pub fn new(region: &Region, chunk_size: u64, pad: u64, reference_length: u64) -> Self {
        debug_assert!(chunk_size > 0, "chunk size must be > 0");
        debug_assert!(region.end <= reference_length, "region must lie on the reference");
        Self {
            chrom: region.chrom.clone(),
            next_start: region.start,
            end: region.end,
            chunk_size,
            pad,
            reference_length,
            index: 0,
        }
    }

    /// Number of chunks the region splits into.
    pub fn chunk_count(region: &Region, chunk_size: u64) -> usize {
        region.len().div_ceil(chunk_size) as usize
    }
}

impl Iterator for ChunkPlanner {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next_start >= self.end {
            return None;
        }
        let start = self.next_start;
        let end = (start + self.chunk_size).min(self.end);
        self.next_start = end;

        let chunk = Chunk {
            chrom: self.chrom.clone(),
            core: start..end,
            fetch: start.saturating_sub(self.pad)..(end + self.pad).min(self.reference_length),
            index: self.index,
        };
        self.index += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.end.saturating_sub(self.next_start)).div_ceil(self.chunk_size) as usize;
        (n, Some(n))
    }
}
