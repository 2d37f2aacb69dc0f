//! Window Protection Score accumulation (difference arrays)
//!
//! For a centre `p` the protection window is the closed interval
//! `[p - hw, p + hw]` with `hw = protection_size / 2`.
//!
//! - spanning(p): fragments `[s, e)` containing the whole window, i.e.
//!   `p` in `[s + hw, e - hw)`
//! - endpoint(p): fragment ends inside the window, each end counted on its
//!   own: the start `s` for `p` in `[s - hw, s + hw]`, the last base `e - 1`
//!   for `p` in `[e - 1 - hw, e - 1 + hw]`. A fragment shorter than the
//!   window can contribute 2 at one centre.
//! - WPS(p) = spanning(p) - endpoint(p)
//!
//! Each fragment touches a constant number of difference-array cells, and a
//! prefix sum at the end yields all counts, so a chunk costs
//! O(fragments + width).

use std::ops::Range;

/// One scored position. `position` is 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WpsPoint {
    pub position: u64,
    pub spanning: u32,
    pub endpoint: u32,
    pub wps: i64,
}

/// Counts for every position of a chunk core, in position order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkScores {
    pub start: u64,
    pub spanning: Vec<u32>,
    pub endpoint: Vec<u32>,
}

impl ChunkScores {
    pub fn len(&self) -> usize {
        self.spanning.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spanning.is_empty()
    }

    pub fn wps(&self, i: usize) -> i64 {
        self.spanning[i] as i64 - self.endpoint[i] as i64
    }

    pub fn point(&self, i: usize) -> WpsPoint {
        WpsPoint {
            position: self.start + i as u64,
            spanning: self.spanning[i],
            endpoint: self.endpoint[i],
            wps: self.wps(i),
        }
    }

    pub fn points(&self) -> impl Iterator<Item = WpsPoint> + '_ {
        (0..self.len()).map(move |i| self.point(i))
    }
}

/// Reusable per-chunk accumulator. Buffers keep their capacity across
/// `reset` calls, so a worker allocates once per run.
#[derive(Debug, Clone)]
pub struct WindowAccumulator {
    half_width: i64,
    core_start: u64,
    // Size = width + 1 so a range ending at the core end has a cell to close in
    spanning: Vec<i64>,
    endpoint: Vec<i64>,
    fragments: u64,
}

impl WindowAccumulator {
    pub fn new(half_width: u64) -> Self {
        Self {
            half_width: half_width as i64,
            core_start: 0,
            spanning: vec![0],
            endpoint: vec![0],
            fragments: 0,
        }
    }

    /// Prepare for a new core range, zeroing all counters.
    pub fn reset(&mut self, core: Range<u64>) {
        let width = (core.end - core.start) as usize;
        self.core_start = core.start;
        self.spanning.clear();
        self.spanning.resize(width + 1, 0);
        self.endpoint.clear();
        self.endpoint.resize(width + 1, 0);
        self.fragments = 0;
    }

    pub fn width(&self) -> usize {
        self.spanning.len() - 1
    }

    /// Fragments added since the last reset.
    pub fn fragments(&self) -> u64 {
        self.fragments
    }

    // Add val to [start, end), relative to the core start
    fn add_range(diff: &mut [i64], start: i64, end: i64, val: i64) {
        let len = diff.len() as i64 - 1;
        let s = start.clamp(0, len) as usize;
        let e = end.clamp(0, len) as usize;
        if s < e {
            diff[s] += val;
            diff[e] -= val;
        }
    }

    /// Account one fragment covering `[start, end)`.
    pub fn add(&mut self, start: u64, end: u64) {
        if end <= start {
            return;
        }
        let s = start as i64 - self.core_start as i64;
        let e = end as i64 - self.core_start as i64;
        let hw = self.half_width;

        Self::add_range(&mut self.endpoint, s - hw, s + hw + 1, 1);
        Self::add_range(&mut self.endpoint, e - 1 - hw, e + hw, 1);
        let (span_lo, span_hi) = (s + hw, e - hw);
        if span_lo < span_hi {
            Self::add_range(&mut self.spanning, span_lo, span_hi, 1);
        }
        self.fragments += 1;
    }

    /// Integrate the difference arrays into per-position counts.
    pub fn scores(&self) -> ChunkScores {
        let width = self.width();
        let mut spanning = Vec::with_capacity(width);
        let mut endpoint = Vec::with_capacity(width);
        let (mut span_acc, mut end_acc) = (0i64, 0i64);
        for i in 0..width {
            span_acc += self.spanning[i];
            end_acc += self.endpoint[i];
            debug_assert!(span_acc >= 0 && end_acc >= 0);
            spanning.push(span_acc as u32);
            endpoint.push(end_acc as u32);
        }
        ChunkScores { start: self.core_start, spanning, endpoint }
    }
}
