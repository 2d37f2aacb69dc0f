//! Fragment definition consumed by the engine
//!
//! A fragment is built by the alignment reader from one read (single-end) or
//! from the leftmost mate of a pair. Coordinates are 0-based, end exclusive.

use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub chrom: Arc<str>,
    pub start: u64,
    pub end: u64,
    /// Signed template length as reported by the aligner (0 for single reads)
    pub insert_size: i64,
    pub paired: bool,
    pub reverse: bool,
    pub soft_clipped: bool,
    /// False for unmapped, duplicate, QC-fail or otherwise unusable records
    pub valid: bool,
    /// Hash of the template name, used as a stable down-sampling key
    pub name_hash: u64,
}

impl Fragment {
    /// Valid, unclipped single-end fragment covering `[start, end)`.
    pub fn new(chrom: Arc<str>, start: u64, end: u64) -> Self {
        Self {
            chrom,
            start,
            end,
            insert_size: 0,
            paired: false,
            reverse: false,
            soft_clipped: false,
            valid: true,
            name_hash: 0,
        }
    }

    /// Valid pair fragment `[start, start + |tlen|)`.
    pub fn paired(chrom: Arc<str>, start: u64, insert_size: i64) -> Self {
        let mut frag = Self::new(chrom, start, start + insert_size.unsigned_abs());
        frag.insert_size = insert_size;
        frag.paired = true;
        frag
    }

    pub fn with_name_hash(mut self, name_hash: u64) -> Self {
        self.name_hash = name_hash;
        self
    }

    /// Reference span covered by the fragment.
    pub fn span(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Insert size used for length filtering.
    ///
    /// Pairs report `|tlen|`. Single reads fall back to their reference
    /// alignment length when `single_end_fallback` is set, otherwise they
    /// have no usable length.
    pub fn length(&self, single_end_fallback: bool) -> Option<u64> {
        if self.paired {
            Some(self.insert_size.unsigned_abs())
        } else if single_end_fallback {
            Some(self.span())
        } else {
            None
        }
    }
}

/// FNV-1a over a template name. Stable across runs and platforms.
pub fn hash_name(name: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in name {
        h ^= b as u64;
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}
