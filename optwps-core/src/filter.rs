//! Fragment filtering
//!
//! Pure predicate layer between the alignment reader and the accumulator.
//! Decisions depend only on the fragment and the run configuration; the
//! down-sampling draw comes from a generator seeded per fragment, so a
//! fragment fetched by two neighbouring chunks gets the same answer twice.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{ChromSet, WpsConfig};
use crate::fragment::Fragment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    Invalid,
    Chromosome,
    SoftClipped,
    NoLength,
    TooShort,
    TooLong,
    Downsampled,
}

impl RejectReason {
    pub const ALL: [RejectReason; 7] = [
        RejectReason::Invalid,
        RejectReason::Chromosome,
        RejectReason::SoftClipped,
        RejectReason::NoLength,
        RejectReason::TooShort,
        RejectReason::TooLong,
        RejectReason::Downsampled,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::Invalid => "invalid",
            RejectReason::Chromosome => "chromosome",
            RejectReason::SoftClipped => "soft-clipped",
            RejectReason::NoLength => "no-length",
            RejectReason::TooShort => "too-short",
            RejectReason::TooLong => "too-long",
            RejectReason::Downsampled => "downsampled",
        };
        f.write_str(s)
    }
}

/// Per-fragment Bernoulli retention with a reproducible draw.
#[derive(Debug, Clone)]
pub struct Downsampler {
    ratio: f64,
    seed: u64,
}

impl Downsampler {
    pub fn new(ratio: f64, seed: u64) -> Self {
        Self { ratio, seed }
    }

    /// Generator for one fragment: seeded from the run seed and the
    /// fragment's identity (template name, start, end).
    pub fn rng_for(&self, fragment: &Fragment) -> StdRng {
        let mut key = splitmix64(self.seed ^ fragment.name_hash);
        key = splitmix64(key ^ fragment.start);
        key = splitmix64(key ^ fragment.end.rotate_left(32));
        StdRng::seed_from_u64(key)
    }

    pub fn keep(&self, fragment: &Fragment) -> bool {
        if self.ratio >= 1.0 {
            return true;
        }
        self.rng_for(fragment).gen_bool(self.ratio)
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[derive(Debug, Clone)]
pub struct FragmentFilter {
    valid_chroms: Option<ChromSet>,
    min_insert_size: Option<u64>,
    max_insert_size: Option<u64>,
    max_span: u64,
    exclude_soft_clipped: bool,
    single_end_fallback: bool,
    downsampler: Option<Downsampler>,
}

impl FragmentFilter {
    pub fn new(config: &WpsConfig) -> Self {
        Self {
            valid_chroms: config.valid_chroms.clone(),
            min_insert_size: config.min_insert_size,
            max_insert_size: config.max_insert_size,
            max_span: config.effective_max_span(),
            exclude_soft_clipped: config.exclude_soft_clipped,
            single_end_fallback: config.single_end_fallback,
            downsampler: config.downsample_ratio.map(|r| Downsampler::new(r, config.seed)),
        }
    }

    /// Why a fragment is excluded, or `Ok(())` when it is kept.
    pub fn check(&self, fragment: &Fragment) -> Result<(), RejectReason> {
        if !fragment.valid {
            return Err(RejectReason::Invalid);
        }
        if let Some(chroms) = &self.valid_chroms {
            if !chroms.contains(&fragment.chrom) {
                return Err(RejectReason::Chromosome);
            }
        }
        if self.exclude_soft_clipped && fragment.soft_clipped {
            return Err(RejectReason::SoftClipped);
        }
        let length = fragment.length(self.single_end_fallback).ok_or(RejectReason::NoLength)?;
        if let Some(min) = self.min_insert_size {
            if length < min {
                return Err(RejectReason::TooShort);
            }
        }
        if let Some(max) = self.max_insert_size {
            if length > max {
                return Err(RejectReason::TooLong);
            }
        }
        // Padding only guarantees fragments up to the effective span.
        if fragment.span() > self.max_span {
            return Err(RejectReason::TooLong);
        }
        if let Some(ds) = &self.downsampler {
            if !ds.keep(fragment) {
                return Err(RejectReason::Downsampled);
            }
        }
        Ok(())
    }

    pub fn accept(&self, fragment: &Fragment) -> bool {
        self.check(fragment).is_ok()
    }
}

/// Accepted/rejected tallies, merged across chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub accepted: u64,
    rejected: [u64; 7],
}

impl FilterStats {
    pub fn record(&mut self, outcome: Result<(), RejectReason>) {
        match outcome {
            Ok(()) => self.accepted += 1,
            Err(reason) => self.rejected[reason.index()] += 1,
        }
    }

    pub fn rejected(&self, reason: RejectReason) -> u64 {
        self.rejected[reason.index()]
    }

    pub fn total_rejected(&self) -> u64 {
        self.rejected.iter().sum()
    }

    pub fn merge(&mut self, other: &FilterStats) {
        self.accepted += other.accepted;
        for (a, b) in self.rejected.iter_mut().zip(other.rejected.iter()) {
            *a += *b;
        }
    }
}
