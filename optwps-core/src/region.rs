//! Regions of interest
//!
//! `RegionSource` turns either a parsed region list or the reference header
//! into the ordered, validated list of intervals a run will cover.

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::config::{normalize_chrom, ChromSet};
use crate::error::{Result, WpsError};

/// One reference sequence from the alignment header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub length: u64,
}

impl Reference {
    pub fn new(name: impl Into<String>, length: u64) -> Self {
        Self { name: name.into(), length }
    }
}

/// Half-open interval `[start, end)` on `chrom`, 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub name: Option<String>,
    pub strand: Option<char>,
}

impl Region {
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Self {
        Self { chrom: chrom.into(), start, end, name: None, strand: None }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_strand(mut self, strand: char) -> Self {
        self.strand = Some(strand);
        self
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Display label `chrom:start-end` (0-based, half-open).
    pub fn label(&self) -> String {
        format!("{}:{}-{}", self.chrom, self.start, self.end)
    }
}

/// Ordered regions of a run, each resolved against the reference set.
#[derive(Debug, Clone)]
pub struct RegionSource {
    regions: Vec<Region>,
    lengths: HashMap<String, u64>,
}

impl RegionSource {
    /// One region per reference, in header order, restricted to `valid_chroms`.
    pub fn whole_genome(references: &[Reference], valid_chroms: Option<&ChromSet>) -> Result<Self> {
        if let Some(set) = valid_chroms {
            check_requested_chroms(references, set)?;
        }
        let regions: Vec<Region> = references
            .iter()
            .filter(|r| r.length > 0)
            .filter(|r| valid_chroms.map_or(true, |set| set.contains(&r.name)))
            .map(|r| Region::new(r.name.clone(), 0, r.length))
            .collect();
        info!("Whole-genome mode: {} reference sequences", regions.len());
        Ok(Self { regions, lengths: length_map(references) })
    }

    /// Regions from a parsed region file, kept in file order.
    ///
    /// Entries outside `valid_chroms` are dropped. Chromosome names are
    /// resolved against the reference set, toggling a `chr` prefix if needed.
    pub fn from_regions(
        parsed: Vec<Region>,
        references: &[Reference],
        valid_chroms: Option<&ChromSet>,
    ) -> Result<Self> {
        if let Some(set) = valid_chroms {
            check_requested_chroms(references, set)?;
        }
        let lengths = length_map(references);
        let total = parsed.len();
        let mut regions = Vec::with_capacity(total);

        for mut region in parsed {
            if let Some(set) = valid_chroms {
                if !set.contains(&region.chrom) {
                    continue;
                }
            }
            let chrom = resolve_chrom(&region.chrom, &lengths).ok_or_else(|| {
                WpsError::config(format!(
                    "region {} is on chromosome '{}', which is not in the alignment file",
                    region.label(),
                    region.chrom
                ))
            })?;
            let length = lengths[chrom];
            if region.is_empty() {
                return Err(WpsError::config(format!("region {} is empty", region.label())));
            }
            if region.start >= length {
                return Err(WpsError::config(format!(
                    "region {} starts beyond the end of {} ({}bp)",
                    region.label(),
                    chrom,
                    length
                )));
            }
            if region.end > length {
                warn!("Region {} extends past {} ({}bp); clipping", region.label(), chrom, length);
                region.end = length;
            }
            region.chrom = chrom.to_string();
            regions.push(region);
        }

        if regions.len() < total {
            debug!("{} of {} regions outside the valid chromosome set", total - regions.len(), total);
        }
        info!("Loaded {} regions", regions.len());
        Ok(Self { regions, lengths })
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn reference_length(&self, chrom: &str) -> Option<u64> {
        self.lengths.get(chrom).copied()
    }
}

fn length_map(references: &[Reference]) -> HashMap<String, u64> {
    references.iter().map(|r| (r.name.clone(), r.length)).collect()
}

/// Reference name matching `chrom`, trying `chrN` <-> `N` when the exact name is absent.
fn resolve_chrom<'a>(chrom: &str, lengths: &'a HashMap<String, u64>) -> Option<&'a str> {
    let alt = if chrom.starts_with("chr") {
        normalize_chrom(chrom).to_string()
    } else {
        format!("chr{}", chrom)
    };
    lengths
        .get_key_value(chrom)
        .or_else(|| lengths.get_key_value(alt.as_str()))
        .map(|(k, _)| k.as_str())
}

/// An explicit chromosome list must only name references that exist.
fn check_requested_chroms(references: &[Reference], set: &ChromSet) -> Result<()> {
    let present: Vec<&str> = references.iter().map(|r| normalize_chrom(&r.name)).collect();
    let mut missing: Vec<&str> = set.iter().filter(|c| !present.contains(c)).collect();
    if missing.is_empty() {
        return Ok(());
    }
    missing.sort_unstable();
    if set.is_canonical() {
        debug!("Canonical chromosomes absent from alignment file: {}", missing.join(","));
        Ok(())
    } else {
        Err(WpsError::config(format!(
            "requested chromosome(s) not in alignment file: {}",
            missing.join(",")
        )))
    }
}
