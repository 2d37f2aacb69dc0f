//! Run configuration
//!
//! `WpsConfig` carries every knob of a WPS run. It is built once (CLI, Python
//! or tests), validated, and passed by reference to the engine. Nothing in the
//! engine reads process-wide state.

use std::collections::HashSet;
use std::str::FromStr;

use log::warn;

use crate::error::{Result, WpsError};

/// Set of chromosomes a run is restricted to.
///
/// Names are stored without a leading `chr`, so `chr1` and `1` are the same
/// member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromSet {
    names: HashSet<String>,
    canonical: bool,
}

impl ChromSet {
    /// Autosomes 1-22 plus X and Y.
    pub fn canonical() -> Self {
        let names = (1..=22).map(|i| i.to_string()).chain(["X".to_string(), "Y".to_string()]).collect();
        Self { names, canonical: true }
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names.into_iter().map(|n| normalize_chrom(n.as_ref()).to_string()).collect();
        Self { names, canonical: false }
    }

    pub fn contains(&self, chrom: &str) -> bool {
        self.names.contains(normalize_chrom(chrom))
    }

    /// True when built from the `canonical` alias rather than an explicit list.
    pub fn is_canonical(&self) -> bool {
        self.canonical
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl FromStr for ChromSet {
    type Err = WpsError;

    /// Parses `canonical` or a comma-separated list such as `1,2,X`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("canonical") {
            return Ok(Self::canonical());
        }
        let names: Vec<&str> = s.split(',').map(str::trim).filter(|n| !n.is_empty()).collect();
        if names.is_empty() {
            return Err(WpsError::config(format!("no chromosome names in valid-chroms '{}'", s)));
        }
        Ok(Self::from_names(names))
    }
}

/// Strip a leading `chr` so `chr1`/`1` compare equal.
pub fn normalize_chrom(chrom: &str) -> &str {
    chrom.strip_prefix("chr").unwrap_or(chrom)
}

#[derive(Debug, Clone)]
pub struct WpsConfig {
    /// Full protection window width (half-width is `protection_size / 2`)
    pub protection_size: u32,
    /// Inclusive fragment length bounds
    pub min_insert_size: Option<u64>,
    pub max_insert_size: Option<u64>,
    /// Longest fragment accounted for when `max_insert_size` is unset
    pub max_fragment_span: u64,
    /// Per-fragment retention probability in (0, 1]
    pub downsample_ratio: Option<f64>,
    pub seed: u64,
    /// Core width of one processing unit
    pub chunk_size: u64,
    pub valid_chroms: Option<ChromSet>,
    pub exclude_soft_clipped: bool,
    /// Use the alignment length of unpaired reads as their insert size
    pub single_end_fallback: bool,
    pub threads: usize,
}

impl Default for WpsConfig {
    fn default() -> Self {
        Self {
            protection_size: 120,
            min_insert_size: None,
            max_insert_size: None,
            max_fragment_span: 1000,
            downsample_ratio: None,
            seed: 0,
            chunk_size: 1_000_000,
            valid_chroms: None,
            exclude_soft_clipped: true,
            single_end_fallback: true,
            threads: 1,
        }
    }
}

impl WpsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.protection_size == 0 {
            return Err(WpsError::config("protection size must be > 0"));
        }
        if self.protection_size % 2 == 0 {
            warn!(
                "Even protection size {}: using a {}bp window (half-width {})",
                self.protection_size,
                self.window_width(),
                self.half_width()
            );
        }
        if self.chunk_size == 0 {
            return Err(WpsError::config("chunk size must be > 0"));
        }
        if self.max_fragment_span == 0 {
            return Err(WpsError::config("max fragment span must be > 0"));
        }
        if let (Some(min), Some(max)) = (self.min_insert_size, self.max_insert_size) {
            if min > max {
                return Err(WpsError::config(format!(
                    "min insert size ({}) is larger than max insert size ({})",
                    min, max
                )));
            }
        }
        if self.max_insert_size == Some(0) {
            return Err(WpsError::config("max insert size must be > 0"));
        }
        if let Some(ratio) = self.downsample_ratio {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(WpsError::config(format!("down-sample ratio must be in (0, 1], got {}", ratio)));
            }
        }
        if self.threads == 0 {
            return Err(WpsError::config("threads must be > 0"));
        }
        Ok(())
    }

    pub fn half_width(&self) -> u64 {
        (self.protection_size / 2) as u64
    }

    /// Bases in the closed window `[p - hw, p + hw]`.
    pub fn window_width(&self) -> u64 {
        2 * self.half_width() + 1
    }

    /// Longest fragment the chunk padding accounts for.
    pub fn effective_max_span(&self) -> u64 {
        self.max_insert_size.unwrap_or(self.max_fragment_span)
    }

    /// Padding applied on each side of a chunk core when fetching.
    ///
    /// Any fragment that touches the window of a core position lies entirely
    /// inside the padded interval.
    pub fn chunk_padding(&self) -> u64 {
        self.half_width() + self.effective_max_span()
    }
}
