//! Indexed BAM input
//!
//! Turns alignment records into engine fragments. A pair is represented once,
//! by its leftmost mate; the other mate is dropped before filtering so it is
//! never counted twice.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use optwps_core::{hash_name, Fragment, FragmentIter, FragmentSource, Reference, Result, SourceOpener, WpsError};
use rust_htslib::bam::record::Cigar;
use rust_htslib::bam::{self, Read};

/// Opens one `BamSource` per engine worker.
#[derive(Debug, Clone)]
pub struct BamOpener {
    path: PathBuf,
    min_mapq: u8,
}

impl BamOpener {
    pub fn new(path: impl Into<PathBuf>, min_mapq: u8) -> Self {
        Self { path: path.into(), min_mapq }
    }
}

impl SourceOpener for BamOpener {
    type Source = BamSource;

    fn open(&self) -> Result<BamSource> {
        BamSource::open(&self.path, self.min_mapq)
    }
}

pub struct BamSource {
    path: PathBuf,
    reader: bam::IndexedReader,
    min_mapq: u8,
    tids: HashMap<String, u32>,
    names: Vec<Arc<str>>,
}

impl BamSource {
    /// Open an indexed BAM. A missing file or index is an input error.
    pub fn open(path: &Path, min_mapq: u8) -> Result<Self> {
        if !path.exists() {
            return Err(WpsError::input(path, "file does not exist"));
        }
        let reader = bam::IndexedReader::from_path(path)
            .map_err(|e| WpsError::input(path, format!("cannot open indexed BAM (is it indexed?): {}", e)))?;

        let names: Vec<Arc<str>> = reader
            .header()
            .target_names()
            .iter()
            .map(|n| Arc::from(String::from_utf8_lossy(n).as_ref()))
            .collect();
        let tids = names.iter().enumerate().map(|(tid, n)| (n.to_string(), tid as u32)).collect();
        debug!("Opened {:?}: {} reference sequences", path, names.len());

        Ok(Self { path: path.to_path_buf(), reader, min_mapq, tids, names })
    }
}

impl FragmentSource for BamSource {
    fn references(&self) -> Vec<Reference> {
        let header = self.reader.header();
        self.names
            .iter()
            .enumerate()
            .map(|(tid, name)| Reference::new(name.to_string(), header.target_len(tid as u32).unwrap_or(0)))
            .collect()
    }

    fn fetch(&mut self, chrom: &str, start: u64, end: u64) -> Result<FragmentIter<'_>> {
        let tid = *self
            .tids
            .get(chrom)
            .ok_or_else(|| WpsError::config(format!("chromosome '{}' is not in {:?}", chrom, self.path)))?;
        self.reader
            .fetch((tid, start, end))
            .map_err(|e| WpsError::input(&self.path, format!("fetch {}:{}-{} failed: {}", chrom, start, end, e)))?;

        let chrom = Arc::clone(&self.names[tid as usize]);
        let path = self.path.clone();
        let min_mapq = self.min_mapq;
        let iter = self.reader.records().filter_map(move |rec| match rec {
            Ok(record) => record_to_fragment(&record, &chrom, min_mapq).transpose(),
            Err(e) => Some(Err(WpsError::input(&path, format!("corrupt record: {}", e)))),
        });
        Ok(Box::new(iter))
    }
}

/// Reference bases consumed by the alignment (M, D, N, =, X).
fn reference_length(record: &bam::Record) -> u64 {
    record
        .cigar()
        .iter()
        .map(|op| match op {
            Cigar::Match(l) | Cigar::Del(l) | Cigar::RefSkip(l) | Cigar::Equal(l) | Cigar::Diff(l) => *l as u64,
            _ => 0,
        })
        .sum()
}

fn is_soft_clipped(record: &bam::Record) -> bool {
    record.cigar().iter().any(|op| matches!(op, Cigar::SoftClip(_)))
}

/// The mate that carries the fragment: lower position, ties go to read 1.
fn is_leftmost_mate(record: &bam::Record) -> bool {
    record.pos() < record.mpos() || (record.pos() == record.mpos() && record.is_first_in_template())
}

/// `Ok(None)` for records that do not represent a fragment of their own.
pub(crate) fn record_to_fragment(record: &bam::Record, chrom: &Arc<str>, min_mapq: u8) -> Result<Option<Fragment>> {
    if record.pos() < 0 {
        return Ok(None);
    }
    let pos = record.pos() as u64;
    let paired = record.is_paired();
    let mate_usable = paired && !record.is_mate_unmapped() && record.mtid() == record.tid();
    if mate_usable && !is_leftmost_mate(record) {
        return Ok(None);
    }

    let valid = !(record.is_unmapped()
        || record.is_duplicate()
        || record.is_quality_check_failed()
        || record.is_secondary()
        || record.is_supplementary()
        || record.mapq() < min_mapq
        || (paired && !mate_usable));

    let mut fragment = if valid && paired {
        let tlen = record.insert_size();
        if tlen == 0 {
            return Err(WpsError::skipped_at(
                pos,
                format!("{} has insert size 0", String::from_utf8_lossy(record.qname())),
            ));
        }
        Fragment::paired(Arc::clone(chrom), pos, tlen)
    } else {
        Fragment::new(Arc::clone(chrom), pos, pos + reference_length(record).max(1))
    };
    fragment.valid = valid;
    fragment.reverse = record.is_reverse();
    fragment.soft_clipped = is_soft_clipped(record);
    Ok(Some(fragment.with_name_hash(hash_name(record.qname()))))
}
