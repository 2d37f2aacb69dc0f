//! Region file parsing
//!
//! Two layouts are accepted:
//! - BED: `chrom start end [name [score [strand]]]`, 0-based half-open
//! - transcript table: `id chrom start end strand`, 1-based inclusive
//!
//! The layout is picked per line: five or more columns with numeric third and
//! fourth columns and a `+`/`-` fifth column is a transcript row (a BED score
//! column is never a strand). Anything else is BED. Numeric fields may be written
//! as floats (`1000.0`). Plain text, gzip and BGZF files are read
//! transparently; BGZF goes through noodles, other gzip through
//! flate2::MultiGzDecoder.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use log::{debug, info};
use optwps_core::{Region, Result, WpsError};

/// Check if a file appears to be BGZF format by examining the header.
///
/// BGZF files have the gzip magic bytes (0x1f 0x8b) with the FEXTRA flag set
/// and a "BC" subfield identifier.
fn is_bgzf(header: &[u8]) -> bool {
    header.len() >= 14 && is_gzip(header) && header[3] & 0x04 != 0 && header[12] == b'B' && header[13] == b'C'
}

fn is_gzip(header: &[u8]) -> bool {
    header.len() >= 2 && header[0] == 0x1f && header[1] == 0x8b
}

/// Open a file and return a buffered reader, handling compression transparently.
///
/// Compression is detected from the leading bytes, not the extension.
pub fn get_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let open = || File::open(path).map_err(|e| WpsError::input(path, format!("cannot open: {}", e)));

    let mut header = Vec::with_capacity(18);
    open()?
        .take(18)
        .read_to_end(&mut header)
        .map_err(|e| WpsError::input(path, format!("cannot read: {}", e)))?;

    let file = open()?;
    if is_bgzf(&header) {
        debug!("{:?}: BGZF", path);
        Ok(Box::new(BufReader::new(noodles::bgzf::Reader::new(file))))
    } else if is_gzip(&header) {
        debug!("{:?}: gzip", path);
        Ok(Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Read every region of a BED or transcript file, in file order.
pub fn read_regions(path: &Path) -> Result<Vec<Region>> {
    let reader = get_reader(path)?;
    let regions = parse_regions(reader).map_err(|e| match e {
        WpsError::Configuration(msg) => WpsError::config(format!("{}: {}", path.display(), msg)),
        other => other,
    })?;
    info!("Read {} regions from {:?}", regions.len(), path);
    Ok(regions)
}

/// Parse region lines. Errors name the 1-based line number.
pub fn parse_regions<R: BufRead>(reader: R) -> Result<Vec<Region>> {
    let mut regions = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let lineno = i + 1;
        let line = line.map_err(|e| WpsError::config(format!("line {}: unreadable: {}", lineno, e)))?;
        let line = line.trim_end();
        if line.trim().is_empty() || line.starts_with('#') || line.starts_with("track") || line.starts_with("browser") {
            continue;
        }
        let region = parse_line(line).map_err(|msg| WpsError::config(format!("line {}: {}", lineno, msg)))?;
        regions.push(region);
    }
    Ok(regions)
}

fn parse_line(line: &str) -> std::result::Result<Region, String> {
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    let fields: Vec<&str> = if fields.len() >= 3 { fields } else { line.split_whitespace().collect() };
    if fields.len() < 3 {
        return Err(format!("expected at least 3 columns, found {}", fields.len()));
    }

    let transcript = fields.len() >= 5
        && parse_coord(fields[2]).is_ok()
        && parse_coord(fields[3]).is_ok()
        && parse_strand(fields[4]).is_some();

    let region = if transcript {
        // id chrom start end strand, 1-based inclusive
        let start = parse_coord(fields[2])?;
        let end = parse_coord(fields[3])?;
        if start == 0 {
            return Err("transcript start must be >= 1".to_string());
        }
        let mut region = Region::new(fields[1], start - 1, end).with_name(fields[0]);
        if let Some(strand) = parse_strand(fields[4]) {
            region = region.with_strand(strand);
        }
        region
    } else {
        let start = parse_coord(fields[1])?;
        let end = parse_coord(fields[2])?;
        let mut region = Region::new(fields[0], start, end);
        if let Some(name) = fields.get(3).filter(|n| !n.is_empty() && **n != ".") {
            region = region.with_name(*name);
        }
        if let Some(strand) = fields.get(5).and_then(|s| parse_strand(s)) {
            region = region.with_strand(strand);
        }
        region
    };

    if region.end <= region.start {
        return Err(format!("end ({}) must be greater than start ({})", region.end, region.start));
    }
    Ok(region)
}

/// Non-negative integer coordinate; `1000.0` is accepted, `1000.5` is not.
fn parse_coord(s: &str) -> std::result::Result<u64, String> {
    if let Ok(v) = s.parse::<u64>() {
        return Ok(v);
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 => Ok(v as u64),
        _ => Err(format!("invalid coordinate '{}'", s)),
    }
}

fn parse_strand(s: &str) -> Option<char> {
    match s {
        "+" => Some('+'),
        "-" => Some('-'),
        _ => None,
    }
}
