//! WPS table writer
//!
//! One tab-separated row per position, no header:
//! `chrom  pos  [spanning  endpoint]  wps  [wps_per_million]`
//! Positions are 1-based. Paths ending in `.gz` or `.bgz` are written as
//! BGZF (valid gzip, and tabix-compatible); no path means stdout.

use std::fs::File;
use std::io::{self, BufWriter, Stdout, Write};
use std::path::{Path, PathBuf};

use log::info;
use noodles::bgzf;
use optwps_core::{ChunkScores, Result, WpsError, WpsPoint, WpsSink};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutputOptions {
    /// Also write spanning and endpoint counts
    pub verbose: bool,
    /// Library size for the per-million column
    pub total_fragments: Option<u64>,
}

enum Target {
    Stdout(BufWriter<Stdout>),
    Plain(BufWriter<File>),
    Bgzf(bgzf::Writer<File>),
}

impl Write for Target {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Target::Stdout(w) => w.write(buf),
            Target::Plain(w) => w.write(buf),
            Target::Bgzf(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Target::Stdout(w) => w.flush(),
            Target::Plain(w) => w.flush(),
            Target::Bgzf(w) => w.flush(),
        }
    }
}

pub struct TsvSink {
    target: Target,
    path: PathBuf,
    options: OutputOptions,
    rows: u64,
}

fn is_compressed(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("gz") | Some("bgz"))
}

impl TsvSink {
    /// Create the sink; `None` writes to stdout.
    pub fn create(path: Option<&Path>, options: OutputOptions) -> Result<Self> {
        if options.total_fragments == Some(0) {
            return Err(WpsError::config("total fragments must be > 0"));
        }
        let (target, path) = match path {
            None => (Target::Stdout(BufWriter::new(io::stdout())), PathBuf::from("<stdout>")),
            Some(p) => {
                let file = File::create(p).map_err(|e| WpsError::output(p, e))?;
                let target = if is_compressed(p) {
                    Target::Bgzf(bgzf::Writer::new(file))
                } else {
                    Target::Plain(BufWriter::new(file))
                };
                (target, p.to_path_buf())
            }
        };
        Ok(Self { target, path, options, rows: 0 })
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    fn write_row(&mut self, chrom: &str, point: &WpsPoint) -> io::Result<()> {
        let w = &mut self.target;
        write!(w, "{}\t{}", chrom, point.position + 1)?;
        if self.options.verbose {
            write!(w, "\t{}\t{}", point.spanning, point.endpoint)?;
        }
        write!(w, "\t{}", point.wps)?;
        if let Some(total) = self.options.total_fragments {
            write!(w, "\t{:.6}", point.wps as f64 / (total as f64 / 1e6))?;
        }
        writeln!(w)
    }
}

impl WpsSink for TsvSink {
    fn write_chunk(&mut self, chrom: &str, scores: &ChunkScores) -> Result<()> {
        for point in scores.points() {
            self.write_row(chrom, &point).map_err(|e| WpsError::output(&self.path, e))?;
        }
        self.rows += scores.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let res = match &mut self.target {
            Target::Bgzf(w) => w.try_finish(),
            other => other.flush(),
        };
        res.map_err(|e| WpsError::output(&self.path, e))?;
        info!("Wrote {} rows to {}", self.rows, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn scores() -> ChunkScores {
        ChunkScores { start: 99, spanning: vec![3, 0], endpoint: vec![1, 2] }
    }

    fn write_file(name: &str, options: OutputOptions) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut sink = TsvSink::create(Some(&path), options).unwrap();
        sink.write_chunk("chr1", &scores()).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.rows(), 2);
        (dir, path)
    }

    #[test]
    fn test_default_columns_one_based() {
        let (_dir, path) = write_file("out.tsv", OutputOptions::default());
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, "chr1\t100\t2\nchr1\t101\t-2\n");
    }

    #[test]
    fn test_verbose_and_normalised_columns() {
        let options = OutputOptions { verbose: true, total_fragments: Some(2_000_000) };
        let (_dir, path) = write_file("out.tsv", options);
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, "chr1\t100\t3\t1\t2\t1.000000\nchr1\t101\t0\t2\t-2\t-1.000000\n");
    }

    #[test]
    fn test_gz_suffix_writes_bgzf() {
        let (_dir, path) = write_file("out.tsv.gz", OutputOptions::default());
        let mut raw = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut raw).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);

        let mut text = String::new();
        flate2::read::MultiGzDecoder::new(&raw[..]).read_to_string(&mut text).unwrap();
        assert_eq!(text, "chr1\t100\t2\nchr1\t101\t-2\n");
    }

    #[test]
    fn test_unwritable_path_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.tsv");
        let err = TsvSink::create(Some(&path), OutputOptions::default()).err().unwrap();
        assert!(err.to_string().contains("missing"), "{}", err);
    }

    #[test]
    fn test_zero_total_fragments_rejected() {
        let options = OutputOptions { verbose: false, total_fragments: Some(0) };
        assert!(matches!(TsvSink::create(None, options), Err(WpsError::Configuration(_))));
    }
}
