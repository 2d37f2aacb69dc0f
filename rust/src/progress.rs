//! Progress bar driven by engine callbacks

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use optwps_core::{Chunk, ChunkObserver};

pub struct ChunkProgress {
    bar: ProgressBar,
}

impl ChunkProgress {
    /// Bar on stderr; `silent` hides it entirely.
    pub fn new(silent: bool) -> Self {
        let bar = if silent { ProgressBar::hidden() } else { ProgressBar::new(0) };
        let template = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta}) {msg}";
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("done");
    }
}

impl ChunkObserver for ChunkProgress {
    fn planned(&self, _regions: usize, chunks: u64) {
        self.bar.set_length(chunks);
        self.bar.enable_steady_tick(Duration::from_millis(100));
    }

    fn chunk_done(&self, chunk: &Chunk) {
        self.bar.set_message(chunk.chrom.clone());
        self.bar.inc(1);
    }
}
