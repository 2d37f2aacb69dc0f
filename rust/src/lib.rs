//! optwps: Window Protection Score calculation from indexed BAM files
//!
//! I/O side of the WPS engine in `optwps-core`: BAM reading, region files,
//! TSV output and progress, plus the `optwps` binary and an optional Python
//! module (feature `python`).

pub mod bam;
pub mod bed;
pub mod output;
pub mod pipeline;
pub mod progress;

#[cfg(feature = "python")]
mod python;

pub use pipeline::{run_wps, WpsJob};
