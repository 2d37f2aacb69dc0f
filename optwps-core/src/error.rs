//! Error taxonomy for WPS runs
//!
//! Configuration, input and output errors are fatal. `RecordSkipped` marks a
//! single alignment that could not be turned into a fragment; the engine logs
//! it and moves on.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WpsError>;

#[derive(Debug, Error)]
pub enum WpsError {
    /// Bad or contradictory options, unknown chromosome, malformed region row
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Missing, unindexed or corrupt alignment/region source
    #[error("input error ({}): {message}", path.display())]
    Input { path: PathBuf, message: String },

    /// One record could not be interpreted; excluded from every counter
    #[error("record skipped: {reason}")]
    RecordSkipped { position: Option<u64>, reason: String },

    /// The output sink could not be written
    #[error("failed to write output {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl WpsError {
    pub fn config(msg: impl Into<String>) -> Self {
        WpsError::Configuration(msg.into())
    }

    pub fn input(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        WpsError::Input { path: path.into(), message: msg.into() }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        WpsError::RecordSkipped { position: None, reason: reason.into() }
    }

    /// Skip tied to the 0-based reference position of the offending record.
    pub fn skipped_at(position: u64, reason: impl Into<String>) -> Self {
        WpsError::RecordSkipped { position: Some(position), reason: reason.into() }
    }

    pub fn output(path: impl Into<PathBuf>, source: io::Error) -> Self {
        WpsError::Output { path: path.into(), source }
    }

    /// Only skipped records let a run continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, WpsError::RecordSkipped { .. })
    }
}
