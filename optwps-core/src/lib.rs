//! optwps-core: Window Protection Score engine for cell-free DNA
//!
//! Scores every position of a set of genomic regions with the number of
//! fragments spanning a protection window centred on it, minus the number of
//! fragments with an end inside that window. The engine is I/O-agnostic:
//! alignment readers and output writers plug in through the traits in
//! [`engine`].

pub mod accumulator;
pub mod chunk;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod fragment;
pub mod region;

#[cfg(test)]
pub(crate) mod testing;

pub use accumulator::{ChunkScores, WindowAccumulator, WpsPoint};
pub use chunk::{Chunk, ChunkPlanner};
pub use config::{ChromSet, WpsConfig};
pub use engine::{
    ChunkObserver, EngineState, FragmentIter, FragmentSource, PreparedRun, RunSummary, SourceOpener, WpsEngine,
    WpsSink,
};
pub use error::{Result, WpsError};
pub use filter::{Downsampler, FilterStats, FragmentFilter, RejectReason};
pub use fragment::{hash_name, Fragment};
pub use region::{Reference, Region, RegionSource};
