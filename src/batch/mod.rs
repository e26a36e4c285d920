//! Offline feature extraction over the labelled dataset.
//!
//! The runner re-extracts a seeded, balanced sample in fixed-size chunks and
//! snapshots every row computed so far after each chunk, so an interrupted run
//! can pick up from its last checkpoint. Two runs must not share an output
//! directory.

pub mod checkpoint;
pub mod runner;
pub mod sampler;

pub use checkpoint::{LabelCounts, LabelledRow, RecoveryReport, Validation};
pub use runner::{BatchRunner, BatchSummary};
pub use sampler::{balanced_sample, SampleItem};
