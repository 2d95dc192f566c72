//! flathit-io: HDF5 I/O and the two-pass conversion pipeline.
//!
//! Reads simulation-dump files, drives the size-then-fill conversion into
//! exactly-sized flat datasets, and merges already-flattened datasets with
//! offset re-basing.
//!

pub mod dataset;
mod error;
pub mod merge;
pub mod pipeline;
pub mod source;

pub use dataset::{file_summary, DatasetInfo, FileSummary, FlatWriter, ProvenanceAttrs};
pub use error::{Error, Result};
pub use merge::merge_files;
pub use pipeline::{convert_files, fill_events, size_events, ConvertConfig, ConvertSummary};
pub use source::{EventSource, Hdf5EventSource};
