//! I/O error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HDF5 library error.
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// A listed input path does not exist or is unreadable.
    #[error("missing input: {0}")]
    MissingInput(PathBuf),

    /// Merge-time field or shape disagreement between files.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Malformed dump or dataset file.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Core pipeline error.
    #[error("core error: {0}")]
    Core(#[from] flathit_core::Error),
}
